//! Server-paginated table controller.
//!
//! One [`TableController`] drives one asset grid. It owns the fetch state
//! (page, sort, filters, search), turns it into requests and publishes the
//! resulting [`TableView`] on a watch channel.
//!
//! ## Request discipline
//!
//! 1. Every state change rebuilds the canonical request key. A key equal to
//!    the last *issued* one is skipped unless the caller forces a reload.
//! 2. Each issued request gets a ticket (sequence number + key). Only the
//!    holder of the latest ticket may commit its response; anything older is
//!    discarded no matter when it arrives.
//! 3. Superseded requests are also aborted at the transport level when
//!    [`TableOptions::abort_superseded`] is set.
//! 4. Failures clear the rows and surface the error text. Nothing retries
//!    automatically.
//!
//! Search input is applied to the view immediately but only refetches after
//! the debounce period.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::Instrument;

use tessera_core::{AssetId, Error, Result, table_span};

use crate::columns::{Column, ColumnRenderers, derive_columns};
use crate::config::ClientConfig;
use crate::debounce::Debouncer;
use crate::query::{
    FetchRequest, FetchState, FilterCondition, FilterModel, RequestKey, ServerSide, SortKey,
    TableScope,
};
use crate::schema::{ColumnDefinition, FetchResult, Row};
use crate::selection::SelectionTracker;

/// Fetches one page of assets.
#[async_trait]
pub trait AssetFetcher: Send + Sync + 'static {
    /// Performs the request.
    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchResult>;
}

/// Row count as far as the client knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalCount {
    /// The server reported the total.
    Exact(u64),
    /// The server could not count; at least this many rows exist.
    AtLeast(u64),
}

/// Pagination controls derived from the committed page.
///
/// With an unknown total, "next" stays enabled until a page comes back
/// shorter than the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// First row of the page.
    pub offset: u64,
    /// Page size.
    pub limit: u64,
    /// Rows on the page.
    pub returned: u64,
    /// Total rows.
    pub total: TotalCount,
    /// A previous page exists.
    pub has_previous: bool,
    /// A next page may exist.
    pub has_next: bool,
}

impl PageInfo {
    /// `"1-50 of 120"` or `"1-50 of at least 50"`.
    #[must_use]
    pub fn label(&self) -> String {
        let from = if self.returned == 0 {
            self.offset
        } else {
            self.offset + 1
        };
        let to = self.offset + self.returned;
        match self.total {
            TotalCount::Exact(total) => format!("{from}-{to} of {total}"),
            TotalCount::AtLeast(n) => format!("{from}-{to} of at least {n}"),
        }
    }
}

/// Everything a grid needs to render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableView {
    /// Rows of the committed page.
    pub items: Vec<Row>,
    /// Schema of the committed page.
    pub schema: Vec<ColumnDefinition>,
    /// Column headers derived from the schema.
    pub columns: Vec<Column>,
    /// Total rows if the server counted them.
    pub total: Option<u64>,
    /// Rows returned.
    pub returned: u64,
    /// Server-side duration of the committed fetch.
    pub duration_ms: Option<f64>,
    /// Offset of the committed page.
    pub offset: u64,
    /// Page size of the committed page.
    pub limit: u64,
    /// A request is outstanding.
    pub loading: bool,
    /// Message of the last failure.
    pub error: Option<String>,
    /// Search box contents (may be ahead of the applied search).
    pub search_input: String,
}

impl TableView {
    /// Pagination controls for this view.
    #[must_use]
    pub fn page_info(&self) -> PageInfo {
        let seen = self.offset + self.returned;
        let (total, has_next) = match self.total {
            Some(total) => (TotalCount::Exact(total), seen < total),
            None => (
                TotalCount::AtLeast(seen),
                self.returned > 0 && self.returned >= self.limit,
            ),
        };
        PageInfo {
            offset: self.offset,
            limit: self.limit,
            returned: self.returned,
            total,
            has_previous: self.offset > 0,
            has_next,
        }
    }
}

/// What happened to a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The request key matched the last issued one; nothing was sent.
    Skipped,
    /// The response was applied.
    Committed,
    /// A newer request superseded this one.
    Discarded,
    /// The request failed and the error was applied.
    Failed,
}

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Page size.
    pub limit: u64,
    /// Quiet period for search.
    pub search_debounce: Duration,
    /// Whether sort and filter run on the server.
    pub server_side: ServerSide,
    /// Abort superseded requests instead of only ignoring them.
    pub abort_superseded: bool,
    /// Column renderers by id.
    pub renderers: ColumnRenderers,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl TableOptions {
    /// Options from client configuration with catalog default renderers.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            limit: config.page_size,
            search_debounce: config.search_debounce,
            server_side: ServerSide::default(),
            abort_superseded: true,
            renderers: ColumnRenderers::catalog_defaults(),
        }
    }
}

type SelectionListener = Arc<dyn Fn(&SelectionTracker) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Ticket {
    seq: u64,
    key: RequestKey,
}

struct ControllerState {
    query: FetchState,
    search_input: String,
    next_seq: u64,
    last_issued: Option<Ticket>,
    in_flight: Option<AbortHandle>,
    selection: SelectionTracker,
}

struct ControllerInner {
    fetcher: Arc<dyn AssetFetcher>,
    scope: TableScope,
    options: TableOptions,
    state: Mutex<ControllerState>,
    view: watch::Sender<TableView>,
    search: Debouncer,
    listener: Mutex<Option<SelectionListener>>,
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, ticket: &Ticket, result: Result<FetchResult>) -> FetchOutcome {
        let mut state = self.lock();
        if state.last_issued.as_ref() != Some(ticket) {
            tracing::debug!(seq = ticket.seq, "stale response discarded");
            return FetchOutcome::Discarded;
        }
        state.in_flight = None;

        match result {
            Ok(mut page) => {
                page.normalize();
                let columns = derive_columns(&page.schema, &self.options.renderers);
                tracing::debug!(
                    seq = ticket.seq,
                    returned = page.stats.returned,
                    total = ?page.stats.total,
                    "response committed"
                );
                self.view.send_modify(|view| {
                    view.returned = page.stats.returned;
                    view.total = page.stats.total;
                    view.duration_ms = page.stats.duration_ms;
                    view.offset = page.pagination.offset;
                    view.limit = page.pagination.limit;
                    view.items = page.items;
                    view.schema = page.schema;
                    view.columns = columns;
                    view.loading = false;
                    view.error = None;
                });
                FetchOutcome::Committed
            }
            Err(err) => {
                drop(state);
                self.apply_failure(&err);
                FetchOutcome::Failed
            }
        }
    }

    fn apply_failure(&self, err: &Error) {
        tracing::warn!(error = %err, "asset page request failed");
        let message = err.display_message();
        self.view.send_modify(|view| {
            view.items.clear();
            view.returned = 0;
            view.total = None;
            view.loading = false;
            view.error = Some(message);
        });
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.in_flight.take() {
            handle.abort();
        }
    }
}

/// Drives one asset grid. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TableController {
    inner: Arc<ControllerInner>,
}

impl std::fmt::Debug for TableController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableController")
            .field("scope", &self.inner.scope)
            .finish_non_exhaustive()
    }
}

impl TableController {
    /// Creates a controller. Nothing is fetched until [`TableController::load`].
    #[must_use]
    pub fn new(fetcher: Arc<dyn AssetFetcher>, scope: TableScope, options: TableOptions) -> Self {
        let view = TableView {
            limit: options.limit,
            ..TableView::default()
        };
        let (tx, _rx) = watch::channel(view);
        Self {
            inner: Arc::new(ControllerInner {
                fetcher,
                search: Debouncer::new(options.search_debounce),
                state: Mutex::new(ControllerState {
                    query: FetchState::new(options.limit),
                    search_input: String::new(),
                    next_seq: 0,
                    last_issued: None,
                    in_flight: None,
                    selection: SelectionTracker::new(),
                }),
                scope,
                options,
                view: tx,
                listener: Mutex::new(None),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.lock()
    }

    /// What this controller lists.
    #[must_use]
    pub fn scope(&self) -> &TableScope {
        &self.inner.scope
    }

    /// The current view.
    #[must_use]
    pub fn view(&self) -> TableView {
        self.inner.view.borrow().clone()
    }

    /// Subscribes to view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TableView> {
        self.inner.view.subscribe()
    }

    /// The fetch state that the next request would be built from.
    #[must_use]
    pub fn fetch_state(&self) -> FetchState {
        self.lock().query.clone()
    }

    /// Replaces the whole fetch state (e.g. restored from a saved URL)
    /// without fetching. The search box follows the new search.
    pub fn replace_state(&self, query: FetchState) {
        let search = query.search.clone();
        {
            let mut state = self.lock();
            state.query = query;
            state.search_input.clone_from(&search);
        }
        self.inner.search.cancel();
        self.inner
            .view
            .send_modify(|view| view.search_input = search);
    }

    /// Fetches the current state unless it was already requested.
    pub async fn load(&self) -> FetchOutcome {
        self.fetch(false).await
    }

    /// Fetches the current state even if it was already requested.
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch(true).await
    }

    /// Moves to `offset` at the current sort, filter and search.
    pub async fn set_offset(&self, offset: u64) -> FetchOutcome {
        self.lock().query.offset = offset;
        self.load().await
    }

    /// Moves to the next page.
    pub async fn next_page(&self) -> FetchOutcome {
        let offset = {
            let state = self.lock();
            state.query.offset + state.query.limit
        };
        self.set_offset(offset).await
    }

    /// Moves to the previous page.
    pub async fn previous_page(&self) -> FetchOutcome {
        let offset = {
            let state = self.lock();
            state.query.offset.saturating_sub(state.query.limit)
        };
        self.set_offset(offset).await
    }

    /// Changes the page size and returns to page 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero page size.
    pub async fn set_page_size(&self, limit: u64) -> Result<FetchOutcome> {
        if limit == 0 {
            return Err(Error::InvalidInput(
                "page size must be greater than zero".to_string(),
            ));
        }
        {
            let mut state = self.lock();
            state.query.limit = limit;
            state.query.offset = 0;
        }
        Ok(self.load().await)
    }

    /// Replaces the sort and returns to page 1.
    pub async fn set_sort(&self, sort: Vec<SortKey>) -> FetchOutcome {
        {
            let mut state = self.lock();
            state.query.sort = sort;
            state.query.offset = 0;
        }
        self.load().await
    }

    /// Replaces all filters and returns to page 1.
    pub async fn set_filters(&self, filters: FilterModel) -> FetchOutcome {
        {
            let mut state = self.lock();
            state.query.filters = filters;
            state.query.offset = 0;
        }
        self.load().await
    }

    /// Adds or replaces one filter and returns to page 1.
    pub async fn set_filter(
        &self,
        filter_id: impl Into<String>,
        condition: FilterCondition,
    ) -> FetchOutcome {
        {
            let mut state = self.lock();
            state.query.filters.set(filter_id, condition);
            state.query.offset = 0;
        }
        self.load().await
    }

    /// Removes one filter and returns to page 1.
    pub async fn remove_filter(&self, filter_id: &str) -> FetchOutcome {
        {
            let mut state = self.lock();
            state.query.filters.remove(filter_id);
            state.query.offset = 0;
        }
        self.load().await
    }

    /// Updates the search box and schedules a debounced page-1 refetch.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn set_search(&self, text: impl Into<String>) {
        let text = text.into();
        self.lock().search_input.clone_from(&text);
        self.inner
            .view
            .send_modify(|view| view.search_input.clone_from(&text));

        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
        self.inner.search.schedule(async move {
            if let Some(inner) = weak.upgrade() {
                TableController { inner }.apply_search().await;
            }
        });
    }

    /// Applies the search box now, skipping the remaining quiet period.
    pub async fn flush_search(&self) -> FetchOutcome {
        self.inner.search.cancel();
        self.apply_search().await
    }

    async fn apply_search(&self) -> FetchOutcome {
        {
            let mut state = self.lock();
            let input = state.search_input.clone();
            if state.query.search != input {
                state.query.search = input;
                state.query.offset = 0;
            }
        }
        self.load().await
    }

    async fn fetch(&self, force: bool) -> FetchOutcome {
        let (scope_name, scope_id) = self.inner.scope.describe();
        let span = table_span(scope_name, &scope_id);
        self.fetch_inner(force).instrument(span).await
    }

    async fn fetch_inner(&self, force: bool) -> FetchOutcome {
        let (seq, handle) = {
            let mut state = self.lock();
            let request = state
                .query
                .to_request(&self.inner.scope, self.inner.options.server_side);
            let key = match request.key() {
                Ok(key) => key,
                Err(err) => {
                    drop(state);
                    self.inner.apply_failure(&err);
                    return FetchOutcome::Failed;
                }
            };

            if !force && state.last_issued.as_ref().is_some_and(|t| t.key == key) {
                tracing::debug!(request_key = %key, "request unchanged; skipping");
                return FetchOutcome::Skipped;
            }

            state.next_seq += 1;
            let ticket = Ticket {
                seq: state.next_seq,
                key,
            };
            state.last_issued = Some(ticket.clone());

            tracing::debug!(
                seq = ticket.seq,
                request_key = %ticket.key,
                offset = state.query.offset,
                "request issued"
            );

            // The task commits on its own so a dropped caller cannot strand
            // the latest ticket.
            let seq = ticket.seq;
            let fetcher = Arc::clone(&self.inner.fetcher);
            let weak = Arc::downgrade(&self.inner);
            let handle = tokio::spawn(
                async move {
                    let result = fetcher.fetch_page(&request).await;
                    match weak.upgrade() {
                        Some(inner) => inner.commit(&ticket, result),
                        None => FetchOutcome::Discarded,
                    }
                }
                .in_current_span(),
            );
            if let Some(previous) = state.in_flight.replace(handle.abort_handle()) {
                if self.inner.options.abort_superseded {
                    previous.abort();
                }
            }
            self.inner.view.send_modify(|view| view.loading = true);
            (seq, handle)
        };

        match handle.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                tracing::debug!(seq, "request aborted");
                FetchOutcome::Discarded
            }
            Err(err) => {
                let err = Error::internal(format!("fetch task failed: {err}"));
                let mut state = self.lock();
                if state.last_issued.as_ref().is_some_and(|t| t.seq == seq) {
                    state.in_flight = None;
                    drop(state);
                    self.inner.apply_failure(&err);
                    FetchOutcome::Failed
                } else {
                    FetchOutcome::Discarded
                }
            }
        }
    }

    /// Registers the callback run after every selection change.
    pub fn on_selection_change(&self, listener: impl Fn(&SelectionTracker) + Send + Sync + 'static) {
        let listener: SelectionListener = Arc::new(listener);
        *self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn notify_selection(&self, selection: &SelectionTracker) {
        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(selection);
        }
    }

    /// Flips a row's selection. Returns `None` for rows without an id.
    pub fn toggle_selection(&self, row: &Row) -> Option<bool> {
        let id = row.id()?;
        Some(self.toggle_selection_id(id))
    }

    /// Flips an id's selection. Returns whether it is now selected.
    pub fn toggle_selection_id(&self, id: AssetId) -> bool {
        let (selected, snapshot) = {
            let mut state = self.lock();
            let selected = state.selection.toggle(id);
            (selected, state.selection.clone())
        };
        self.notify_selection(&snapshot);
        selected
    }

    /// The current selection.
    #[must_use]
    pub fn selection(&self) -> SelectionTracker {
        self.lock().selection.clone()
    }

    /// Deselects everything.
    pub fn clear_selection(&self) {
        let snapshot = {
            let mut state = self.lock();
            if !state.selection.clear() {
                return;
            }
            state.selection.clone()
        };
        self.notify_selection(&snapshot);
    }
}
