//! Live job stream.
//!
//! A [`JobStream`] follows one job's server-sent event stream and publishes a
//! reconciled [`JobView`] (job snapshot, deduplicated log lines, connection
//! state) on a watch channel.
//!
//! Connection lifecycle:
//!
//! ```text
//! Connecting ──connected──▶ Open ──error/EOF, job active──▶ Reconnecting
//!      ▲                     │                                   │
//!      └─────────── retry delay elapsed ◀────────────────────────┘
//!
//! any state ──terminal status, error after terminal, close()──▶ Closed
//! ```
//!
//! The transport is injected through [`EventTransport`], so the state machine
//! runs the same against the HTTP client and against scripted fakes.
//! Event handling lives in [`StreamReducer`], which is synchronous.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use tessera_core::{Error, JobId, Result, job_span};

use crate::config::ClientConfig;
use crate::job::{Job, JobCounts, JobKind, JobStatus};
use crate::sse::{SseEvent, SseFrame};

/// Notice shown while a dropped stream is being re-established.
pub const DISCONNECT_NOTICE: &str = "stream disconnected, reconnecting";

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    /// Job to follow.
    pub job_id: JobId,
    /// Snapshot or changeset.
    pub kind: JobKind,
    /// Resume point sent as `Last-Event-ID`.
    pub last_event_id: Option<String>,
}

impl StreamTarget {
    /// Path of the event endpoint, e.g. `/snapshots/7/events`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}/{}/events", self.kind.path_segment(), self.job_id)
    }
}

/// Decoded frames of one connection. The stream ends when the server closes
/// the connection; an `Err` item is a transport failure mid-stream.
pub type EventStream = BoxStream<'static, Result<SseFrame>>;

/// Opens event stream connections.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Connects to the target's event endpoint.
    async fn connect(&self, target: &StreamTarget) -> Result<EventStream>;
}

/// Connection state of a [`JobStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt in progress.
    Connecting,
    /// Receiving events.
    Open,
    /// Lost the connection; waiting to retry.
    Reconnecting,
    /// Finished for good.
    Closed,
}

/// Reconciled state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    /// Latest accepted snapshot.
    pub job: Job,
    /// Log lines in arrival order, without duplicates.
    pub logs: Vec<String>,
    /// Connection state.
    pub connection: ConnectionState,
    /// Non-fatal notice, e.g. [`DISCONNECT_NOTICE`].
    pub notice: Option<String>,
    /// Last status event that failed to parse.
    pub error: Option<String>,
    /// Heartbeats received.
    pub heartbeats: u64,
}

/// What the connection loop should do after an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep reading.
    Continue,
    /// Stop; the job needs no more events.
    Close,
    /// Connect again after the retry delay.
    Reconnect,
}

/// True if a snapshot with status `incoming` may replace one with `current`.
///
/// Statuses never move backwards and nothing replaces a terminal status.
#[must_use]
pub fn accepts_status(current: JobStatus, incoming: JobStatus) -> bool {
    !current.is_terminal() && incoming.rank() >= current.rank()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogPayload {
    Line(String),
    Message { message: String },
    Entry { line: String },
}

impl LogPayload {
    fn into_line(self) -> String {
        match self {
            Self::Line(line) | Self::Message { message: line } | Self::Entry { line } => line,
        }
    }
}

/// Applies events to a [`JobView`].
#[derive(Debug, Clone)]
pub struct StreamReducer {
    view: JobView,
    seen: HashSet<String>,
}

impl StreamReducer {
    /// Starts from the job as returned by the API, seeding logs from its
    /// `log_message`.
    #[must_use]
    pub fn new(job: Job) -> Self {
        let mut reducer = Self {
            view: JobView {
                job,
                logs: Vec::new(),
                connection: ConnectionState::Connecting,
                notice: None,
                error: None,
                heartbeats: 0,
            },
            seen: HashSet::new(),
        };
        reducer.seed_logs();
        reducer
    }

    /// The current view.
    #[must_use]
    pub fn view(&self) -> &JobView {
        &self.view
    }

    fn seed_logs(&mut self) {
        let Some(text) = self.view.job.log_message.clone() else {
            return;
        };
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.push_log(line.to_string());
        }
    }

    fn push_log(&mut self, line: String) -> bool {
        if self.seen.insert(line.clone()) {
            self.view.logs.push(line);
            true
        } else {
            false
        }
    }

    fn status_directive(&self) -> Directive {
        if self.view.job.status.keeps_stream_open() {
            Directive::Continue
        } else {
            Directive::Close
        }
    }

    /// Applies one event.
    pub fn apply(&mut self, event: &SseEvent) -> Directive {
        match event.event.as_str() {
            "snapshot" | "changeset" => match serde_json::from_str::<Job>(&event.data) {
                Ok(job) => self.observe(job),
                Err(err) => {
                    let err = Error::malformed_event(&event.event, err);
                    tracing::warn!(error = %err, "status event rejected");
                    self.view.error = Some(err.display_message());
                    Directive::Continue
                }
            },
            "log" => {
                match serde_json::from_str::<LogPayload>(&event.data) {
                    Ok(payload) => {
                        self.push_log(payload.into_line());
                    }
                    Err(err) => tracing::debug!(error = %err, "malformed log event skipped"),
                }
                Directive::Continue
            }
            "progress" => {
                match serde_json::from_str::<JobCounts>(&event.data) {
                    Ok(delta) if !self.view.job.status.is_terminal() => {
                        self.view.job.counts.merge(&delta);
                    }
                    Ok(_) => {}
                    Err(err) => tracing::debug!(error = %err, "malformed progress event skipped"),
                }
                Directive::Continue
            }
            "heartbeat" => {
                self.view.heartbeats += 1;
                Directive::Continue
            }
            other => {
                tracing::trace!(event = other, "ignoring unknown event");
                Directive::Continue
            }
        }
    }

    /// Reconciles a full job snapshot from any source (stream or API call).
    pub fn observe(&mut self, job: Job) -> Directive {
        if job.id != self.view.job.id {
            tracing::warn!(other = %job.id, "snapshot for another job ignored");
            return self.status_directive();
        }
        if accepts_status(self.view.job.status, job.status) {
            if job.status != self.view.job.status {
                tracing::info!(
                    from = %self.view.job.status,
                    to = %job.status,
                    "job status changed"
                );
            }
            self.view.job = job;
            self.view.error = None;
            self.seed_logs();
        } else {
            tracing::debug!(
                current = %self.view.job.status,
                incoming = %job.status,
                "out-of-order snapshot ignored"
            );
        }
        self.status_directive()
    }

    /// Handles a dropped connection or a failed connect.
    pub fn on_disconnect(&mut self, err: Option<&Error>) -> Directive {
        if self.view.job.status.keeps_stream_open() {
            match err {
                Some(err) => tracing::warn!(error = %err, "event stream disconnected"),
                None => tracing::info!("event stream ended"),
            }
            self.view.connection = ConnectionState::Reconnecting;
            self.view.notice = Some(DISCONNECT_NOTICE.to_string());
            Directive::Reconnect
        } else {
            self.view.connection = ConnectionState::Closed;
            Directive::Close
        }
    }

    /// Records a successful connect.
    pub fn on_open(&mut self) {
        self.view.connection = ConnectionState::Open;
        self.view.notice = None;
    }

    /// Marks the stream closed.
    pub fn close(&mut self) {
        self.view.connection = ConnectionState::Closed;
        self.view.notice = None;
    }
}

/// Reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPolicy {
    /// Delay before reconnecting until the server sends `retry:`.
    pub retry_delay: Duration,
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl StreamPolicy {
    /// Policy from client configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            retry_delay: config.stream_retry,
        }
    }
}

struct Shared {
    reducer: Mutex<StreamReducer>,
    view: watch::Sender<JobView>,
}

impl Shared {
    fn update<T>(&self, f: impl FnOnce(&mut StreamReducer) -> T) -> T {
        let mut reducer = self.lock();
        let out = f(&mut reducer);
        self.view.send_replace(reducer.view().clone());
        out
    }

    fn lock(&self) -> MutexGuard<'_, StreamReducer> {
        self.reducer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one job's event stream.
///
/// Dropping the handle closes the connection.
pub struct JobStream {
    job_id: JobId,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for JobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStream")
            .field("job_id", &self.job_id)
            .field("connection", &self.shared.view.borrow().connection)
            .finish_non_exhaustive()
    }
}

impl JobStream {
    /// Starts following `job`. A job that is already past `running` gets a
    /// closed view and no connection.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn open(transport: Arc<dyn EventTransport>, job: Job, policy: StreamPolicy) -> Self {
        let job_id = job.id;
        let manual = job.is_manual;
        let kind = job.kind();
        let mut reducer = StreamReducer::new(job);
        let active = reducer.view().job.status.keeps_stream_open();
        if !active {
            reducer.close();
        }

        let (tx, _rx) = watch::channel(reducer.view().clone());
        let shared = Arc::new(Shared {
            reducer: Mutex::new(reducer),
            view: tx,
        });

        let task = active.then(|| {
            let span = job_span(job_id.get(), manual);
            tokio::spawn(
                run(transport, Arc::clone(&shared), job_id, kind, policy).instrument(span),
            )
        });

        Self {
            job_id,
            shared,
            task,
        }
    }

    /// The job being followed.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// The current view.
    #[must_use]
    pub fn view(&self) -> JobView {
        self.shared.view.borrow().clone()
    }

    /// Subscribes to view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobView> {
        self.shared.view.subscribe()
    }

    /// Feeds a snapshot obtained outside the stream (e.g. an action
    /// response). Closes the stream if it makes the job inactive.
    pub fn observe(&mut self, job: Job) {
        if self.shared.update(|reducer| reducer.observe(job)) == Directive::Close {
            self.close();
        }
    }

    /// Closes the connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(job_id = %self.job_id, "job stream closed");
        }
        if self.shared.view.borrow().connection != ConnectionState::Closed {
            self.shared.update(StreamReducer::close);
        }
    }

    /// True once the stream will receive nothing more.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.view.borrow().connection == ConnectionState::Closed
    }

    /// Waits until the stream closes and returns the final view.
    pub async fn wait_closed(&self) -> JobView {
        let mut rx = self.subscribe();
        match rx
            .wait_for(|view| view.connection == ConnectionState::Closed)
            .await
        {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        }
    }
}

impl Drop for JobStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    transport: Arc<dyn EventTransport>,
    shared: Arc<Shared>,
    job_id: JobId,
    kind: JobKind,
    policy: StreamPolicy,
) {
    let mut retry_delay = policy.retry_delay;
    let mut last_event_id: Option<String> = None;

    loop {
        let target = StreamTarget {
            job_id,
            kind,
            last_event_id: last_event_id.clone(),
        };
        tracing::debug!(path = %target.path(), last_event_id = ?target.last_event_id, "connecting");

        let failure = match transport.connect(&target).await {
            Ok(mut events) => {
                shared.update(StreamReducer::on_open);
                tracing::debug!("event stream open");

                let mut failure = None;
                while let Some(frame) = events.next().await {
                    match frame {
                        Ok(SseFrame::Retry(delay)) => retry_delay = delay,
                        Ok(SseFrame::Event(event)) => {
                            if let Some(id) = &event.id {
                                last_event_id = Some(id.clone());
                            }
                            if shared.update(|reducer| reducer.apply(&event)) == Directive::Close {
                                shared.update(StreamReducer::close);
                                tracing::info!("job left the running state; stream closed");
                                return;
                            }
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                failure
            }
            Err(err) => Some(err),
        };

        match shared.update(|reducer| reducer.on_disconnect(failure.as_ref())) {
            Directive::Reconnect => tokio::time::sleep(retry_delay).await,
            Directive::Close | Directive::Continue => return,
        }
    }
}
