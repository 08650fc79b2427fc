//! # tessera-client
//!
//! Data synchronisation and live progress for the tessera catalog backend.
//!
//! This crate provides:
//!
//! - **Table Fetch Controller**: server-paginated, sortable, filterable and
//!   searchable asset grids with request deduplication and stale-response
//!   protection
//! - **Selection Tracker**: row selection that survives paging
//! - **Reference Registry Cache**: single-flight cache of provider and actor
//!   names for foreign-key columns
//! - **Live Job Stream**: server-sent event consumption with reconnection,
//!   log deduplication and out-of-order reconciliation
//! - **Progress Aggregator**: the session's tracked jobs and the lead
//!   progress ticker
//!
//! Every component talks to the backend through a trait
//! ([`AssetFetcher`], [`RegistryLoader`], [`JobActions`], [`EventTransport`]);
//! [`ApiClient`] implements all of them over HTTP.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tessera_client::{ApiClient, ClientConfig, TableController, TableOptions, TableScope};
//! use tessera_core::ViewId;
//!
//! # async fn demo() -> tessera_core::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let client = Arc::new(ApiClient::new(&config)?);
//! let table = TableController::new(
//!     client,
//!     TableScope::View { view_id: ViewId::new(1), provider_id: None },
//!     TableOptions::from_config(&config),
//! );
//! table.load().await;
//! println!("{}", table.view().page_info().label());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod columns;
pub mod config;
pub mod debounce;
pub mod format;
pub mod job;
pub mod progress;
pub mod query;
pub mod registry;
pub mod schema;
pub mod selection;
pub mod sse;
pub mod stream;
pub mod table;

pub use api::ApiClient;
pub use columns::{CellRenderer, Column, ColumnKind, ColumnRenderers, ColumnWidth, RenderedCell};
pub use config::ClientConfig;
pub use debounce::Debouncer;
pub use format::format_bytes;
pub use job::{Job, JobActions, JobCounts, JobKind, JobStatus, Progress};
pub use progress::{MessageEditor, ProgressTracker, Ticker};
pub use query::{
    FetchRequest, FetchState, FilterCondition, FilterModel, FilterOperator, FilterValue,
    ServerSide, SortDirection, SortKey, TableScope,
};
pub use registry::{EntityKind, RegistryCache, RegistryData, RegistryLoader};
pub use schema::{Cell, ColumnDefinition, FetchResult, Row};
pub use selection::SelectionTracker;
pub use sse::{SseDecoder, SseEvent, SseFrame};
pub use stream::{
    ConnectionState, EventStream, EventTransport, JobStream, JobView, StreamPolicy, StreamTarget,
};
pub use table::{AssetFetcher, FetchOutcome, PageInfo, TableController, TableOptions, TableView};
