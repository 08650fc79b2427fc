//! # tessera-core
//!
//! Shared primitives for the tessera catalog client:
//!
//! - **Identifiers**: Strongly-typed integer IDs for jobs, views, collections,
//!   providers and actors
//! - **Error Types**: Shared error definitions and result types
//! - **Canonical Keys**: Deterministic JSON rendering used for request identity
//! - **Observability**: Logging initialisation and span helpers
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::prelude::*;
//!
//! let job = JobId::new(42);
//! let key = to_canonical_string(&serde_json::json!({"b": 1, "a": 2})).unwrap();
//! assert_eq!(key, r#"{"a":2,"b":1}"#);
//! assert_eq!(job.get(), 42);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical;
pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::canonical::to_canonical_string;
    pub use crate::error::{Error, Result};
    pub use crate::id::{ActorId, AssetId, CollectionId, JobId, ProviderId, ViewId};
}

pub use canonical::to_canonical_string;
pub use error::{Error, Result};
pub use id::{ActorId, AssetId, CollectionId, JobId, ProviderId, ViewId};
pub use observability::{
    LogFormat, init_logging, init_logging_with_default, job_span, table_span,
};
