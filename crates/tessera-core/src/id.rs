//! Strongly-typed identifiers for catalog entities.
//!
//! The backend keys everything by integer. Wrapping each kind in its own type
//! keeps a job id from being passed where a view id is expected.
//!
//! # Example
//!
//! ```rust
//! use tessera_core::id::{JobId, ViewId};
//!
//! let job: JobId = "42".parse().unwrap();
//! let view = ViewId::new(3);
//! assert_eq!(job.get(), 42);
//! assert_eq!(view.to_string(), "3");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.trim().parse::<i64>().map(Self).map_err(|e| Error::InvalidId {
                    message: format!("invalid {} '{s}': {e}", $label),
                })
            }
        }
    };
}

numeric_id!(
    /// A tracked job: one snapshot (automated run) or changeset (manual session).
    JobId,
    "job ID"
);

numeric_id!(
    /// A server-defined view (schema + default sort) over assets.
    ViewId,
    "view ID"
);

numeric_id!(
    /// A derived asset collection.
    CollectionId,
    "collection ID"
);

numeric_id!(
    /// A provider (source) that assets are scanned from.
    ProviderId,
    "provider ID"
);

numeric_id!(
    /// An actor (user or automation) that authored a change.
    ActorId,
    "actor ID"
);

numeric_id!(
    /// A single asset row.
    AssetId,
    "asset ID"
);
