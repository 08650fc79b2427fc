//! Error types and result aliases for tessera.
//!
//! Every variant carries owned strings only, so errors are `Clone`. A single
//! failed registry load is handed to all of its waiters, which requires it.

use std::fmt;

/// The result type used throughout tessera.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tessera operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The request never produced an HTTP response (connect, DNS, body read).
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The server answered with a non-2xx status.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body text, possibly empty.
        body: String,
    },

    /// A response body could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// A server-sent event payload could not be parsed.
    #[error("malformed {event} event: {message}")]
    MalformedEvent {
        /// The event name.
        event: String,
        /// Description of the parse failure.
        message: String,
    },

    /// The action is not available for this job.
    #[error("{action} is not supported: {reason}")]
    UnsupportedAction {
        /// The attempted action.
        action: &'static str,
        /// Why the action is unavailable.
        reason: String,
    },

    /// The job is not tracked by the progress aggregator.
    #[error("job {job_id} is not tracked")]
    NotTracked {
        /// The job that was looked up.
        job_id: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new transport error.
    #[must_use]
    pub fn transport(message: impl fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    /// Creates a new decode error.
    #[must_use]
    pub fn decode(message: impl fmt::Display) -> Self {
        Self::Decode {
            message: message.to_string(),
        }
    }

    /// Creates a new malformed event error.
    #[must_use]
    pub fn malformed_event(event: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedEvent {
            event: event.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The message shown next to the control that triggered the failure.
    ///
    /// API errors surface the response body text; an empty body falls back
    /// to the status line.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Api { status, body } if body.trim().is_empty() => {
                format!("request failed with status {status}")
            }
            Self::Api { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}
