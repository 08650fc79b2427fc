//! Client configuration.

use std::time::Duration;

use tessera_core::{Error, Result};

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Default number of rows requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Default quiet period before a search refetch fires.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default delay before a dropped event stream reconnects.
pub const DEFAULT_STREAM_RETRY: Duration = Duration::from_millis(3000);

/// Settings shared by the API client, table controllers and job streams.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the catalog backend.
    pub api_url: String,
    /// Bearer token attached to every request.
    pub api_token: Option<String>,
    /// Per-request deadline for plain JSON calls. Event streams never time out.
    pub request_timeout: Option<Duration>,
    /// Rows per page for new table controllers.
    pub page_size: u64,
    /// Quiet period for debounced search.
    pub search_debounce: Duration,
    /// Reconnect delay for event streams until the server sends `retry:`.
    pub stream_retry: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("page_size", &self.page_size)
            .field("search_debounce", &self.search_debounce)
            .field("stream_retry", &self.stream_retry)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            request_timeout: None,
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            stream_retry: DEFAULT_STREAM_RETRY,
        }
    }
}

impl ClientConfig {
    /// Creates a config pointing at `api_url` with all other settings defaulted.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from `TESSERA_*` environment variables.
    ///
    /// Unset or blank variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when a numeric variable does not parse
    /// or the page size is zero.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = env_string("TESSERA_API_URL") {
            config.api_url = url;
        }
        config.api_token = env_string("TESSERA_API_TOKEN");
        if let Some(size) = env_u64("TESSERA_PAGE_SIZE")? {
            config.page_size = size;
        }
        if let Some(ms) = env_u64("TESSERA_SEARCH_DEBOUNCE_MS")? {
            config.search_debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("TESSERA_STREAM_RETRY_MS")? {
            config.stream_retry = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("TESSERA_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that the rest of the client relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty URL or a zero page size.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(Error::InvalidInput("api_url must not be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidInput(
                "page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The API URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().expect("default config is valid");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.page_size, 100);
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let config = ClientConfig::new("https://catalog.example.com/api/");
        assert_eq!(config.base_url(), "https://catalog.example.com/api");
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = ClientConfig {
            page_size: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn debug_redacts_token() {
        let config = ClientConfig {
            api_token: Some("secret-token".to_string()),
            ..ClientConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
