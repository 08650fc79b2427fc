//! HTTP client for the catalog backend.
//!
//! [`ApiClient`] implements every collaborator trait of the core
//! ([`AssetFetcher`], [`RegistryLoader`], [`JobActions`], [`EventTransport`]),
//! so controllers, caches and trackers can be wired to the real backend or
//! to test doubles interchangeably.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use tessera_core::{Error, JobId, ProviderId, Result};

use crate::config::ClientConfig;
use crate::job::{Job, JobActions, JobKind};
use crate::query::FetchRequest;
use crate::registry::{Actor, Provider, RegistryData, RegistryLoader};
use crate::schema::FetchResult;
use crate::sse::SseDecoder;
use crate::stream::{EventStream, EventTransport, StreamTarget};
use crate::table::AssetFetcher;

const LAST_EVENT_ID: &str = "Last-Event-ID";

/// API client for the catalog endpoints.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a new API client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .build()
            .map_err(|e| Error::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            token: config.api_token.clone(),
            timeout: config.request_timeout,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// A request with the configured deadline. Event streams skip this.
    fn call(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.request(method, path);
        match self.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    async fn send(req: RequestBuilder) -> Result<Response> {
        let response = req.send().await.map_err(Error::transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
        Self::send(req).await?.json().await.map_err(Error::decode)
    }

    /// Like `send_json`, but an empty body is `None`.
    async fn send_optional<T: DeserializeOwned>(req: RequestBuilder) -> Result<Option<T>> {
        let text = Self::send(req).await?.text().await.map_err(Error::transport)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map(Some).map_err(Error::decode)
    }

    /// Fetches one job.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn get_job(&self, id: JobId, kind: JobKind) -> Result<Job> {
        let path = format!("/{}/{id}", kind.path_segment());
        Self::send_json(self.call(Method::GET, &path)).await
    }

    /// Lists providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn list_providers(&self) -> Result<Vec<Provider>> {
        Self::send_json(self.call(Method::GET, "/providers")).await
    }

    /// Lists actors.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn list_actors(&self) -> Result<Vec<Actor>> {
        Self::send_json(self.call(Method::GET, "/actors")).await
    }

    /// Scans the given providers, or all of them when `ids` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn run_sources(&self, ids: &[ProviderId]) -> Result<Job> {
        let mut req = self.call(Method::POST, "/sources/run");
        if !ids.is_empty() {
            let ids = ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            req = req.query(&[("ids", ids)]);
        }
        Self::send_json(req).await
    }

    /// Starts a processing pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn run_processors(&self) -> Result<Job> {
        Self::send_json(self.call(Method::POST, "/processors/run")).await
    }

    /// Runs every analyzer.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn run_analyzers(&self) -> Result<Job> {
        Self::send_json(self.call(Method::POST, "/analyzers/all/run")).await
    }
}

#[async_trait]
impl AssetFetcher for ApiClient {
    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchResult> {
        let req = self
            .call(Method::GET, &request.scope.path())
            .query(&request.query_pairs());
        Self::send_json(req).await
    }
}

#[async_trait]
impl RegistryLoader for ApiClient {
    async fn load_registry(&self) -> Result<RegistryData> {
        let (providers, actors) = futures::try_join!(self.list_providers(), self.list_actors())?;
        tracing::debug!(
            providers = providers.len(),
            actors = actors.len(),
            "reference registry loaded"
        );
        Ok(RegistryData::from_lists(providers, actors))
    }
}

#[async_trait]
impl JobActions for ApiClient {
    async fn cancel_job(&self, id: JobId) -> Result<Option<Job>> {
        Self::send_optional(self.call(Method::POST, &format!("/snapshots/{id}/cancel"))).await
    }

    async fn delete_job(&self, id: JobId) -> Result<()> {
        Self::send(self.call(Method::DELETE, &format!("/snapshots/{id}")))
            .await
            .map(|_| ())
    }

    async fn update_message(&self, id: JobId, message: &str) -> Result<Job> {
        let req = self
            .call(Method::PATCH, &format!("/changesets/{id}"))
            .json(&serde_json::json!({ "message": message }));
        Self::send_json(req).await
    }

    async fn finish_job(&self, id: JobId) -> Result<Option<Job>> {
        Self::send_optional(self.call(Method::POST, &format!("/changesets/{id}/finish"))).await
    }
}

#[async_trait]
impl EventTransport for ApiClient {
    async fn connect(&self, target: &StreamTarget) -> Result<EventStream> {
        let mut req = self
            .request(Method::GET, &target.path())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(id) = &target.last_event_id {
            req = req.header(LAST_EVENT_ID, id.as_str());
        }
        let response = Self::send(req).await?;

        let mut decoder = SseDecoder::new();
        let frames = response.bytes_stream().flat_map(move |chunk| {
            let items: Vec<Result<_>> = match chunk {
                Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect(),
                Err(err) => vec![Err(Error::transport(err))],
            };
            futures::stream::iter(items)
        });
        Ok(frames.boxed())
    }
}
