//! # Portal Item Source
//!
//! HTTP implementation of [`ItemSource`] over a portal's content REST
//! surface. Item metadata comes from `…/content/items/<id>?f=json` and
//! payloads stream from `…/content/items/<id>/data`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::{
    client::create_client,
    config::DownloadConfig,
    error::ProvisError,
    item::{ItemDescriptor, ItemSource, ItemStream, validate_item_id},
};

/// Credential strategy consulted per request.
///
/// Implementations produce a bearer token for the portal, refreshing it
/// as needed. `Ok(None)` sends the request unauthenticated. The provider
/// is handed to the client at construction time; there is no ambient or
/// process-wide credential state.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Result<Option<String>, ProvisError>;
}

/// A credential provider that always returns the same token
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn token(&self) -> Result<Option<String>, ProvisError> {
        Ok(Some(self.token.clone()))
    }
}

/// Configuration for a portal client
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Base transport configuration
    pub base: DownloadConfig,
    /// Root of the portal's sharing REST API,
    /// e.g. `https://portal.example.com/sharing/rest`
    pub url: String,
}

impl PortalConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            base: DownloadConfig::default(),
            url: url.into(),
        }
    }
}

/// Item document returned by the portal's item endpoint
#[derive(Debug, Deserialize)]
struct ItemDoc {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    /// Last-modified timestamp in epoch milliseconds
    #[serde(default)]
    modified: Option<i64>,
    /// Payload size in bytes; portals report -1 when unknown
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    error: Option<PortalErrorDoc>,
}

/// Error document some portals embed in an HTTP 200 body
#[derive(Debug, Deserialize)]
struct PortalErrorDoc {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

fn descriptor_from_doc(item_id: &str, doc: ItemDoc) -> Result<ItemDescriptor, ProvisError> {
    if let Some(error) = doc.error {
        // Missing items surface as an embedded 400 with a success status
        if error.code == 400 || error.code == 404 {
            return Err(ProvisError::ItemNotFound(item_id.to_string()));
        }
        return Err(ProvisError::MetadataError(format!(
            "portal error {}: {}",
            error.code, error.message
        )));
    }

    let modified_ms = doc
        .modified
        .ok_or_else(|| ProvisError::MetadataError(format!("{item_id}: missing modified field")))?;
    let modified = DateTime::<Utc>::from_timestamp_millis(modified_ms).ok_or_else(|| {
        ProvisError::MetadataError(format!("{item_id}: modified timestamp out of range"))
    })?;

    let name = doc
        .name
        .or(doc.title)
        .unwrap_or_else(|| item_id.to_string());

    Ok(ItemDescriptor {
        id: item_id.to_string(),
        name,
        modified,
        size: doc.size.filter(|s| *s >= 0).map(|s| s as u64),
    })
}

fn content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}

/// HTTP client for a single portal
pub struct PortalClient {
    client: Client,
    config: PortalConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl PortalClient {
    /// Create a client for the portal rooted at `url` with default
    /// transport configuration
    pub fn new(url: impl Into<String>) -> Result<Self, ProvisError> {
        Self::with_config(PortalConfig::new(url))
    }

    /// Create a client with custom configuration
    pub fn with_config(config: PortalConfig) -> Result<Self, ProvisError> {
        let client = create_client(&config.base)?;
        Ok(Self {
            client,
            config,
            credentials: None,
        })
    }

    /// Attach a credential strategy consulted on every request
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn endpoint(&self, item_id: &str, suffix: &str) -> Result<Url, ProvisError> {
        let base = self.config.url.trim_end_matches('/');
        let raw = format!("{base}/content/items/{item_id}{suffix}");
        raw.parse::<Url>()
            .map_err(|e| ProvisError::UrlError(format!("{raw}: {e}")))
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ProvisError> {
        if let Some(provider) = &self.credentials {
            if let Some(token) = provider.token().await? {
                return Ok(request.bearer_auth(token));
            }
        }
        Ok(request)
    }

    #[instrument(skip(self), level = "debug")]
    async fn resolve_item(&self, item_id: &str) -> Result<ItemDescriptor, ProvisError> {
        validate_item_id(item_id)?;

        let url = self.endpoint(item_id, "")?;
        debug!(url = %url, "Resolving item metadata");

        let request = self.client.get(url).query(&[("f", "json")]);
        let response = self.authorize(request).await?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProvisError::ItemNotFound(item_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(ProvisError::StatusCode(response.status()));
        }

        let doc: ItemDoc = response.json().await?;
        descriptor_from_doc(item_id, doc)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), level = "debug")]
    async fn open_payload(&self, item: &ItemDescriptor) -> Result<ItemStream, ProvisError> {
        let url = self.endpoint(&item.id, "/data")?;
        info!(url = %url, "Starting payload download");

        let request = self.client.get(url);
        let response = self.authorize(request).await?.send().await?;

        if !response.status().is_success() {
            return Err(ProvisError::StatusCode(response.status()));
        }

        let total_bytes = response.content_length().or(item.size);
        Ok(ItemStream {
            stream: response
                .bytes_stream()
                .map(|result| result.map_err(ProvisError::from))
                .boxed(),
            total_bytes,
            offset: 0,
        })
    }

    /// Ranged payload request. Falls back to a full download when the
    /// server does not advertise byte ranges or a validator, or when it
    /// answers the conditional request with a fresh `200 OK`.
    #[instrument(skip(self, item), fields(item_id = %item.id), level = "debug")]
    async fn open_payload_from(
        &self,
        item: &ItemDescriptor,
        offset: u64,
    ) -> Result<ItemStream, ProvisError> {
        if offset == 0 {
            return self.open_payload(item).await;
        }

        let url = self.endpoint(&item.id, "/data")?;

        // Preflight for range support and a validator to pin the range to
        let head = match self.authorize(self.client.head(url.clone())).await?.send().await {
            Ok(response) if response.status().is_success() => response,
            _ => {
                debug!(url = %url, "Preflight failed, falling back to full download");
                return self.open_payload(item).await;
            }
        };

        let accepts_ranges = head
            .headers()
            .get(header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"));
        let validator = head
            .headers()
            .get(header::ETAG)
            .or_else(|| head.headers().get(header::LAST_MODIFIED))
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let validator = match (accepts_ranges, validator) {
            (true, Some(validator)) => validator,
            _ => {
                debug!(url = %url, "Server cannot resume, starting over");
                return self.open_payload(item).await;
            }
        };

        info!(url = %url, offset, "Resuming payload download");
        let request = self
            .client
            .get(url)
            .header(header::RANGE, format!("bytes={offset}-"))
            .header(header::IF_RANGE, validator);
        let response = self.authorize(request).await?.send().await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let total_bytes = content_range_total(&response)
                    .or_else(|| response.content_length().map(|len| offset + len))
                    .or(item.size);
                Ok(ItemStream {
                    stream: response
                        .bytes_stream()
                        .map(|result| result.map_err(ProvisError::from))
                        .boxed(),
                    total_bytes,
                    offset,
                })
            }
            // The on-disk copy is at least as long as the server's
            // entity; restart from zero rather than failing the job
            StatusCode::RANGE_NOT_SATISFIABLE => self.open_payload(item).await,
            // Validator mismatch or ranges ignored: the server sent the
            // whole payload again
            StatusCode::OK => {
                let total_bytes = response.content_length().or(item.size);
                Ok(ItemStream {
                    stream: response
                        .bytes_stream()
                        .map(|result| result.map_err(ProvisError::from))
                        .boxed(),
                    total_bytes,
                    offset: 0,
                })
            }
            status => Err(ProvisError::StatusCode(status)),
        }
    }
}

#[async_trait]
impl ItemSource for PortalClient {
    async fn resolve(&self, item_id: &str) -> Result<ItemDescriptor, ProvisError> {
        self.resolve_item(item_id).await
    }

    async fn open(&self, item: &ItemDescriptor) -> Result<ItemStream, ProvisError> {
        self.open_payload(item).await
    }

    async fn open_from(
        &self,
        item: &ItemDescriptor,
        offset: u64,
    ) -> Result<ItemStream, ProvisError> {
        self.open_payload_from(item, offset).await
    }
}
