//! Outbound gateway to the ArchZero REST API.
//!
//! Every request goes through [`ApiClient`], which:
//! - reads the bearer token from the mirrored [`TOKEN_KEY`] storage slot and
//!   attaches it as `Authorization: Bearer <token>`
//! - maps "no response" to [`ApiError::Transport`] and non-2xx responses to
//!   [`ApiError::Http`]
//!
//! There is no retry: every failure is reported to the caller exactly once.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::error::ValidationError;
use crate::scope::Cancelled;
use crate::storage::{KeyValueStorage, StorageError, TOKEN_KEY};

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    /// No response reached the client.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("HTTP error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Request cancelled")]
    Cancelled,
}

impl From<Cancelled> for ApiError {
    fn from(_: Cancelled) -> Self {
        ApiError::Cancelled
    }
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Human-readable message embedded in an HTTP error body, if the backend
    /// sent one. Looks at the `message`, `error` and `detail` string fields
    /// of a JSON object, in that order.
    pub fn server_message(&self) -> Option<String> {
        let ApiError::Http { body, .. } = self else {
            return None;
        };
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        ["message", "error", "detail"]
            .iter()
            .filter_map(|field| value.get(*field).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|msg| !msg.is_empty())
            .map(str::to_string)
    }
}

// ============================================================================
// ApiClient
// ============================================================================

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    storage: Arc<dyn KeyValueStorage>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: &ApiConfig, storage: Arc<dyn KeyValueStorage>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            storage,
        })
    }

    /// Create a client against a custom base URL with default settings
    /// (for testing / integration).
    pub fn with_base_url(
        base_url: impl Into<String>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ApiError> {
        let config = ApiConfig {
            base_url: base_url.into(),
            ..ApiConfig::default()
        };
        Self::new(&config, storage)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The storage whose [`TOKEN_KEY`] slot supplies the bearer token.
    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.storage
    }

    pub async fn get_json<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let mut request = self.request(Method::GET, path)?;
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = self.send(Method::GET, path, request).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path)?.json(body);
        let response = self.send(Method::POST, path, request).await?;
        decode(response).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::PATCH, path)?.json(body);
        let response = self.send(Method::PATCH, path, request).await?;
        decode(response).await
    }

    /// `DELETE` with the response body ignored.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, path)?;
        self.send(Method::DELETE, path, request).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);
        if let Some(token) = self.storage.get(TOKEN_KEY)? {
            let token = token.trim();
            if !token.is_empty() {
                request = request.bearer_auth(token);
            }
        }
        Ok(request)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%method, path, error = %e, "ArchZero API unreachable");
                return Err(ApiError::Transport(e));
            }
        };

        let status = response.status();
        tracing::debug!(%method, path, status = status.as_u16(), "ArchZero API response");

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(%method, path, error = %e, "Failed to read error response body");
                    String::new()
                }
            };
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(ApiError::Transport)?;
    Ok(serde_json::from_slice(&bytes)?)
}

// ============================================================================
// TESTS
// ============================================================================
