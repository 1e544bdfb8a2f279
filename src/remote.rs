//! Shared HTTP plumbing for the remote vision, edit, and title services
//!
//! Each service is a JSON-over-HTTP endpoint. Images travel as base64 PNG.
//! Authentication is an optional bearer token.

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::photo::{EncodeError, Photograph};
use crate::retry::Retryable;

/// Default per-request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Longest response body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 512;

// ============================================================
// Configuration
// ============================================================

/// Connection settings for one remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL, e.g. `https://vision.internal/v1`
    pub base_url: Option<String>,
    /// Bearer token
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    /// Config pointing at `base_url` with no key
    pub fn at(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

// ============================================================
// Error Types
// ============================================================

/// Transport-level failure talking to a remote service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Service not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },
}

impl Retryable for RemoteError {
    fn is_transient(&self) -> bool {
        match self {
            RemoteError::Network { .. } | RemoteError::Timeout { .. } => true,
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
            RemoteError::NotConfigured(_)
            | RemoteError::Client(_)
            | RemoteError::Malformed { .. } => false,
        }
    }
}

// ============================================================
// Client
// ============================================================

/// Blocking JSON client bound to one service
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteClient {
    /// Build a client; `name` is only used in error messages
    pub fn new(name: &str, config: &ServiceConfig) -> Result<Self, RemoteError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RemoteError::NotConfigured(format!("{}.base_url is not set", name)))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// Full URL for an endpoint path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST a JSON body and decode a JSON response
    pub fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let endpoint = self.url(path);
        debug!("POST {}", endpoint);

        let mut request = self.http.post(&endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout {
                    endpoint: endpoint.clone(),
                }
            } else {
                RemoteError::Network {
                    endpoint: endpoint.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().map_err(|e| RemoteError::Network {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                endpoint,
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        serde_json::from_str(&text).map_err(|e| RemoteError::Malformed {
            endpoint,
            message: e.to_string(),
        })
    }
}

// ============================================================
// Image payload helpers
// ============================================================

/// PNG-encode and base64 a photograph for a request body
pub fn encode_image(photo: &Photograph) -> Result<String, EncodeError> {
    Ok(STANDARD.encode(photo.encode_png()?))
}

/// Decode a base64 image payload from a response body
///
/// Accepts an optional `data:image/...;base64,` prefix.
pub fn decode_image(payload: &str) -> Result<Photograph, String> {
    let data = payload
        .split_once(";base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(payload)
        .trim();

    let bytes = STANDARD
        .decode(data)
        .map_err(|e| format!("invalid base64 image: {}", e))?;

    Photograph::decode(&bytes).map_err(|e| e.to_string())
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
