//! Server-to-server HTTP client for `onbind` callbacks.
//!
//! The [`FederationClient`] only POSTs already-signed JSON bodies: signing
//! happens in the caller so the transport stays swappable in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::FederationError;

/// Callback path appended to the resolved homeserver base URL.
pub const ONBIND_PATH: &str = "/_matrix/federation/v1/3pid/onbind";

/// Status and body of a remote answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub status: u16,
    pub body: String,
}

impl CallbackResponse {
    /// Anything below 300 counts as an acknowledgment.
    pub fn is_acknowledged(&self) -> bool {
        self.status < 300
    }
}

/// Delivers a JSON body to a URL. `Err` means no HTTP answer was obtained.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<CallbackResponse, FederationError>;
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Async HTTP client for outbound federation callbacks.
///
/// Internally uses `reqwest` with a connection pool and a per-request timeout.
#[derive(Clone)]
pub struct FederationClient {
    http: Client,
}

impl FederationClient {
    /// Build a client whose requests give up after `timeout`.
    ///
    /// `verify_tls = false` accepts self-signed homeserver certificates.
    pub fn new(timeout: Duration, verify_tls: bool) -> Result<Self, FederationError> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .user_agent(concat!("identd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CallbackTransport for FederationClient {
    async fn post_json(&self, url: &str, body: &Value) -> Result<CallbackResponse, FederationError> {
        debug!("Federation POST {}", url);
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status().as_u16();
        // The body is only kept for logging; a broken body stream must not hide the status.
        let body = resp.text().await.unwrap_or_default();
        Ok(CallbackResponse { status, body })
    }
}
