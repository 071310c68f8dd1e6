//! Federation-specific error types.

use thiserror::Error;

/// Errors that can occur in federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    // ── Key management ──────────────────────────────────────────────────────

    #[error("Failed to load signing key from storage: {0}")]
    KeyLoad(String),

    // ── Signatures ───────────────────────────────────────────────────────────

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Cannot sign a JSON value that is not an object")]
    NotAnObject,

    // ── Discovery ───────────────────────────────────────────────────────────

    #[error("Failed to resolve server '{0}': {1}")]
    DiscoveryFailed(String, String),

    // ── Remote communication ─────────────────────────────────────────────────

    #[error("HTTP error communicating with remote server '{0}': {1}")]
    RemoteHttp(String, String),

    #[error("Request to remote server '{0}' timed out")]
    Timeout(String),

    // ── General ─────────────────────────────────────────────────────────────

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for FederationError {
    fn from(e: reqwest::Error) -> Self {
        let server = e.url().map(|u| u.host_str().unwrap_or("?").to_owned()).unwrap_or_default();
        if e.is_timeout() {
            return FederationError::Timeout(server);
        }
        FederationError::RemoteHttp(server, e.to_string())
    }
}
