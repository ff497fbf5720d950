//! Error types for the LedgerBridge domain.
//!
//! Only upstream collaborator failures ever reach a caller; key absence in
//! the session store or cache is modeled as `None`, never as an error.

use thiserror::Error;

/// The top-level error type for LedgerBridge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Upstream collaborator errors ---
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    // --- Session store errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures from either upstream collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by upstream, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid upstream payload: {0}")]
    InvalidPayload(String),
}

impl UpstreamError {
    /// Whether the failure is transient, i.e. a stale cached copy is an
    /// acceptable substitute for fresh data.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        ) || matches!(self, Self::Api { status_code, .. } if *status_code >= 500)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to encode value for key '{key}': {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode value for key '{key}': {reason}")]
    Decode { key: String, reason: String },
}
