//! Provider error taxonomy

use thiserror::Error;

/// Result type for provider adapter calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Failure modes of a single provider call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("provider misconfigured: {message}")]
    Config { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("network error: {message}")]
    Network { message: String },
}

impl ProviderError {
    /// Short label used in attempt records and metrics
    pub fn label(&self) -> &'static str {
        match self {
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Upstream { .. } => "upstream",
            ProviderError::Auth { .. } => "auth",
            ProviderError::Config { .. } => "config",
            ProviderError::InvalidRequest { .. } => "invalid_request",
            ProviderError::InvalidResponse { .. } => "invalid_response",
            ProviderError::Network { .. } => "network",
        }
    }

    /// Map a reqwest transport failure onto the taxonomy
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout { timeout_ms: 0 }
        } else if err.is_connect() {
            ProviderError::Network {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            ProviderError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ProviderError::Network {
                message: err.to_string(),
            }
        }
    }

    /// Map an HTTP status + body onto the taxonomy
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth { message: body },
            429 => ProviderError::RateLimited {
                retry_after_secs: None,
            },
            400 | 404 | 413 | 415 | 422 => ProviderError::InvalidRequest { message: body },
            _ => ProviderError::Upstream {
                status,
                message: body,
            },
        }
    }
}
