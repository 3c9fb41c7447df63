//! Retry and failure classification
//!
//! Consulted by the gateway (same-provider retry vs fallback) and by the
//! orchestrator (stage-level retry bounded by the job's retry budget).

use crate::error::ProviderError;

/// What to do about a failed provider call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Transient on this provider; retry the same provider up to its cap
    Retryable,
    /// Do not retry this provider; move to the next one in the chain
    Fallback,
    /// No provider can satisfy this request; escalate immediately
    Permanent,
}

/// Classify a provider failure.
///
/// - Timeouts, rate limits, transient upstream 5xx, and network drops are
///   retryable on the same provider.
/// - Authentication and configuration failures fall through to the next
///   provider at once: retrying a misconfigured provider cannot succeed.
/// - Malformed responses also fall through; the request itself is fine and
///   another provider may answer it properly.
/// - An invalid request is permanent: every provider would reject it.
pub fn classify(error: &ProviderError) -> Disposition {
    match error {
        ProviderError::Timeout { .. }
        | ProviderError::RateLimited { .. }
        | ProviderError::Network { .. } => Disposition::Retryable,

        ProviderError::Upstream { status, .. } => {
            if *status >= 500 {
                Disposition::Retryable
            } else {
                Disposition::Fallback
            }
        }

        ProviderError::Auth { .. }
        | ProviderError::Config { .. }
        | ProviderError::InvalidResponse { .. } => Disposition::Fallback,

        ProviderError::InvalidRequest { .. } => Disposition::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert_eq!(
            classify(&ProviderError::Timeout { timeout_ms: 3000 }),
            Disposition::Retryable
        );
        assert_eq!(
            classify(&ProviderError::RateLimited {
                retry_after_secs: Some(5)
            }),
            Disposition::Retryable
        );
        assert_eq!(
            classify(&ProviderError::Upstream {
                status: 502,
                message: "bad gateway".into()
            }),
            Disposition::Retryable
        );
        assert_eq!(
            classify(&ProviderError::Network {
                message: "connection reset".into()
            }),
            Disposition::Retryable
        );
    }

    #[test]
    fn test_auth_and_config_fall_back_immediately() {
        assert_eq!(
            classify(&ProviderError::Auth {
                message: "invalid key".into()
            }),
            Disposition::Fallback
        );
        assert_eq!(
            classify(&ProviderError::Config {
                message: "no api key".into()
            }),
            Disposition::Fallback
        );
    }

    #[test]
    fn test_upstream_4xx_falls_back() {
        assert_eq!(
            classify(&ProviderError::Upstream {
                status: 409,
                message: String::new()
            }),
            Disposition::Fallback
        );
    }

    #[test]
    fn test_invalid_request_is_permanent() {
        assert_eq!(
            classify(&ProviderError::InvalidRequest {
                message: "media too long".into()
            }),
            Disposition::Permanent
        );
    }
}
