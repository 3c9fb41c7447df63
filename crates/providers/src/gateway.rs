//! Provider gateway with ordered fallback chains
//!
//! Resolves a capability plus an optional language hint to an ordered list
//! of registered providers (data-driven from `ChainsConfig`) and invokes
//! them in priority order:
//!
//! 1. each call runs under a per-call timeout;
//! 2. retryable failures are retried on the same provider up to its
//!    configured attempt cap, with exponential backoff between attempts;
//! 3. auth/configuration failures skip straight to the next provider;
//! 4. a permanent failure aborts the chain;
//! 5. exhausting the chain yields `AllProvidersFailed` with the full
//!    attempt trail, so stage metadata records which providers were tried.

use crate::classify::{classify, Disposition};
use crate::error::ProviderError;
use crate::image::{GeneratedImage, ImageGenerator, ImageRequest};
use crate::text::{TextGenerator, TextRequest};
use crate::transcribe::{TranscribeRequest, Transcriber, Transcript};
use clipforge_common::config::ChainsConfig;
use clipforge_common::job::AttemptRecord;
use clipforge_common::metrics::record_provider_call;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-provider timeout and retry settings
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Per-call timeout
    pub timeout: Duration,
    /// Same-provider attempt cap for retryable failures
    pub max_attempts: u32,
    /// Base backoff delay; attempt n sleeps base * 2^(n-1)
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 2,
            backoff_base: Duration::from_millis(100),
        }
    }
}

/// Successful gateway invocation, with the provider trail
#[derive(Clone, Debug)]
pub struct GatewayOutcome<T> {
    pub value: T,
    /// Provider that produced the value
    pub provider: String,
    /// Every attempt made, failures included
    pub attempts: Vec<AttemptRecord>,
}

/// Gateway-level failures
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("all providers failed for {capability}")]
    AllProvidersFailed {
        capability: String,
        attempts: Vec<AttemptRecord>,
    },

    #[error("no providers registered for {capability}")]
    EmptyChain { capability: String },

    #[error("permanent failure on {provider}: {error}")]
    Permanent {
        capability: String,
        provider: String,
        error: ProviderError,
        attempts: Vec<AttemptRecord>,
    },
}

impl GatewayError {
    /// The attempt trail, for stage error detail
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            GatewayError::AllProvidersFailed { attempts, .. } => attempts,
            GatewayError::EmptyChain { .. } => &[],
            GatewayError::Permanent { attempts, .. } => attempts,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, GatewayError::Permanent { .. })
    }
}

struct Registered<P: ?Sized> {
    provider: Arc<P>,
    policy: RetryPolicy,
}

impl<P: ?Sized> Clone for Registered<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            policy: self.policy,
        }
    }
}

/// Typed registry mapping capability + language to ordered provider chains
pub struct ProviderGateway {
    chains: ChainsConfig,
    transcribers: HashMap<String, Registered<dyn Transcriber>>,
    text_generators: HashMap<String, Registered<dyn TextGenerator>>,
    image_generators: HashMap<String, Registered<dyn ImageGenerator>>,
}

impl ProviderGateway {
    pub fn builder(chains: ChainsConfig) -> GatewayBuilder {
        GatewayBuilder {
            gateway: ProviderGateway {
                chains,
                transcribers: HashMap::new(),
                text_generators: HashMap::new(),
                image_generators: HashMap::new(),
            },
        }
    }

    /// Transcribe through the language-aware chain
    pub async fn transcribe(
        &self,
        request: &TranscribeRequest,
    ) -> Result<GatewayOutcome<Transcript>, GatewayError> {
        let order = self
            .chains
            .transcription
            .order_for(request.language.as_deref());
        let chain = resolve_chain(&self.transcribers, order);
        run_chain("transcription", chain, |p| {
            let req = request.clone();
            async move { p.transcribe(&req).await }
        })
        .await
    }

    /// Generate text through the language-aware chain
    pub async fn generate_text(
        &self,
        language: Option<&str>,
        request: &TextRequest,
    ) -> Result<GatewayOutcome<String>, GatewayError> {
        let order = self.chains.text.order_for(language);
        let chain = resolve_chain(&self.text_generators, order);
        run_chain("text_generation", chain, |p| {
            let req = request.clone();
            async move { p.generate_text(&req).await }
        })
        .await
    }

    /// Generate an image through the chain
    pub async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<GatewayOutcome<GeneratedImage>, GatewayError> {
        let order = self.chains.image.order_for(None);
        let chain = resolve_chain(&self.image_generators, order);
        run_chain("image_generation", chain, |p| {
            let req = request.clone();
            async move { p.generate_image(&req).await }
        })
        .await
    }

    /// Names of registered transcription providers (startup logging)
    pub fn transcriber_names(&self) -> Vec<&str> {
        self.transcribers.keys().map(|s| s.as_str()).collect()
    }
}

/// Builder collecting providers at startup
pub struct GatewayBuilder {
    gateway: ProviderGateway,
}

impl GatewayBuilder {
    pub fn transcriber(mut self, provider: Arc<dyn Transcriber>, policy: RetryPolicy) -> Self {
        let name = provider.name().to_string();
        self.gateway
            .transcribers
            .insert(name, Registered { provider, policy });
        self
    }

    pub fn text_generator(mut self, provider: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        let name = provider.name().to_string();
        self.gateway
            .text_generators
            .insert(name, Registered { provider, policy });
        self
    }

    pub fn image_generator(
        mut self,
        provider: Arc<dyn ImageGenerator>,
        policy: RetryPolicy,
    ) -> Self {
        let name = provider.name().to_string();
        self.gateway
            .image_generators
            .insert(name, Registered { provider, policy });
        self
    }

    pub fn build(self) -> ProviderGateway {
        self.gateway
    }
}

/// Keep only the configured names that are actually registered, in order
fn resolve_chain<P: ?Sized>(
    registered: &HashMap<String, Registered<P>>,
    order: &[String],
) -> Vec<(String, Registered<P>)> {
    order
        .iter()
        .filter_map(|name| {
            let entry = registered.get(name)?;
            Some((name.clone(), entry.clone()))
        })
        .collect()
}

/// Iterate the chain, retrying per provider and falling back on failure
async fn run_chain<P, T, F, Fut>(
    capability: &str,
    chain: Vec<(String, Registered<P>)>,
    call: F,
) -> Result<GatewayOutcome<T>, GatewayError>
where
    P: ?Sized + Send + Sync,
    F: Fn(Arc<P>) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if chain.is_empty() {
        return Err(GatewayError::EmptyChain {
            capability: capability.to_string(),
        });
    }

    let mut attempts: Vec<AttemptRecord> = Vec::new();

    for (name, entry) in chain {
        let policy = entry.policy;

        for attempt in 0..policy.max_attempts {
            if attempt > 0 {
                let delay = policy.backoff_base * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            let result =
                match tokio::time::timeout(policy.timeout, call(Arc::clone(&entry.provider))).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout {
                        timeout_ms: policy.timeout.as_millis() as u64,
                    }),
                };

            match result {
                Ok(value) => {
                    record_provider_call(&name, "success");
                    attempts.push(AttemptRecord {
                        provider: name.clone(),
                        outcome: "success".to_string(),
                    });
                    debug!(capability, provider = %name, attempt, "provider call succeeded");
                    return Ok(GatewayOutcome {
                        value,
                        provider: name,
                        attempts,
                    });
                }
                Err(err) => {
                    record_provider_call(&name, err.label());
                    attempts.push(AttemptRecord {
                        provider: name.clone(),
                        outcome: err.label().to_string(),
                    });

                    match classify(&err) {
                        Disposition::Retryable => {
                            warn!(
                                capability,
                                provider = %name,
                                attempt = attempt + 1,
                                max_attempts = policy.max_attempts,
                                error = %err,
                                "retryable provider failure"
                            );
                            // Loop continues until the attempt cap, then
                            // falls through to the next provider.
                        }
                        Disposition::Fallback => {
                            warn!(
                                capability,
                                provider = %name,
                                error = %err,
                                "provider failure, falling back"
                            );
                            break;
                        }
                        Disposition::Permanent => {
                            warn!(
                                capability,
                                provider = %name,
                                error = %err,
                                "permanent failure, aborting chain"
                            );
                            return Err(GatewayError::Permanent {
                                capability: capability.to_string(),
                                provider: name,
                                error: err,
                                attempts,
                            });
                        }
                    }
                }
            }
        }
    }

    Err(GatewayError::AllProvidersFailed {
        capability: capability.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTextGenerator, MockTranscriber};
    use clipforge_common::config::ChainConfig;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
        }
    }

    fn chains(transcription_order: Vec<String>) -> ChainsConfig {
        let mut chains = ChainsConfig::default();
        chains.transcription = ChainConfig {
            default: transcription_order,
            by_language: HashMap::new(),
        };
        chains
    }

    fn request() -> TranscribeRequest {
        TranscribeRequest {
            media: "uploads/a.mp4".into(),
            language: None,
            duration_secs: 60.0,
        }
    }

    #[tokio::test]
    async fn test_primary_success_short_circuits() {
        let a = Arc::new(MockTranscriber::succeeding("a", "hello from a"));
        let b = Arc::new(MockTranscriber::succeeding("b", "hello from b"));

        let gateway = ProviderGateway::builder(chains(vec!["a".into(), "b".into()]))
            .transcriber(a, fast_policy())
            .transcriber(b.clone(), fast_policy())
            .build();

        let outcome = gateway.transcribe(&request()).await.unwrap();
        assert_eq!(outcome.provider, "a");
        assert_eq!(outcome.value.text, "hello from a");
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_retry_cap_then_fallback() {
        // Provider a times out on every call; b succeeds
        let a = Arc::new(MockTranscriber::failing(
            "a",
            ProviderError::Timeout { timeout_ms: 1 },
        ));
        let b = Arc::new(MockTranscriber::succeeding("b", "transcript"));

        let gateway = ProviderGateway::builder(chains(vec!["a".into(), "b".into()]))
            .transcriber(a.clone(), fast_policy())
            .transcriber(b, fast_policy())
            .build();

        let outcome = gateway.transcribe(&request()).await.unwrap();
        assert_eq!(outcome.provider, "b");
        // a was tried exactly max_attempts times, no more
        assert_eq!(a.calls(), 2);
        // The trail records the primary's failures before the success
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(outcome.attempts[0].provider, "a");
        assert_eq!(outcome.attempts[0].outcome, "timeout");
        assert_eq!(outcome.attempts[2].outcome, "success");
    }

    #[tokio::test]
    async fn test_auth_error_skips_retry() {
        let a = Arc::new(MockTranscriber::failing(
            "a",
            ProviderError::Auth {
                message: "bad key".into(),
            },
        ));
        let b = Arc::new(MockTranscriber::succeeding("b", "transcript"));

        let gateway = ProviderGateway::builder(chains(vec!["a".into(), "b".into()]))
            .transcriber(a.clone(), fast_policy())
            .transcriber(b, fast_policy())
            .build();

        let outcome = gateway.transcribe(&request()).await.unwrap();
        assert_eq!(outcome.provider, "b");
        // No same-provider retry for auth failures
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_failed() {
        let a = Arc::new(MockTranscriber::failing(
            "a",
            ProviderError::Upstream {
                status: 500,
                message: "boom".into(),
            },
        ));
        let b = Arc::new(MockTranscriber::failing(
            "b",
            ProviderError::Timeout { timeout_ms: 1 },
        ));

        let gateway = ProviderGateway::builder(chains(vec!["a".into(), "b".into()]))
            .transcriber(a, fast_policy())
            .transcriber(b, fast_policy())
            .build();

        let err = gateway.transcribe(&request()).await.unwrap_err();
        match err {
            GatewayError::AllProvidersFailed {
                capability,
                attempts,
            } => {
                assert_eq!(capability, "transcription");
                // two providers, two attempts each
                assert_eq!(attempts.len(), 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_aborts_chain() {
        let a = Arc::new(MockTranscriber::failing(
            "a",
            ProviderError::InvalidRequest {
                message: "unsupported".into(),
            },
        ));
        let b = Arc::new(MockTranscriber::succeeding("b", "never reached"));

        let gateway = ProviderGateway::builder(chains(vec!["a".into(), "b".into()]))
            .transcriber(a, fast_policy())
            .transcriber(b.clone(), fast_policy())
            .build();

        let err = gateway.transcribe(&request()).await.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_language_rules_pick_chain_order() {
        let assembly = Arc::new(MockTranscriber::succeeding("assemblyai", "en text"));
        let openai = Arc::new(MockTranscriber::succeeding("openai", "any text"));
        let google = Arc::new(MockTranscriber::succeeding("google", "cjk text"));

        let gateway = ProviderGateway::builder(ChainsConfig::default())
            .transcriber(assembly, fast_policy())
            .transcriber(openai, fast_policy())
            .transcriber(google, fast_policy())
            .build();

        let mut req = request();
        req.language = Some("en".into());
        assert_eq!(
            gateway.transcribe(&req).await.unwrap().provider,
            "assemblyai"
        );

        req.language = Some("ja".into());
        assert_eq!(gateway.transcribe(&req).await.unwrap().provider, "google");

        req.language = None;
        assert_eq!(gateway.transcribe(&req).await.unwrap().provider, "openai");
    }

    #[tokio::test]
    async fn test_unregistered_names_are_skipped() {
        let b = Arc::new(MockTranscriber::succeeding("b", "transcript"));
        let gateway = ProviderGateway::builder(chains(vec!["ghost".into(), "b".into()]))
            .transcriber(b, fast_policy())
            .build();

        let outcome = gateway.transcribe(&request()).await.unwrap();
        assert_eq!(outcome.provider, "b");
    }

    #[tokio::test]
    async fn test_empty_chain_errors() {
        let gateway = ProviderGateway::builder(chains(vec![])).build();
        assert!(matches!(
            gateway.transcribe(&request()).await.unwrap_err(),
            GatewayError::EmptyChain { .. }
        ));
    }

    #[tokio::test]
    async fn test_slow_provider_hits_timeout() {
        let slow = Arc::new(MockTextGenerator::slow("slow", Duration::from_secs(5)));
        let fast = Arc::new(MockTextGenerator::succeeding("fast", "titles"));

        let mut chains = ChainsConfig::default();
        chains.text = ChainConfig {
            default: vec!["slow".into(), "fast".into()],
            by_language: HashMap::new(),
        };

        let gateway = ProviderGateway::builder(chains)
            .text_generator(slow, fast_policy())
            .text_generator(fast, fast_policy())
            .build();

        let outcome = gateway
            .generate_text(None, &TextRequest::new("five titles please"))
            .await
            .unwrap();
        assert_eq!(outcome.provider, "fast");
        assert!(outcome
            .attempts
            .iter()
            .any(|a| a.provider == "slow" && a.outcome == "timeout"));
    }
}
