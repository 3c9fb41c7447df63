//! Vendor adapters and gateway construction
//!
//! Each adapter wraps one vendor HTTP API behind the capability traits.
//! `build_gateway` walks the configured adapter table and registers every
//! adapter under the capabilities its kind supports; adapters without the
//! credentials they need are skipped with a warning so the chain simply
//! falls through to the next provider.

pub mod assemblyai;
pub mod google;
pub mod openai;
pub mod stability;

use crate::gateway::{ProviderGateway, RetryPolicy};
use crate::mock::{MockImageGenerator, MockTextGenerator, MockTranscriber};
use clipforge_common::config::{ProviderSettings, ProvidersConfig};
use clipforge_common::storage::StorageService;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use assemblyai::AssemblyAiProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use stability::StabilityProvider;

fn policy_for(settings: &ProviderSettings) -> RetryPolicy {
    RetryPolicy {
        timeout: settings.timeout(),
        max_attempts: settings.max_attempts,
        backoff_base: Duration::from_millis(100),
    }
}

/// Build the gateway from configuration.
///
/// Transcription adapters read media bytes through the storage service
/// before shipping them to the vendor.
pub fn build_gateway(config: &ProvidersConfig, storage: Arc<dyn StorageService>) -> ProviderGateway {
    let mut builder = ProviderGateway::builder(config.chains.clone());

    for (name, settings) in &config.adapters {
        let policy = policy_for(settings);

        match settings.kind.as_str() {
            "openai" => {
                let Some(key) = settings.api_key.clone() else {
                    warn!(provider = %name, "no API key configured, skipping");
                    continue;
                };
                let adapter = Arc::new(OpenAiProvider::new(
                    name,
                    key,
                    settings.base_url.clone(),
                    settings.model.clone(),
                    Arc::clone(&storage),
                ));
                builder = builder
                    .transcriber(adapter.clone(), policy)
                    .text_generator(adapter.clone(), policy)
                    .image_generator(adapter, policy);
            }
            "google" => {
                let Some(key) = settings.api_key.clone() else {
                    warn!(provider = %name, "no API key configured, skipping");
                    continue;
                };
                let adapter = Arc::new(GoogleProvider::new(
                    name,
                    key,
                    settings.base_url.clone(),
                    settings.model.clone(),
                    Arc::clone(&storage),
                ));
                builder = builder
                    .transcriber(adapter.clone(), policy)
                    .text_generator(adapter.clone(), policy)
                    .image_generator(adapter, policy);
            }
            "assemblyai" => {
                let Some(key) = settings.api_key.clone() else {
                    warn!(provider = %name, "no API key configured, skipping");
                    continue;
                };
                let adapter = Arc::new(AssemblyAiProvider::new(
                    name,
                    key,
                    settings.base_url.clone(),
                    Arc::clone(&storage),
                ));
                builder = builder.transcriber(adapter, policy);
            }
            "stability" => {
                let Some(key) = settings.api_key.clone() else {
                    warn!(provider = %name, "no API key configured, skipping");
                    continue;
                };
                let adapter = Arc::new(StabilityProvider::new(
                    name,
                    key,
                    settings.base_url.clone(),
                ));
                builder = builder.image_generator(adapter, policy);
            }
            "mock" => {
                builder = builder
                    .transcriber(
                        Arc::new(MockTranscriber::succeeding(name, "mock transcript")),
                        policy,
                    )
                    .text_generator(
                        Arc::new(MockTextGenerator::succeeding(name, "mock response")),
                        policy,
                    )
                    .image_generator(Arc::new(MockImageGenerator::succeeding(name)), policy);
            }
            other => {
                warn!(provider = %name, kind = other, "unknown adapter kind, skipping");
            }
        }
    }

    let gateway = builder.build();
    info!(
        transcribers = ?gateway.transcriber_names(),
        "provider gateway ready"
    );
    gateway
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_common::storage::InMemoryStorage;
    use std::collections::HashMap;

    fn mock_settings() -> ProviderSettings {
        ProviderSettings {
            kind: "mock".into(),
            api_key: None,
            base_url: None,
            model: None,
            timeout_secs: 5,
            max_attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_build_registers_mock_under_all_capabilities() {
        let mut adapters = HashMap::new();
        adapters.insert("openai".to_string(), mock_settings());

        let config = ProvidersConfig {
            adapters,
            chains: Default::default(),
        };
        let gateway = build_gateway(&config, Arc::new(InMemoryStorage::new()));
        assert_eq!(gateway.transcriber_names(), vec!["openai"]);
    }

    #[tokio::test]
    async fn test_keyless_vendor_adapter_is_skipped() {
        let mut adapters = HashMap::new();
        adapters.insert(
            "openai".to_string(),
            ProviderSettings {
                kind: "openai".into(),
                api_key: None,
                base_url: None,
                model: None,
                timeout_secs: 5,
                max_attempts: 1,
            },
        );

        let config = ProvidersConfig {
            adapters,
            chains: Default::default(),
        };
        let gateway = build_gateway(&config, Arc::new(InMemoryStorage::new()));
        assert!(gateway.transcriber_names().is_empty());
    }
}
