//! Configuration management for ClipForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Pipeline stage configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Submission validation limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Provider adapters and fallback chains
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Artifact storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Number of concurrent pipeline workers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Bounded submission queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for in-flight jobs on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Stage retry budget per job
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Progress weight per stage, normalized over the requested set
    #[serde(default)]
    pub weights: StageWeightsConfig,

    /// Number of titles to request per job
    #[serde(default = "default_title_count")]
    pub title_count: usize,

    /// Number of tags to request per job
    #[serde(default = "default_tag_count")]
    pub tag_count: usize,

    /// Number of thumbnail candidates to keep
    #[serde(default = "default_thumbnail_count")]
    pub thumbnail_count: usize,

    /// Frames sampled from the media for thumbnail scoring
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,

    /// Maximum chapters detected per job
    #[serde(default = "default_max_chapters")]
    pub max_chapters: usize,
}

/// Relative progress weights; unrequested stages consume no share
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct StageWeightsConfig {
    #[serde(default = "default_weight_transcription")]
    pub transcription: u32,
    #[serde(default = "default_weight_titles")]
    pub titles: u32,
    #[serde(default = "default_weight_thumbnails")]
    pub thumbnails: u32,
    #[serde(default = "default_weight_chapters")]
    pub chapters: u32,
    #[serde(default = "default_weight_export")]
    pub export: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum upload size in megabytes
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Maximum declared media duration in seconds
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,

    /// Accepted container/audio formats by extension
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Named adapter settings, keyed by provider name
    #[serde(default)]
    pub adapters: HashMap<String, ProviderSettings>,

    /// Ordered fallback chains per capability
    #[serde(default)]
    pub chains: ChainsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// Adapter kind: openai, google, stability, assemblyai, mock
    pub kind: String,

    pub api_key: Option<String>,

    /// Base URL override (for custom endpoints)
    pub base_url: Option<String>,

    pub model: Option<String>,

    /// Per-call timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Same-provider attempt cap for retryable failures
    #[serde(default = "default_provider_attempts")]
    pub max_attempts: u32,
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ordered provider lists per capability, with per-language overrides
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainsConfig {
    #[serde(default = "default_transcription_chain")]
    pub transcription: ChainConfig,
    #[serde(default = "default_text_chain")]
    pub text: ChainConfig,
    #[serde(default = "default_image_chain")]
    pub image: ChainConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Priority order used when no language rule matches
    pub default: Vec<String>,

    /// Language code -> priority order
    #[serde(default)]
    pub by_language: HashMap<String, Vec<String>>,
}

impl ChainConfig {
    /// Resolve the ordered provider names for a language hint
    pub fn order_for(&self, language: Option<&str>) -> &[String] {
        language
            .and_then(|lang| self.by_language.get(lang))
            .map(|v| v.as_slice())
            .unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for stored artifacts
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_pool_size() -> usize { 4 }
fn default_queue_capacity() -> usize { 64 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_title_count() -> usize { 5 }
fn default_tag_count() -> usize { 10 }
fn default_thumbnail_count() -> usize { 3 }
fn default_frame_samples() -> usize { 8 }
fn default_max_chapters() -> usize { 10 }
fn default_weight_transcription() -> u32 { 40 }
fn default_weight_titles() -> u32 { 20 }
fn default_weight_thumbnails() -> u32 { 20 }
fn default_weight_chapters() -> u32 { 10 }
fn default_weight_export() -> u32 { 10 }
fn default_max_file_size_mb() -> u64 { 500 }
fn default_max_duration_secs() -> f64 { 7200.0 }
fn default_allowed_formats() -> Vec<String> {
    ["mp4", "mov", "avi", "mkv", "webm", "mp3", "wav", "m4a", "flac"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_provider_timeout() -> u64 { 30 }
fn default_provider_attempts() -> u32 { 2 }
fn default_storage_root() -> String { "data/artifacts".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "clipforge".to_string() }

fn default_transcription_chain() -> ChainConfig {
    // English transcribes best through AssemblyAI; CJK through Google
    let mut by_language = HashMap::new();
    by_language.insert(
        "en".to_string(),
        vec!["assemblyai".into(), "openai".into(), "google".into()],
    );
    for lang in ["zh", "ja", "ko"] {
        by_language.insert(lang.to_string(), vec!["google".into(), "openai".into()]);
    }
    ChainConfig {
        default: vec!["openai".into(), "google".into()],
        by_language,
    }
}

fn default_text_chain() -> ChainConfig {
    ChainConfig {
        default: vec!["google".into(), "openai".into()],
        by_language: HashMap::new(),
    }
}

fn default_image_chain() -> ChainConfig {
    ChainConfig {
        default: vec!["stability".into(), "openai".into(), "google".into()],
        by_language: HashMap::new(),
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            weights: StageWeightsConfig::default(),
            title_count: default_title_count(),
            tag_count: default_tag_count(),
            thumbnail_count: default_thumbnail_count(),
            frame_samples: default_frame_samples(),
            max_chapters: default_max_chapters(),
        }
    }
}

impl Default for StageWeightsConfig {
    fn default() -> Self {
        Self {
            transcription: default_weight_transcription(),
            titles: default_weight_titles(),
            thumbnails: default_weight_thumbnails(),
            chapters: default_weight_chapters(),
            export: default_weight_export(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            max_duration_secs: default_max_duration_secs(),
            allowed_formats: default_allowed_formats(),
        }
    }
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            transcription: default_transcription_chain(),
            text: default_text_chain(),
            image: default_image_chain(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            pipeline: PipelineConfig::default(),
            limits: LimitsConfig::default(),
            providers: ProvidersConfig::default(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__WORKER__POOL_SIZE=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Maximum upload size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.limits.max_file_size_mb * 1024 * 1024
    }

    /// Shutdown grace period as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.shutdown_timeout_secs)
    }
}
