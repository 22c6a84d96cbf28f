use crate::conversation::AnalysisConfig;
use crate::correlation::CorrelationConfig;
use crate::diagnostics::DiagnosticsConfig;
use crate::error::{AppError, Result};
use crate::ingestion::IngestionConfig;
use crate::messaging::MessagingConfig;
use crate::vector::VectorStoreConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming an override config file
pub const CONFIG_PATH_ENV: &str = "GM_PIPELINE_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Message bus
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Vector store gateway
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Document ingestion
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Correlation cache
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Retrieval diagnostics queue
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Analysis and embedding services
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Status and metrics endpoint
    #[serde(default)]
    pub status: StatusConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/pipeline.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load with an explicit override file
    pub fn load_from(config_path: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: GM_PIPELINE_)
            .add_source(
                config::Environment::with_prefix("GM_PIPELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.messaging.prefetch == 0 {
            return Err(AppError::Configuration(
                "messaging.prefetch must be at least 1".to_string(),
            ));
        }
        if self.messaging.retry.max_attempts == 0 {
            return Err(AppError::Configuration(
                "messaging.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.ingestion.chunk_overlap >= self.ingestion.chunk_size {
            return Err(AppError::Configuration(format!(
                "ingestion.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.ingestion.chunk_overlap, self.ingestion.chunk_size
            )));
        }
        if self.vector_store.dimensions == 0 {
            return Err(AppError::Configuration(
                "vector_store.dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Serve /health, /metrics, /queues and /stages
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_status_port")]
    pub port: u16,

    /// Stage events buffered per live subscriber
    #[serde(default = "default_stage_channel_capacity")]
    pub stage_channel_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_status_port(),
            stage_channel_capacity: default_stage_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_status_port() -> u16 {
    9090
}

fn default_stage_channel_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}
