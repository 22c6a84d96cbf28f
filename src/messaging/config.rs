//! Messaging configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Messaging backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagingBackend {
    /// NATS JetStream - durable streams with explicit acknowledgement
    Nats,
    /// Process-local topic exchange, used for tests and single-node development
    InMemory,
}

/// JetStream storage for exchange streams
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamStorage {
    /// Persisted to disk; required for persistent delivery
    File,
    /// Held in server memory
    Memory,
}

/// NATS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,

    /// Connection name
    pub connection_name: String,

    /// Ping interval in seconds
    pub ping_interval_secs: u64,

    /// Stream storage backing each exchange
    pub storage: StreamStorage,

    /// Oldest message a stream keeps in seconds; 0 keeps messages until consumed
    pub max_age_secs: u64,

    /// Message cap per stream; -1 for no cap
    pub max_messages: i64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            connection_name: "gamemaster-pipeline".to_string(),
            ping_interval_secs: 60,
            storage: StreamStorage::File,
            max_age_secs: 7 * 24 * 60 * 60,
            max_messages: 1_000_000,
        }
    }
}

/// Local retry policy for handler failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum handler attempts per delivery
    pub max_attempts: u32,

    /// Base delay in milliseconds; attempt k waits base * 2^k
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

/// Main messaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Backend to use
    pub backend: MessagingBackend,

    /// NATS configuration
    pub nats: NatsConfig,

    /// Handler retry policy
    pub retry: RetryConfig,

    /// Maximum unacknowledged deliveries per worker
    pub prefetch: u16,

    /// Concurrent publishes allowed during a bulk backfill
    pub backfill_concurrency: usize,

    /// Enable metrics
    pub enable_metrics: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            backend: MessagingBackend::Nats,
            nats: NatsConfig::default(),
            retry: RetryConfig::default(),
            prefetch: 1,
            backfill_concurrency: 16,
            enable_metrics: true,
        }
    }
}

impl NatsConfig {
    /// Ping interval as a duration
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Stream age limit as a duration; zero means unlimited
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl RetryConfig {
    /// Base backoff delay as a duration
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}
