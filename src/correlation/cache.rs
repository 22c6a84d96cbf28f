use crate::pipeline::PIPELINE_METRICS;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Sentiment computed from raw message text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    /// -1 negative, 0 neutral, 1 positive
    pub sentiment: i8,
    pub confidence: f32,
}

/// Cached result plus its creation time
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationEntry {
    pub result: SentimentResult,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Seconds an unclaimed entry stays visible
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_capacity() -> u64 {
    10_000
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_capacity: default_max_capacity(),
        }
    }
}

/// Token-keyed, time-boxed result cache; safe to share across workers
#[derive(Clone)]
pub struct CorrelationCache {
    cache: Cache<String, CorrelationEntry>,
}

impl CorrelationCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CorrelationConfig) -> Self {
        Self::new(config.max_capacity, Duration::from_secs(config.ttl_secs))
    }

    /// Fresh unguessable token
    pub fn new_token() -> String {
        Uuid::new_v4().to_string()
    }

    pub async fn store(&self, token: &str, sentiment: i8, confidence: f32) {
        let entry = CorrelationEntry {
            result: SentimentResult {
                sentiment,
                confidence,
            },
            created_at: Utc::now(),
        };
        self.cache.insert(token.to_string(), entry).await;
        debug!(token = %token, sentiment, confidence, "Stored correlation entry");
    }

    /// Lookup; unknown and expired tokens are not-found
    pub async fn try_get(&self, token: &str) -> Option<SentimentResult> {
        self.cache.get(token).await.map(|entry| entry.result)
    }

    pub async fn remove(&self, token: &str) {
        self.cache.invalidate(token).await;
    }

    /// Lookup and remove in one step; the entry is gone either way
    pub async fn take(&self, token: &str) -> Option<SentimentResult> {
        // `remove` hands back expired entries; `get` honours the TTL
        let found = self.cache.get(token).await.map(|entry| entry.result);
        self.cache.invalidate(token).await;
        let outcome = if found.is_some() { "hit" } else { "miss" };
        PIPELINE_METRICS
            .correlation_lookups
            .with_label_values(&[outcome])
            .inc();
        found
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_get_remove() {
        let cache = CorrelationCache::new(100, Duration::from_secs(60));
        let token = CorrelationCache::new_token();

        cache.store(&token, 1, 0.9).await;
        let found = cache.try_get(&token).await.unwrap();
        assert_eq!(found.sentiment, 1);
        assert!((found.confidence - 0.9).abs() < f32::EPSILON);

        cache.remove(&token).await;
        assert!(cache.try_get(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_take_claims_once() {
        let cache = CorrelationCache::new(100, Duration::from_secs(60));
        cache.store("tok", -1, 0.6).await;

        assert_eq!(cache.take("tok").await.map(|r| r.sentiment), Some(-1));
        assert!(cache.take("tok").await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = CorrelationCache::new(100, Duration::from_millis(100));
        cache.store("tok", 0, 0.5).await;
        assert!(cache.try_get("tok").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.try_get("tok").await.is_none());
    }

    #[tokio::test]
    async fn test_take_after_expiry_is_a_miss() {
        let cache = CorrelationCache::new(100, Duration::from_millis(100));
        cache.store("tok", 1, 0.9).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.take("tok").await.is_none());
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(CorrelationCache::new_token(), CorrelationCache::new_token());
    }
}
