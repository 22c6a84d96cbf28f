//! Short-lived correlation of out-of-band results
//!
//! A worker that computes a result before the owning row exists stores it
//! under a caller-issued token; the stage that persists the row claims it
//! once. Unclaimed entries expire after the TTL.

mod cache;

pub use cache::{CorrelationCache, CorrelationConfig, CorrelationEntry, SentimentResult};
