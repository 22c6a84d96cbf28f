//! Sentiment classifiers and metric evaluators

use crate::conversation::collaborators::{MetricEvaluator, SentimentClassifier};
use crate::correlation::SentimentResult;
use crate::messages::ConversationMessageCreated;
use crate::pipeline::{PipelineError, PipelineResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SentimentRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateRequest<'a> {
    metric: &'a str,
    message_id: &'a str,
    game_id: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    score: f64,
}

/// Client for the external analysis service
#[derive(Clone)]
pub struct AnalysisClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl AnalysisClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::Classification(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("request timed out after {} seconds", self.timeout_secs)
                } else if e.is_connect() {
                    format!("failed to connect to analysis service: {}", e)
                } else {
                    format!("request failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("analysis service returned {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("invalid response: {}", e))
    }

    /// Evaluator for one metric backed by this client
    pub fn evaluator(&self, metric: impl Into<String>) -> AnalysisEvaluator {
        AnalysisEvaluator {
            client: self.clone(),
            metric: metric.into(),
        }
    }
}

#[async_trait]
impl SentimentClassifier for AnalysisClient {
    async fn classify(&self, text: &str) -> PipelineResult<SentimentResult> {
        let result: SentimentResult = self
            .post("/sentiment", &SentimentRequest { text })
            .await
            .map_err(PipelineError::Classification)?;

        Ok(SentimentResult {
            sentiment: result.sentiment.clamp(-1, 1),
            confidence: result.confidence.clamp(0.0, 1.0),
        })
    }
}

/// Scores one metric through the analysis service
pub struct AnalysisEvaluator {
    client: AnalysisClient,
    metric: String,
}

#[async_trait]
impl MetricEvaluator for AnalysisEvaluator {
    fn metric(&self) -> &str {
        &self.metric
    }

    async fn evaluate(&self, message: &ConversationMessageCreated) -> PipelineResult<f64> {
        let response: EvaluateResponse = self
            .client
            .post(
                "/evaluate",
                &EvaluateRequest {
                    metric: &self.metric,
                    message_id: &message.message_id,
                    game_id: &message.game_id,
                    content: &message.content,
                },
            )
            .await
            .map_err(|e| PipelineError::Evaluation(format!("{}: {}", self.metric, e)))?;

        Ok(response.score)
    }
}

const POSITIVE: &[&str] = &[
    "great", "good", "love", "awesome", "thanks", "nice", "fun", "excellent", "yes", "cool",
];
const NEGATIVE: &[&str] = &[
    "bad", "hate", "boring", "wrong", "terrible", "awful", "no", "stupid", "annoying", "worse",
];

/// Word-list classifier for local runs
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconSentimentClassifier;

#[async_trait]
impl SentimentClassifier for LexiconSentimentClassifier {
    async fn classify(&self, text: &str) -> PipelineResult<SentimentResult> {
        let (mut positive, mut negative) = (0usize, 0usize);
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if POSITIVE.contains(&word.as_str()) {
                positive += 1;
            } else if NEGATIVE.contains(&word.as_str()) {
                negative += 1;
            }
        }

        let total = positive + negative;
        let sentiment = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
        };
        let confidence = if total == 0 {
            0.5
        } else {
            positive.abs_diff(negative) as f32 / total as f32
        };

        Ok(SentimentResult {
            sentiment,
            confidence,
        })
    }
}
