//! Feedback analysis client
//!
//! Sentiment analysis and text improvement live on the same backend as the
//! dialogue session endpoints but serve the post-call feedback flow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use call_assistant_config::BackendConfig;
use call_assistant_core::BackendError;

/// Minimum feedback length the rewrite endpoint accepts
const MIN_REWRITE_LEN: usize = 20;

/// Overall sentiment of a piece of feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Result of analyzing a feedback message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    /// Overall sentiment
    pub sentiment: Sentiment,

    /// Star rating (1-5)
    pub rating: u8,

    /// One-line summary
    pub summary: String,

    /// Key points extracted from the text
    #[serde(default)]
    pub key_points: Vec<String>,

    /// Dominant emotion label
    pub emotion: String,
}

#[derive(Debug, Serialize)]
struct FeedbackRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct RewriteRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct RewriteResponse {
    improved_text: String,
}

/// HTTP client for the feedback endpoints
#[derive(Debug, Clone)]
pub struct FeedbackClient {
    http: reqwest::Client,
    base_url: String,
}

impl FeedbackClient {
    /// Build a client from configuration
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BackendError::InvalidAddress(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Submit feedback text for sentiment analysis
    pub async fn analyze(&self, message: &str) -> Result<FeedbackAnalysis, BackendError> {
        if message.trim().is_empty() {
            return Err(BackendError::BlankMessage);
        }

        let url = format!("{}/feedback", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&FeedbackRequest { message })
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        response
            .json::<FeedbackAnalysis>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    /// Ask the backend to improve the feedback text
    ///
    /// Very short texts are returned unchanged; the rewrite model needs some
    /// material to work with.
    pub async fn rewrite(&self, text: &str) -> Result<String, BackendError> {
        if text.len() < MIN_REWRITE_LEN {
            return Ok(text.to_string());
        }

        let url = format!("{}/feedback/rewrite", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RewriteRequest { text })
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let rewritten = response
            .json::<RewriteResponse>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(rewritten.improved_text)
    }
}
