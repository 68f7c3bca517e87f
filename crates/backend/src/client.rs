//! Dialogue session client

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use call_assistant_config::BackendConfig;
use call_assistant_core::{BackendError, EnquiryParams};

use crate::DialogueBackend;

/// Response to `/session/start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStarted {
    /// Opaque identifier assigned by the backend, immutable thereafter
    pub session_id: String,

    /// Initial assistant utterance
    pub assistant_message: String,
}

/// Response to `/session/message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    /// Next assistant utterance
    pub assistant_message: String,

    /// Backend considers the conversation complete
    #[serde(default)]
    pub completed: bool,

    /// Invoice document URL, present once the booking is confirmed
    #[serde(default)]
    pub invoice_url: Option<String>,
}

/// Request body for `/session/message`
#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

/// HTTP client for the dialogue backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
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

    /// Backend base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl DialogueBackend for BackendClient {
    async fn start_session(&self, params: &EnquiryParams) -> Result<SessionStarted, BackendError> {
        tracing::info!(store = %params.store, product = %params.product, "Opening dialogue session");

        let started: SessionStarted = self.post_json("/session/start", params).await?;

        tracing::info!(session_id = %started.session_id, "Session opened");
        Ok(started)
    }

    async fn send_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<AssistantReply, BackendError> {
        // Caller errors, checked before anything goes on the wire
        if session_id.is_empty() {
            return Err(BackendError::NoSession);
        }
        if message.trim().is_empty() {
            return Err(BackendError::BlankMessage);
        }

        tracing::debug!(session_id, "Sending user utterance");

        let request = MessageRequest {
            session_id,
            message,
        };
        self.post_json("/session/message", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_request_wire_body() {
        let request = MessageRequest {
            session_id: "abc",
            message: "yes available",
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"session_id":"abc","message":"yes available"}"#);
    }

    #[test]
    fn test_reply_defaults() {
        let reply: AssistantReply =
            serde_json::from_str(r#"{"assistant_message":"Hello"}"#).unwrap();
        assert!(!reply.completed);
        assert!(reply.invoice_url.is_none());
    }

    #[test]
    fn test_reply_with_invoice() {
        let reply: AssistantReply = serde_json::from_str(
            r#"{"assistant_message":"Done","completed":true,"invoice_url":"https://x/inv.pdf"}"#,
        )
        .unwrap();
        assert!(reply.completed);
        assert_eq!(reply.invoice_url.as_deref(), Some("https://x/inv.pdf"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
