//! HTTP edge to the dialogue backend
//!
//! This crate owns every outbound request the assistant makes:
//! - Session initiation (`/session/start`)
//! - Message exchange (`/session/message`)
//! - Feedback analysis and rewrite (`/feedback`, `/feedback/rewrite`)
//!
//! The wire format is fixed by the backend; DTOs here mirror it field for
//! field. Callers depend on the [`DialogueBackend`] trait so tests can swap
//! in scripted backends.

pub mod client;
pub mod feedback;

pub use client::{AssistantReply, BackendClient, SessionStarted};
pub use feedback::{FeedbackAnalysis, FeedbackClient, Sentiment};

use async_trait::async_trait;
use call_assistant_core::{BackendError, EnquiryParams};

/// Dialogue backend abstraction
///
/// One implementation speaks HTTP ([`BackendClient`]); tests script their own.
#[async_trait]
pub trait DialogueBackend: Send + Sync {
    /// Open a new dialogue session
    async fn start_session(&self, params: &EnquiryParams) -> Result<SessionStarted, BackendError>;

    /// Send a finalized user utterance and receive the assistant's reply
    async fn send_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<AssistantReply, BackendError>;
}
