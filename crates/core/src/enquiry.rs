//! Enquiry parameters and the completion artifact

use serde::{Deserialize, Serialize};

/// The three enquiry fields captured before a session starts
///
/// Immutable for the session's lifetime. Serializes to the exact
/// `/session/start` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnquiryParams {
    /// Subject store
    pub store: String,

    /// Product or service
    pub product: String,

    /// Free-text details
    pub details: String,
}

impl EnquiryParams {
    pub fn new(
        store: impl Into<String>,
        product: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            store: store.into(),
            product: product.into(),
            details: details.into(),
        }
    }

    /// All three fields filled in
    pub fn is_complete(&self) -> bool {
        !self.store.trim().is_empty()
            && !self.product.trim().is_empty()
            && !self.details.trim().is_empty()
    }
}

/// Outcome of a completed conversation
///
/// Set at most once per session, never cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionArtifact {
    /// Backend reported the conversation as completed
    pub completed: bool,

    /// Invoice document URL, when the backend produced one
    pub invoice_url: Option<String>,
}
