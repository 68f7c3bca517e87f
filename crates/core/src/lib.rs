//! Core types for the call assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Conversation turns and the append-only log
//! - Transcript types
//! - Enquiry parameters and the completion artifact
//! - Error types

pub mod conversation;
pub mod enquiry;
pub mod error;
pub mod transcript;

pub use conversation::{ConversationLog, Turn, TurnRole};
pub use enquiry::{CompletionArtifact, EnquiryParams};
pub use error::{BackendError, CallError, Error, Result, SpeechError};
pub use transcript::TranscriptResult;
