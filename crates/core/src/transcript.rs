//! Transcript types for speech input

use serde::{Deserialize, Serialize};

/// One transcript update from the speech input driver
///
/// Interim results are replaced in place as the user keeps speaking; a final
/// result ends the listening turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Transcribed text
    pub text: String,

    /// Is this a final result?
    pub is_final: bool,
}

impl TranscriptResult {
    /// Create a partial (non-final) transcript
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// Create a final transcript
    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// Check if transcript is empty
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Get word count
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_result() {
        let result = TranscriptResult::final_result("yes available");
        assert!(result.is_final);
        assert_eq!(result.word_count(), 2);

        let partial = TranscriptResult::partial("  ");
        assert!(!partial.is_final);
        assert!(partial.is_empty());
    }
}
