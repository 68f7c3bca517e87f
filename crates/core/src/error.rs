//! Error types for the call assistant

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the call assistant
#[derive(Error, Debug)]
pub enum Error {
    // Backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // Speech driver errors
    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    // Call state machine errors
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

/// Errors from the dialogue backend HTTP edge
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No session established")]
    NoSession,

    #[error("Message must not be blank")]
    BlankMessage,

    #[error("Invalid backend address: {0}")]
    InvalidAddress(String),
}

/// Speech driver errors
#[derive(Error, Debug, Clone)]
pub enum SpeechError {
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Channel closed")]
    ChannelClosed,
}

/// Call state machine errors
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Call already started")]
    AlreadyStarted,

    #[error("Call has ended")]
    Ended,

    #[error("Conversation already completed")]
    Completed,

    #[error("Cannot {action} while {state}")]
    Busy {
        action: &'static str,
        state: String,
    },
}
