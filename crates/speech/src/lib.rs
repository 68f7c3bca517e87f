//! Speech drivers for the call assistant
//!
//! Two drivers sit between the call state machine and the platform's audio
//! subsystem:
//! - [`output::SpeechOutput`] renders assistant text as speech, one utterance
//!   at a time, with explicit cancellation
//! - [`input::SpeechInput`] captures one listening turn, finalizing on an
//!   explicit end-of-speech signal or a trailing-silence window
//!
//! Both sit behind backend traits; the platform synthesizer and recognizer
//! are supplied by the embedding application.

pub mod input;
pub mod output;

pub use input::{
    CaptureBackend, CaptureEvent, ListeningOutcome, ScriptedCapture, SpeechInput,
};
pub use output::{PacedSynthesis, SpeechOutput, SpeechOutputEvent, SynthesisBackend};
