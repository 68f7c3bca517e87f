//! Speech output driver
//!
//! At most one utterance is audible at a time: a new speak request cancels
//! the in-flight one before starting. Synthesis failures are non-fatal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use call_assistant_config::SpeechConfig;
use call_assistant_core::SpeechError;

/// Events emitted while an utterance plays out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutputEvent {
    /// Audio started
    Started,
    /// Utterance finished naturally
    Finished,
    /// Utterance was cancelled by a newer speak request or end of call
    Cancelled,
    /// Synthesis failed
    Failed(String),
}

/// Synthesis backend trait
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Render the text as audio, returning once playback is over
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;

    /// Interrupt the current utterance, if any
    fn stop(&self) {}
}

/// Speech output driver
///
/// Owns the exclusive synthesizer resource. Utterances are numbered; an
/// utterance that has been superseded reports `Cancelled` instead of
/// `Finished` so a stale end-of-speech can never trigger listening.
pub struct SpeechOutput {
    backend: Arc<dyn SynthesisBackend>,
    generation: Arc<Mutex<u64>>,
    speaking: Arc<Mutex<bool>>,
}

impl SpeechOutput {
    /// Create a driver over the given backend
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Self {
        Self {
            backend,
            generation: Arc::new(Mutex::new(0)),
            speaking: Arc::new(Mutex::new(false)),
        }
    }

    /// Create a driver with the paced stand-in backend (for tests and demos)
    pub fn simple(config: SpeechConfig) -> Self {
        Self::new(Arc::new(PacedSynthesis::new(config)))
    }

    /// Speak `text`, cancelling any in-flight utterance first
    ///
    /// Events for this utterance arrive on `tx`: `Started`, then exactly one
    /// of `Finished`, `Cancelled`, or `Failed`.
    pub fn speak(&self, text: &str, tx: mpsc::Sender<SpeechOutputEvent>) {
        let my_generation = {
            let mut generation = self.generation.lock();
            *generation += 1;
            *generation
        };

        // Interrupt whatever was playing
        self.backend.stop();
        *self.speaking.lock() = true;

        let backend = Arc::clone(&self.backend);
        let generation = Arc::clone(&self.generation);
        let speaking = Arc::clone(&self.speaking);
        let text = text.to_string();

        tokio::spawn(async move {
            let _ = tx.send(SpeechOutputEvent::Started).await;

            let result = backend.speak(&text).await;

            if *generation.lock() != my_generation {
                // A newer utterance owns the synthesizer now
                let _ = tx.send(SpeechOutputEvent::Cancelled).await;
                return;
            }

            *speaking.lock() = false;

            match result {
                Ok(()) => {
                    let _ = tx.send(SpeechOutputEvent::Finished).await;
                }
                Err(e) => {
                    tracing::warn!("Speech synthesis failed: {}", e);
                    let _ = tx.send(SpeechOutputEvent::Failed(e.to_string())).await;
                }
            }
        });
    }

    /// Cancel the in-flight utterance, if any
    pub fn cancel(&self) {
        *self.generation.lock() += 1;
        *self.speaking.lock() = false;
        self.backend.stop();
    }

    /// Is an utterance currently audible?
    pub fn is_speaking(&self) -> bool {
        *self.speaking.lock()
    }
}

/// Paced stand-in for a platform synthesizer
///
/// Holds the line for roughly as long as a voice would take to read the
/// text, scaled by the configured speaking rate. Produces no audio.
pub struct PacedSynthesis {
    config: SpeechConfig,
    stop: Notify,
}

/// Nominal per-word reading time at rate 1.0
const BASE_WORD_MS: u64 = 300;

impl PacedSynthesis {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config,
            stop: Notify::new(),
        }
    }

    fn duration_for(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1) as u64;
        let ms = (words * BASE_WORD_MS) as f32 / self.config.rate.max(0.1);
        Duration::from_millis(ms as u64)
    }
}

#[async_trait]
impl SynthesisBackend for PacedSynthesis {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        tokio::select! {
            _ = tokio::time::sleep(self.duration_for(text)) => Ok(()),
            _ = self.stop.notified() => Ok(()),
        }
    }

    fn stop(&self) {
        self.stop.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    struct FailingSynthesis;

    #[async_trait]
    impl SynthesisBackend for FailingSynthesis {
        async fn speak(&self, _text: &str) -> Result<(), SpeechError> {
            Err(SpeechError::Synthesis("voice unavailable".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_emits_started_then_finished() {
        let output = SpeechOutput::simple(SpeechConfig::default());
        let (tx, mut rx) = mpsc::channel(8);

        output.speak("Hello there", tx);

        assert_eq!(rx.recv().await, Some(SpeechOutputEvent::Started));
        assert_eq!(rx.recv().await, Some(SpeechOutputEvent::Finished));
        assert!(!output.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_speak_cancels_in_flight() {
        let output = SpeechOutput::simple(SpeechConfig::default());

        let (tx1, mut rx1) = mpsc::channel(8);
        output.speak("first utterance with several words", tx1);
        assert_eq!(rx1.recv().await, Some(SpeechOutputEvent::Started));

        let (tx2, mut rx2) = mpsc::channel(8);
        output.speak("second", tx2);

        assert_eq!(rx1.recv().await, Some(SpeechOutputEvent::Cancelled));
        assert_eq!(rx2.recv().await, Some(SpeechOutputEvent::Started));
        assert_eq!(rx2.recv().await, Some(SpeechOutputEvent::Finished));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_finished() {
        let output = SpeechOutput::simple(SpeechConfig::default());
        let (tx, mut rx) = mpsc::channel(8);

        output.speak("a rather long goodbye message", tx);
        assert_eq!(rx.recv().await, Some(SpeechOutputEvent::Started));

        output.cancel();
        assert!(!output.is_speaking());

        let event = timeout(Duration::from_secs(10), rx.recv()).await.unwrap();
        assert_eq!(event, Some(SpeechOutputEvent::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_not_fatal() {
        let output = SpeechOutput::new(Arc::new(FailingSynthesis));
        let (tx, mut rx) = mpsc::channel(8);

        output.speak("anything", tx);

        assert_eq!(rx.recv().await, Some(SpeechOutputEvent::Started));
        assert!(matches!(rx.recv().await, Some(SpeechOutputEvent::Failed(_))));
        assert!(!output.is_speaking());
    }
}
