//! Speech input driver
//!
//! Runs one listening turn at a time over a restartable stream of capture
//! events. Finalization policy, in order:
//! - an explicit final result finalizes immediately
//! - otherwise each interim result resets a trailing-silence window; when it
//!   elapses, the latest interim text is finalized
//! - a manual finalize request short-circuits the window
//!
//! Finalization is one-shot: capture stops and later events for the turn are
//! discarded.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use call_assistant_core::{SpeechError, TranscriptResult};

/// Events produced by a capture backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Partial transcript; replaces the previous interim text
    Interim(String),
    /// The recognizer decided the utterance is complete
    Final(String),
    /// Capture ended without detecting speech
    NoSpeech,
    /// Microphone access was denied
    PermissionDenied,
    /// Capture ended for another reason (device released, stream closed)
    Ended,
}

/// Capture backend trait
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Begin capturing, emitting events on `events` until stopped
    async fn start(&self, events: mpsc::Sender<CaptureEvent>) -> Result<(), SpeechError>;

    /// Stop the active capture, if any
    fn stop(&self) {}
}

/// How a listening turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListeningOutcome {
    /// A transcript was finalized and is ready to send
    Finalized(String),
    /// No usable speech; the caller may restart capture
    NoSpeech,
    /// Microphone permission denied; fatal for this turn, no silent retry
    PermissionDenied,
    /// The turn was stopped from outside (end of call or a newer capture)
    Cancelled,
}

/// Speech input driver
///
/// Owns the exclusive microphone resource. At most one capture is active;
/// starting a new turn stops the previous one first.
pub struct SpeechInput {
    backend: Arc<dyn CaptureBackend>,
    silence_timeout: Duration,
    turn_lock: tokio::sync::Mutex<()>,
    finalize_requested: Notify,
    cancel_requested: Notify,
}

impl SpeechInput {
    /// Create a driver over the given backend
    pub fn new(backend: Arc<dyn CaptureBackend>, silence_timeout: Duration) -> Self {
        Self {
            backend,
            silence_timeout,
            turn_lock: tokio::sync::Mutex::new(()),
            finalize_requested: Notify::new(),
            cancel_requested: Notify::new(),
        }
    }

    /// Request immediate finalization of the pending interim text
    ///
    /// No-op when nothing is pending or no capture is active.
    pub fn finalize_now(&self) {
        self.finalize_requested.notify_waiters();
    }

    /// Stop the active capture, if any; its turn reports `Cancelled`
    pub fn stop(&self) {
        self.cancel_requested.notify_waiters();
        self.backend.stop();
    }

    /// Run one listening turn
    ///
    /// Interim updates are forwarded on `partials` for display. Returns when
    /// the turn finalizes, fails, or is stopped.
    pub async fn capture_turn(
        &self,
        partials: mpsc::Sender<TranscriptResult>,
    ) -> Result<ListeningOutcome, SpeechError> {
        // Single active capture: take over from a previous turn if one is live
        let _guard = match self.turn_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.stop();
                self.turn_lock.lock().await
            }
        };

        let (tx, mut rx) = mpsc::channel::<CaptureEvent>(32);
        self.backend.start(tx).await?;

        let silence = tokio::time::sleep(self.silence_timeout);
        tokio::pin!(silence);
        let mut armed = false;

        let manual = self.finalize_requested.notified();
        tokio::pin!(manual);
        let mut manual_spent = false;

        let cancel = self.cancel_requested.notified();
        tokio::pin!(cancel);

        let mut last_interim = String::new();

        let outcome = loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(CaptureEvent::Final(text)) => {
                        break ListeningOutcome::Finalized(text);
                    }
                    Some(CaptureEvent::Interim(text)) => {
                        last_interim = text.clone();
                        let _ = partials.send(TranscriptResult::partial(text)).await;
                        // Every interim update restarts the silence window
                        silence
                            .as_mut()
                            .reset(tokio::time::Instant::now() + self.silence_timeout);
                        armed = true;
                    }
                    Some(CaptureEvent::NoSpeech) => {
                        break ListeningOutcome::NoSpeech;
                    }
                    Some(CaptureEvent::PermissionDenied) => {
                        break ListeningOutcome::PermissionDenied;
                    }
                    Some(CaptureEvent::Ended) | None => {
                        break if last_interim.trim().is_empty() {
                            ListeningOutcome::NoSpeech
                        } else {
                            ListeningOutcome::Finalized(last_interim)
                        };
                    }
                },

                _ = &mut silence, if armed => {
                    break if last_interim.trim().is_empty() {
                        ListeningOutcome::NoSpeech
                    } else {
                        ListeningOutcome::Finalized(last_interim)
                    };
                }

                _ = &mut manual, if !manual_spent => {
                    manual_spent = true;
                    if !last_interim.trim().is_empty() {
                        break ListeningOutcome::Finalized(last_interim);
                    }
                }

                _ = &mut cancel => {
                    break ListeningOutcome::Cancelled;
                }
            }
        };

        // One-shot finalization: stop capture; any further events for this
        // turn land in a dropped channel
        self.backend.stop();

        if let ListeningOutcome::Finalized(text) = &outcome {
            tracing::debug!(text = %text, "Listening turn finalized");
        }

        Ok(outcome)
    }
}

/// Scripted capture backend for tests and demos
///
/// Replays one fixed event sequence per capture, each event after its delay.
/// The event channel stays open after the script runs out so the silence
/// window, not channel teardown, decides finalization.
pub struct ScriptedCapture {
    turns: Mutex<VecDeque<Vec<(u64, CaptureEvent)>>>,
}

impl ScriptedCapture {
    /// One inner `Vec` per expected capture: `(delay_ms, event)` pairs
    pub fn new(turns: Vec<Vec<(u64, CaptureEvent)>>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
        }
    }
}

#[async_trait]
impl CaptureBackend for ScriptedCapture {
    async fn start(&self, events: mpsc::Sender<CaptureEvent>) -> Result<(), SpeechError> {
        let turn = self.turns.lock().pop_front().unwrap_or_default();

        tokio::spawn(async move {
            for (delay_ms, event) in turn {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if events.send(event).await.is_err() {
                    return;
                }
            }
            // Keep the channel open until the consumer is done with the turn
            events.closed().await;
        });

        Ok(())
    }
}
