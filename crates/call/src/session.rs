//! The call session

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use call_assistant_backend::DialogueBackend;
use call_assistant_config::CallConfig;
use call_assistant_core::{
    CallError, CompletionArtifact, ConversationLog, EnquiryParams, Error, TranscriptResult, Turn,
    TurnRole,
};
use call_assistant_speech::{ListeningOutcome, SpeechInput, SpeechOutput, SpeechOutputEvent};

/// Assistant-style bubble appended when a message exchange fails
const EXCHANGE_FAILURE_REPLY: &str =
    "I'm having trouble reaching the service right now. Could you say that again?";

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Waiting for the user to start the call
    Idle,
    /// Session initiation in flight
    Connecting,
    /// Assistant is speaking or awaiting the user
    Active,
    /// Capturing user speech
    Listening,
    /// Message exchange in flight
    Processing,
    /// Conversation complete; drivers are not restarted
    Completed,
    /// Session could not be created; retryable
    Failed,
    /// Call torn down by the user
    Ended,
}

impl CallState {
    pub fn display_name(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Connecting => "connecting",
            CallState::Active => "active",
            CallState::Listening => "listening",
            CallState::Processing => "processing",
            CallState::Completed => "completed",
            CallState::Failed => "failed",
            CallState::Ended => "ended",
        }
    }

    /// No further turns can happen from this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Completed | CallState::Ended)
    }
}

/// Observable call events
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// State transition
    StateChanged { from: CallState, to: CallState },
    /// A turn was appended to the conversation
    TurnAdded { role: TurnRole, content: String },
    /// In-progress transcript updated
    PartialTranscript { text: String },
    /// Assistant speech started
    SpeakingStarted { text: String },
    /// Assistant speech finished
    SpeakingFinished,
    /// Conversation completed
    Completed { invoice_url: Option<String> },
    /// A recoverable error was surfaced to the user
    Error(String),
    /// Call ended
    Ended { reason: String },
}

/// One voice call against the dialogue backend
///
/// Owns all mutable call state: the session id, the conversation log, the
/// in-progress transcript, the completion artifact, and the guards that keep
/// speaking, listening, and message exchange mutually exclusive.
pub struct CallSession {
    params: EnquiryParams,
    config: CallConfig,
    backend: Arc<dyn DialogueBackend>,
    output: Arc<SpeechOutput>,
    input: Arc<SpeechInput>,

    state: Mutex<CallState>,
    session_id: Mutex<Option<String>>,
    log: Mutex<ConversationLog>,
    /// At most one in-progress transcript; cleared on finalization
    transcript: Mutex<String>,
    /// Set at most once, never cleared
    completion: Mutex<Option<CompletionArtifact>>,

    /// A session is requested at most once per call lifetime
    session_requested: AtomicBool,
    /// Exactly one message exchange in flight per session
    exchange_in_flight: AtomicBool,
    /// Bumped on teardown; stale flows check it before applying results
    epoch: AtomicU64,

    event_tx: broadcast::Sender<CallEvent>,
}

impl CallSession {
    /// Create a new call session
    pub fn new(
        params: EnquiryParams,
        config: CallConfig,
        backend: Arc<dyn DialogueBackend>,
        output: Arc<SpeechOutput>,
        input: Arc<SpeechInput>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            params,
            config,
            backend,
            output,
            input,
            state: Mutex::new(CallState::Idle),
            session_id: Mutex::new(None),
            log: Mutex::new(ConversationLog::new()),
            transcript: Mutex::new(String::new()),
            completion: Mutex::new(None),
            session_requested: AtomicBool::new(false),
            exchange_in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            event_tx,
        }
    }

    /// Subscribe to call events
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    /// Current call status
    pub fn state(&self) -> CallState {
        *self.state.lock()
    }

    /// Session identifier, once assigned by the backend
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Snapshot of the conversation, oldest turn first
    pub fn turns(&self) -> Vec<Turn> {
        self.log.lock().turns().to_vec()
    }

    /// In-progress transcript, if the user is mid-utterance
    pub fn current_transcript(&self) -> String {
        self.transcript.lock().clone()
    }

    /// Completion artifact, once the backend reports the conversation done
    pub fn completion(&self) -> Option<CompletionArtifact> {
        self.completion.lock().clone()
    }

    /// The enquiry this call is about
    pub fn params(&self) -> &EnquiryParams {
        &self.params
    }

    /// Start the call: open the session and speak the greeting
    ///
    /// A repeated or concurrent start is suppressed; the backend treats every
    /// initiation as a brand-new session, so at most one may ever be issued.
    /// A failed start resets the guard so the user can retry.
    pub async fn start(self: &Arc<Self>) -> Result<(), Error> {
        if self.session_requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("Session already requested, suppressing duplicate start");
            return Ok(());
        }

        let epoch = self.current_epoch();
        self.set_state(CallState::Connecting);

        match self.backend.start_session(&self.params).await {
            Ok(started) => {
                if !self.epoch_valid(epoch) {
                    return Ok(());
                }

                *self.session_id.lock() = Some(started.session_id);
                self.push_turn(Turn::assistant(started.assistant_message.clone()));
                self.set_state(CallState::Active);

                self.spawn_speak(started.assistant_message, self.config.greeting_delay_ms, epoch);
                Ok(())
            }
            Err(e) => {
                // No half-open session: clear the guard so retry works
                self.session_requested.store(false, Ordering::SeqCst);
                if self.epoch_valid(epoch) {
                    self.set_state(CallState::Failed);
                    self.emit(CallEvent::Error(format!("Failed to connect: {e}")));
                }
                Err(e.into())
            }
        }
    }

    /// Manually hand the turn to the user ("tap to speak")
    pub fn begin_listening(self: &Arc<Self>) -> Result<(), CallError> {
        let state = self.state();
        match state {
            CallState::Active => {}
            CallState::Completed => return Err(CallError::Completed),
            CallState::Ended => return Err(CallError::Ended),
            other => {
                return Err(CallError::Busy {
                    action: "listen",
                    state: other.display_name().to_string(),
                })
            }
        }

        if self.output.is_speaking() {
            return Err(CallError::Busy {
                action: "listen",
                state: "speaking".to_string(),
            });
        }

        self.spawn_listen(self.current_epoch(), 0);
        Ok(())
    }

    /// Force-finalize the pending transcript ("send now")
    pub fn send_now(&self) {
        self.input.finalize_now();
    }

    /// End the call: cancel speech, stop capture, discard in-flight work
    ///
    /// An in-flight network request is not cancelled, but its response is
    /// discarded rather than applied to the torn-down session.
    pub fn end(&self, reason: &str) {
        if self.state() == CallState::Ended {
            return;
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.output.cancel();
        self.input.stop();
        self.set_state(CallState::Ended);
        self.emit(CallEvent::Ended {
            reason: reason.to_string(),
        });

        tracing::info!(reason, "Call ended");
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn epoch_valid(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    fn set_state(&self, to: CallState) {
        let from = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, to)
        };

        if from != to {
            tracing::debug!(from = from.display_name(), to = to.display_name(), "Call state");
            self.emit(CallEvent::StateChanged { from, to });
        }
    }

    fn push_turn(&self, turn: Turn) {
        let (role, content) = (turn.role, turn.content.clone());
        self.log.lock().push(turn);
        self.emit(CallEvent::TurnAdded { role, content });
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Speak assistant text after `delay_ms`, then hand the turn to the user
    fn spawn_speak(self: &Arc<Self>, text: String, delay_ms: u64, epoch: u64) {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            if !this.epoch_valid(epoch) || this.state().is_terminal() {
                return;
            }

            let (tx, mut rx) = mpsc::channel(8);
            this.output.speak(&text, tx);

            while let Some(event) = rx.recv().await {
                match event {
                    SpeechOutputEvent::Started => {
                        this.emit(CallEvent::SpeakingStarted { text: text.clone() });
                    }
                    SpeechOutputEvent::Finished => {
                        this.emit(CallEvent::SpeakingFinished);

                        // Hand the turn to the user unless the conversation
                        // is already over
                        if this.epoch_valid(epoch)
                            && this.state() == CallState::Active
                            && this.completion.lock().is_none()
                        {
                            this.spawn_listen(epoch, this.config.auto_listen_delay_ms);
                        }
                        return;
                    }
                    SpeechOutputEvent::Cancelled => {
                        return;
                    }
                    SpeechOutputEvent::Failed(e) => {
                        // Non-fatal: the user can still tap to speak
                        tracing::warn!("Speech synthesis failed: {}", e);
                        this.emit(CallEvent::Error(format!("Speech output failed: {e}")));
                        return;
                    }
                }
            }
        });
    }

    fn spawn_listen(self: &Arc<Self>, epoch: u64, delay_ms: u64) {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            this.listen_loop(epoch).await;
        });
    }

    /// Capture user speech, restarting after empty turns, until a transcript
    /// finalizes or the call moves on
    async fn listen_loop(self: Arc<Self>, epoch: u64) {
        loop {
            if !self.epoch_valid(epoch) || self.state() != CallState::Active {
                return;
            }
            if self.output.is_speaking() {
                return;
            }

            self.set_state(CallState::Listening);

            let (tx, mut rx) = mpsc::channel::<TranscriptResult>(32);
            let forward = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(update) = rx.recv().await {
                    *forward.transcript.lock() = update.text.clone();
                    forward.emit(CallEvent::PartialTranscript { text: update.text });
                }
            });

            match self.input.capture_turn(tx).await {
                Ok(ListeningOutcome::Finalized(text)) => {
                    self.transcript.lock().clear();
                    self.process_turn(text, epoch).await;
                    return;
                }
                Ok(ListeningOutcome::NoSpeech) => {
                    self.transcript.lock().clear();
                    if !self.epoch_valid(epoch) {
                        return;
                    }
                    self.set_state(CallState::Active);

                    if self.completion.lock().is_some() {
                        return;
                    }

                    tracing::debug!("No speech detected, restarting capture");
                    tokio::time::sleep(Duration::from_millis(self.config.listen_restart_delay_ms))
                        .await;
                }
                Ok(ListeningOutcome::PermissionDenied) => {
                    self.transcript.lock().clear();
                    if !self.epoch_valid(epoch) {
                        return;
                    }
                    self.set_state(CallState::Active);
                    self.emit(CallEvent::Error(
                        "Microphone access denied. Please allow microphone access.".to_string(),
                    ));
                    return;
                }
                Ok(ListeningOutcome::Cancelled) => {
                    return;
                }
                Err(e) => {
                    self.transcript.lock().clear();
                    if !self.epoch_valid(epoch) {
                        return;
                    }
                    self.set_state(CallState::Active);
                    self.emit(CallEvent::Error(format!("Speech capture failed: {e}")));
                    return;
                }
            }
        }
    }

    /// Send a finalized transcript and apply the assistant's reply
    async fn process_turn(self: &Arc<Self>, text: String, epoch: u64) {
        if !self.epoch_valid(epoch) {
            return;
        }

        // Caller errors: nothing goes on the wire
        let session_id = match self.session_id.lock().clone() {
            Some(id) => id,
            None => {
                tracing::error!("Transcript finalized without a session id");
                self.set_state(CallState::Active);
                return;
            }
        };
        if text.trim().is_empty() {
            self.set_state(CallState::Active);
            return;
        }

        // The backend session is single-threaded: one exchange at a time
        if self.exchange_in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("Message exchange already in flight, dropping transcript");
            return;
        }

        self.set_state(CallState::Processing);
        self.push_turn(Turn::user(text.clone()));

        let result = self.backend.send_message(&session_id, &text).await;
        self.exchange_in_flight.store(false, Ordering::SeqCst);

        // The call may have been torn down while the request was in flight
        if !self.epoch_valid(epoch) {
            tracing::debug!("Discarding reply that arrived after end of call");
            return;
        }

        match result {
            Ok(reply) => {
                self.push_turn(Turn::assistant(reply.assistant_message.clone()));

                if reply.completed {
                    {
                        let mut completion = self.completion.lock();
                        if completion.is_none() {
                            *completion = Some(CompletionArtifact {
                                completed: true,
                                invoice_url: reply.invoice_url.clone(),
                            });
                        }
                    }

                    self.set_state(CallState::Completed);
                    self.emit(CallEvent::Completed {
                        invoice_url: reply.invoice_url,
                    });
                    tracing::info!("Conversation completed");
                } else {
                    self.set_state(CallState::Active);
                    self.spawn_speak(reply.assistant_message, self.config.reply_delay_ms, epoch);
                }
            }
            Err(e) => {
                // Surface as an assistant-style bubble and unblock the turn
                tracing::warn!("Message exchange failed: {}", e);
                self.push_turn(Turn::assistant(EXCHANGE_FAILURE_REPLY));
                self.emit(CallEvent::Error(format!("Message exchange failed: {e}")));
                self.set_state(CallState::Active);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_names() {
        assert_eq!(CallState::Idle.display_name(), "idle");
        assert_eq!(CallState::Processing.display_name(), "processing");
    }

    #[test]
    fn test_terminal_states() {
        assert!(CallState::Completed.is_terminal());
        assert!(CallState::Ended.is_terminal());
        assert!(!CallState::Active.is_terminal());
        assert!(!CallState::Failed.is_terminal());
    }
}
