//! Integration tests for the call session (backend -> state machine -> speech)
//!
//! Scripted in-process drivers stand in for the HTTP backend and the
//! platform speech stack; tokio's paused clock makes the timing
//! deterministic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::timeout;

use call_assistant_backend::{AssistantReply, DialogueBackend, SessionStarted};
use call_assistant_call::{CallEvent, CallSession, CallState};
use call_assistant_config::{CallConfig, SpeechConfig};
use call_assistant_core::{BackendError, EnquiryParams, TurnRole};
use call_assistant_speech::{CaptureEvent, ScriptedCapture, SpeechInput, SpeechOutput};

/// Scripted dialogue backend: canned session, queued replies, call counters
struct ScriptedBackend {
    start_calls: AtomicUsize,
    fail_first_start: Mutex<bool>,
    sent: Mutex<Vec<(String, String)>>,
    replies: Mutex<VecDeque<Result<AssistantReply, BackendError>>>,
    reply_delay_ms: u64,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<AssistantReply, BackendError>>) -> Self {
        Self {
            start_calls: AtomicUsize::new(0),
            fail_first_start: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(replies.into_iter().collect()),
            reply_delay_ms: 0,
        }
    }

    fn with_reply_delay(mut self, delay_ms: u64) -> Self {
        self.reply_delay_ms = delay_ms;
        self
    }

    fn failing_first_start(self) -> Self {
        *self.fail_first_start.lock() = true;
        self
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl DialogueBackend for ScriptedBackend {
    async fn start_session(&self, _params: &EnquiryParams) -> Result<SessionStarted, BackendError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        let fail = std::mem::take(&mut *self.fail_first_start.lock());
        if fail {
            return Err(BackendError::Connection("connection refused".to_string()));
        }

        Ok(SessionStarted {
            session_id: "abc".to_string(),
            assistant_message: "Hello".to_string(),
        })
    }

    async fn send_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<AssistantReply, BackendError> {
        if self.reply_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.reply_delay_ms)).await;
        }

        self.sent
            .lock()
            .push((session_id.to_string(), message.to_string()));

        self.replies.lock().pop_front().unwrap_or_else(|| {
            Ok(AssistantReply {
                assistant_message: "Sure, go on.".to_string(),
                completed: false,
                invoice_url: None,
            })
        })
    }
}

fn reply(text: &str) -> AssistantReply {
    AssistantReply {
        assistant_message: text.to_string(),
        completed: false,
        invoice_url: None,
    }
}

fn make_session(
    backend: Arc<ScriptedBackend>,
    capture_turns: Vec<Vec<(u64, CaptureEvent)>>,
) -> Arc<CallSession> {
    let config = CallConfig::default();
    let output = Arc::new(SpeechOutput::simple(SpeechConfig::default()));
    let input = Arc::new(SpeechInput::new(
        Arc::new(ScriptedCapture::new(capture_turns)),
        Duration::from_millis(config.silence_timeout_ms),
    ));

    Arc::new(CallSession::new(
        EnquiryParams::new("Apple Computers", "MacBook Pro", "Display screen repair"),
        config,
        backend,
        output,
        input,
    ))
}

async fn wait_for_state(rx: &mut broadcast::Receiver<CallEvent>, target: CallState) {
    loop {
        let event = timeout(Duration::from_secs(120), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {target:?}"))
            .expect("event stream closed");

        if let CallEvent::StateChanged { to, .. } = event {
            if to == target {
                return;
            }
        }
    }
}

async fn wait_for_error(rx: &mut broadcast::Receiver<CallEvent>) -> String {
    loop {
        let event = timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("timed out waiting for error event")
            .expect("event stream closed");

        if let CallEvent::Error(message) = event {
            return message;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_start_appends_greeting() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let session = make_session(Arc::clone(&backend), vec![]);

    session.start().await.unwrap();

    assert_eq!(session.session_id().as_deref(), Some("abc"));
    assert_eq!(session.state(), CallState::Active);

    let turns = session.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, TurnRole::Assistant);
    assert_eq!(turns[0].content, "Hello");
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let session = make_session(Arc::clone(&backend), vec![]);

    let (first, second) = tokio::join!(session.start(), session.start());
    first.unwrap();
    second.unwrap();

    // And a later repeat is suppressed too
    session.start().await.unwrap();

    assert_eq!(backend.start_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_allows_retry() {
    let backend = Arc::new(ScriptedBackend::new(vec![]).failing_first_start());
    let session = make_session(Arc::clone(&backend), vec![]);

    assert!(session.start().await.is_err());
    assert_eq!(session.state(), CallState::Failed);
    assert!(session.session_id().is_none());

    // The guard was reset, so a retry issues a second creation call
    session.start().await.unwrap();
    assert_eq!(session.state(), CallState::Active);
    assert_eq!(backend.start_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_full_turn_sends_exact_body_and_orders_log() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply("Great, anything else?"))]));
    let session = make_session(
        Arc::clone(&backend),
        vec![vec![
            (0, CaptureEvent::Interim("yes".to_string())),
            (500, CaptureEvent::Interim("yes available".to_string())),
        ]],
    );

    let mut rx = session.subscribe();
    session.start().await.unwrap();

    // greeting speech -> auto listen -> silence window -> exchange
    wait_for_state(&mut rx, CallState::Listening).await;
    wait_for_state(&mut rx, CallState::Processing).await;
    wait_for_state(&mut rx, CallState::Active).await;

    assert_eq!(
        backend.sent(),
        vec![("abc".to_string(), "yes available".to_string())]
    );

    let contents: Vec<(TurnRole, String)> = session
        .turns()
        .iter()
        .map(|t| (t.role, t.content.clone()))
        .collect();
    assert_eq!(
        contents,
        vec![
            (TurnRole::Assistant, "Hello".to_string()),
            (TurnRole::User, "yes available".to_string()),
            (TurnRole::Assistant, "Great, anything else?".to_string()),
        ]
    );

    // Finalization cleared the in-progress transcript
    assert!(session.current_transcript().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_completed_reply_is_terminal_and_exposes_invoice() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(AssistantReply {
        assistant_message: "Your booking is confirmed.".to_string(),
        completed: true,
        invoice_url: Some("https://x/inv.pdf".to_string()),
    })]));
    let session = make_session(
        Arc::clone(&backend),
        vec![vec![(0, CaptureEvent::Final("book it".to_string()))]],
    );

    let mut rx = session.subscribe();
    session.start().await.unwrap();
    wait_for_state(&mut rx, CallState::Completed).await;

    let completion = session.completion().expect("completion artifact set");
    assert!(completion.completed);
    assert_eq!(completion.invoice_url.as_deref(), Some("https://x/inv.pdf"));

    // Drivers are not restarted after completion
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.state(), CallState::Completed);
    assert_eq!(backend.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exchange_failure_recovers_to_active() {
    let backend = Arc::new(ScriptedBackend::new(vec![Err(BackendError::Connection(
        "broken pipe".to_string(),
    ))]));
    let session = make_session(
        Arc::clone(&backend),
        vec![vec![(0, CaptureEvent::Final("is it available".to_string()))]],
    );

    let mut rx = session.subscribe();
    session.start().await.unwrap();
    wait_for_state(&mut rx, CallState::Processing).await;
    wait_for_state(&mut rx, CallState::Active).await;

    // One assistant-style failure bubble, not a crash or a stuck Processing
    let turns = session.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[2].role, TurnRole::Assistant);
    assert!(turns[2].content.contains("trouble"));
    assert_eq!(session.state(), CallState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_listening_and_processing_are_mutually_exclusive() {
    let backend = Arc::new(
        ScriptedBackend::new(vec![Ok(reply("Noted."))]).with_reply_delay(10_000),
    );
    let session = make_session(
        Arc::clone(&backend),
        vec![vec![(0, CaptureEvent::Final("hello there".to_string()))]],
    );

    let mut rx = session.subscribe();
    session.start().await.unwrap();

    wait_for_state(&mut rx, CallState::Listening).await;
    assert!(session.begin_listening().is_err());

    wait_for_state(&mut rx, CallState::Processing).await;
    assert!(session.begin_listening().is_err());

    wait_for_state(&mut rx, CallState::Active).await;
}

#[tokio::test(start_paused = true)]
async fn test_end_discards_late_reply() {
    let backend = Arc::new(
        ScriptedBackend::new(vec![Ok(reply("Too late."))]).with_reply_delay(10_000),
    );
    let session = make_session(
        Arc::clone(&backend),
        vec![vec![(0, CaptureEvent::Final("one moment".to_string()))]],
    );

    let mut rx = session.subscribe();
    session.start().await.unwrap();
    wait_for_state(&mut rx, CallState::Processing).await;

    session.end("user hung up");
    assert_eq!(session.state(), CallState::Ended);

    // Let the in-flight reply arrive; it must not be applied
    tokio::time::sleep(Duration::from_secs(15)).await;

    let turns = session.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].role, TurnRole::User);
    assert_eq!(session.state(), CallState::Ended);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_fatal_for_the_turn() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let session = make_session(
        Arc::clone(&backend),
        vec![vec![(0, CaptureEvent::PermissionDenied)]],
    );

    let mut rx = session.subscribe();
    session.start().await.unwrap();

    wait_for_state(&mut rx, CallState::Listening).await;
    let message = wait_for_error(&mut rx).await;
    assert!(message.contains("Microphone"));

    assert_eq!(session.state(), CallState::Active);
    assert!(backend.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_speech_restarts_capture() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply("Got it."))]));
    let session = make_session(
        Arc::clone(&backend),
        vec![
            vec![(200, CaptureEvent::NoSpeech)],
            vec![(0, CaptureEvent::Final("second try".to_string()))],
        ],
    );

    let mut rx = session.subscribe();
    session.start().await.unwrap();

    // First capture finds nothing; the loop restarts and the second finalizes
    wait_for_state(&mut rx, CallState::Listening).await;
    wait_for_state(&mut rx, CallState::Listening).await;
    wait_for_state(&mut rx, CallState::Processing).await;

    assert_eq!(
        backend.sent(),
        vec![("abc".to_string(), "second try".to_string())]
    );
}
