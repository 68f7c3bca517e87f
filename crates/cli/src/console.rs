//! Console speech backends
//!
//! Stand-ins for a platform speech stack: assistant turns are already
//! rendered as text, and user utterances arrive as typed lines.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use call_assistant_core::SpeechError;
use call_assistant_speech::{CaptureBackend, CaptureEvent, SynthesisBackend};

/// Text is already on screen; "speaking" takes no time
pub struct ConsoleSynthesis;

#[async_trait]
impl SynthesisBackend for ConsoleSynthesis {
    async fn speak(&self, _text: &str) -> Result<(), SpeechError> {
        Ok(())
    }
}

/// Reads one stdin line per capture; the whole line is a final transcript
pub struct ConsoleCapture {
    lines: Arc<tokio::sync::Mutex<Lines<BufReader<Stdin>>>>,
    eof: Arc<AtomicBool>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(
                BufReader::new(tokio::io::stdin()).lines(),
            )),
            eof: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for ConsoleCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for ConsoleCapture {
    async fn start(&self, events: mpsc::Sender<CaptureEvent>) -> Result<(), SpeechError> {
        if self.eof.load(Ordering::SeqCst) {
            return Err(SpeechError::Capture("input closed".to_string()));
        }

        print!("> ");
        let _ = std::io::stdout().flush();

        let lines = Arc::clone(&self.lines);
        let eof = Arc::clone(&self.eof);

        tokio::spawn(async move {
            let mut guard = lines.lock().await;
            match guard.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        let _ = events.send(CaptureEvent::NoSpeech).await;
                    } else {
                        let _ = events.send(CaptureEvent::Final(line)).await;
                    }
                }
                Ok(None) => {
                    eof.store(true, Ordering::SeqCst);
                    let _ = events.send(CaptureEvent::Ended).await;
                }
                Err(e) => {
                    tracing::warn!("stdin read failed: {}", e);
                    eof.store(true, Ordering::SeqCst);
                    let _ = events.send(CaptureEvent::Ended).await;
                }
            }
        });

        Ok(())
    }
}
