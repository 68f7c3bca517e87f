//! Call session state machine
//!
//! Coordinates the dialogue backend, the speech output driver, and the
//! speech input driver into a turn-taking voice call:
//!
//! ```text
//! idle → connecting → active ⇄ listening ⇄ processing → completed
//!              ↓
//!           failed (retryable)
//! ```
//!
//! The session is the sole owner of the speaking/listening/in-flight
//! arbitration: at most one of the three is active at any time.

pub mod session;

pub use session::{CallEvent, CallSession, CallState};
