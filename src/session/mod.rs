//! Console session module
//!
//! This module provides the loop that drives the guest:
//!
//! ```text
//! connect → "\n" → seed transcript
//!              ↓
//!     prompt (trimmed transcript or last chunk)
//!              ↓
//!     Completer → command
//!              ↓
//!     send command + "\n" → drain console until idle
//!              ↓
//!     append to transcript → loop
//! ```

pub mod controller;
pub mod transcript;

pub use controller::{Outcome, PromptSettings, Session, SessionError, SessionState};
pub use transcript::Transcript;
