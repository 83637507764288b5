//! vmpilot - drive a QEMU guest's serial console with a completion model
//!
//! This library launches a QEMU virtual machine, attaches to its telnet
//! serial console and feeds it shell commands suggested by a text
//! completion service, one line at a time, until interrupted.
//!
//! # Modules
//!
//! - `vm` - QEMU process launch and teardown
//! - `console` - telnet console channel (connect, send, drain)
//! - `prompt` - token counting and line-granular prompt trimming
//! - `completion` - completion service client
//! - `session` - transcript and the console/model loop
//! - `config` / `cli` - startup configuration
//! - `telemetry` - log subscriber setup
//!
//! # Quick Start
//!
//! ```ignore
//! use vmpilot::{spawn_qemu, ConnectPolicy, ConsoleChannel, QemuConfig};
//!
//! let vm = spawn_qemu(&QemuConfig::new("./guest.qcow2"))?;
//! let channel = ConsoleChannel::connect("localhost", 3456, ConnectPolicy::default()).await?;
//! ```

pub mod cli;
pub mod completion;
pub mod config;
pub mod console;
pub mod prompt;
pub mod session;
pub mod telemetry;
pub mod vm;

// Re-export commonly used types at crate root for convenience
// (`crate::` paths: the `console` module shares its name with a dependency)
pub use crate::completion::{Completer, CompletionClient, CompletionError};
pub use crate::config::{ContextMode, Engine, SessionConfig};
pub use crate::console::{ConnectPolicy, ConsoleChannel, ConsoleError};
pub use crate::prompt::{trim_to_budget, BpeCounter, TokenCounter};
pub use crate::session::{Outcome, Session, SessionError, SessionState, Transcript};
pub use crate::vm::{spawn_qemu, LaunchError, QemuConfig, VmHandle};
