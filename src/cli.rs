//! Command-line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::completion::{Sampling, DEFAULT_API_BASE};
use crate::config::{load_api_key, ConfigError, ContextMode, Engine, SessionConfig};
use crate::console::ConnectPolicy;
use crate::vm::{QemuConfig, DEFAULT_CONSOLE_PORT, DEFAULT_MEMORY, DEFAULT_QEMU_BIN, DEFAULT_SNAPSHOT};

#[derive(Parser, Debug)]
#[command(
    name = "vmpilot",
    about = "Let a completion model drive a QEMU guest's serial console"
)]
pub struct Cli {
    /// Sampling temperature for the model
    #[arg(short, long, default_value_t = 0.8)]
    pub temperature: f32,

    /// Frequency penalty for the model (-2.0 - 2.0)
    #[arg(short, long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub frequency: f32,

    /// Engine to use
    #[arg(short, long, value_enum, default_value_t = Engine::CodeDavinci001)]
    pub engine: Engine,

    /// Path to the API key file
    #[arg(short, long, default_value = "openai.key")]
    pub key: PathBuf,

    /// Console port to connect to
    #[arg(short, long, default_value_t = DEFAULT_CONSOLE_PORT)]
    pub port: u16,

    /// Use the whole conversation as context
    #[arg(short, long)]
    pub whole_context: bool,

    /// Path to the QEMU image
    #[arg(short, long)]
    pub qcow: PathBuf,

    /// Snapshot to boot from
    #[arg(short, long, default_value = DEFAULT_SNAPSHOT)]
    pub snapshot: String,

    /// Seconds without console output that end a turn
    #[arg(long, default_value_t = 1.0)]
    pub idle_timeout: f64,

    /// Base URL of the completion service
    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// QEMU system emulator binary
    #[arg(long, default_value = DEFAULT_QEMU_BIN)]
    pub qemu: PathBuf,

    /// Guest memory size
    #[arg(long, default_value = DEFAULT_MEMORY)]
    pub memory: String,
}

impl Cli {
    /// Validate flags and load the API key into a `SessionConfig`
    pub fn into_config(self) -> Result<SessionConfig, ConfigError> {
        if !(-2.0..=2.0).contains(&self.frequency) {
            return Err(ConfigError::Invalid {
                field: "frequency",
                message: format!("{} is outside -2.0..=2.0", self.frequency),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid {
                field: "temperature",
                message: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        if !self.idle_timeout.is_finite() || self.idle_timeout <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "idle-timeout",
                message: format!("{} must be a positive number of seconds", self.idle_timeout),
            });
        }

        let api_key = load_api_key(&self.key)?;

        Ok(SessionConfig {
            engine: self.engine,
            sampling: Sampling {
                temperature: self.temperature,
                frequency_penalty: self.frequency,
            },
            context_mode: if self.whole_context {
                ContextMode::WholeTranscript
            } else {
                ContextMode::LastChunk
            },
            idle_timeout: Duration::from_secs_f64(self.idle_timeout),
            connect_policy: ConnectPolicy::default(),
            api_base: self.api_base,
            api_key,
            vm: QemuConfig {
                binary: self.qemu,
                memory: self.memory,
                image: self.qcow,
                snapshot: self.snapshot,
                port: self.port,
            },
        })
    }
}
