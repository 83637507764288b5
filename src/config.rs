//! Session configuration
//!
//! Everything here is fixed at startup and never mutated afterwards. The
//! session loop, the completion client and the launcher each receive the
//! part they need.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::completion::{Sampling, DEFAULT_API_BASE, MAX_COMPLETION_TOKENS};
use crate::console::{ConnectPolicy, DEFAULT_IDLE_TIMEOUT};
use crate::vm::QemuConfig;

/// Tokens held back from the engine's context window for the completion
pub const COMPLETION_RESERVE: usize = MAX_COMPLETION_TOKENS as usize;

/// Completion engine; also fixes the prompt token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Engine {
    #[default]
    #[value(name = "code-davinci-001")]
    CodeDavinci001,
    #[value(name = "code-cushman-001")]
    CodeCushman001,
}

impl Engine {
    /// Model identifier sent to the completion service
    pub fn model_name(&self) -> &'static str {
        match self {
            Engine::CodeDavinci001 => "code-davinci-001",
            Engine::CodeCushman001 => "code-cushman-001",
        }
    }

    /// Total context window of the engine, in tokens
    pub fn context_tokens(&self) -> usize {
        match self {
            Engine::CodeDavinci001 => 4096,
            Engine::CodeCushman001 => 2048,
        }
    }

    /// Maximum prompt size once the completion reserve is subtracted
    pub fn prompt_budget(&self) -> usize {
        self.context_tokens() - COMPLETION_RESERVE
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

/// What the model sees on each turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// Only the most recent console output
    #[default]
    LastChunk,
    /// The whole session transcript
    WholeTranscript,
}

/// Immutable configuration for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub engine: Engine,
    pub sampling: Sampling,
    pub context_mode: ContextMode,
    /// How long a console read waits for more output before the turn ends
    pub idle_timeout: Duration,
    pub connect_policy: ConnectPolicy,
    pub api_base: String,
    pub api_key: String,
    pub vm: QemuConfig,
}

impl SessionConfig {
    /// Configuration with defaults for everything but the image and key
    pub fn new(image: impl Into<PathBuf>, api_key: impl Into<String>) -> Self {
        Self {
            engine: Engine::default(),
            sampling: Sampling::default(),
            context_mode: ContextMode::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_policy: ConnectPolicy::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            vm: QemuConfig::new(image),
        }
    }

    pub fn prompt_budget(&self) -> usize {
        self.engine.prompt_budget()
    }
}

/// Error type for configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read API key from {}", path.display())]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API key file {} is empty", path.display())]
    KeyEmpty { path: PathBuf },

    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Read the completion service key from a file, trimming whitespace
pub fn load_api_key(path: &Path) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;

    let key = raw.trim();
    if key.is_empty() {
        return Err(ConfigError::KeyEmpty {
            path: path.to_path_buf(),
        });
    }

    Ok(key.to_string())
}
