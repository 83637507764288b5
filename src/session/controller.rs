//! Session controller - the console/model loop
//!
//! The session owns the console channel, the transcript and (optionally) the
//! VM handle. It alternates between asking the completer for the next
//! command and draining the console's answer until cancelled or until a step
//! fails.

use std::io::Write;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Transcript;
use crate::completion::{Completer, CompletionError};
use crate::config::{ContextMode, SessionConfig};
use crate::console::{ConsoleChannel, ConsoleError};
use crate::prompt::{trim_to_budget, TokenCounter};
use crate::vm::VmHandle;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    /// Console attached, seed output read
    Connected,
    /// A completion request is in flight
    WaitingForModel,
    /// Draining console output after sending a command
    WaitingForMachine,
    Terminated,
}

/// How a run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Interrupted,
}

/// Error type for a running session; every variant is fatal
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Console(#[from] ConsoleError),

    /// Completion failures are never retried
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// How prompts are built from the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSettings {
    pub context_mode: ContextMode,
    /// Token ceiling for the prompt
    pub max_tokens: usize,
}

impl From<&SessionConfig> for PromptSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            context_mode: config.context_mode,
            max_tokens: config.prompt_budget(),
        }
    }
}

/// One console session driven by a completer
pub struct Session<C, W> {
    channel: ConsoleChannel,
    completer: C,
    counter: Box<dyn TokenCounter>,
    settings: PromptSettings,
    transcript: Transcript,
    /// Byte offset where the whole-transcript prompt currently starts.
    /// Only moves forward, always to a line start.
    prompt_start: usize,
    /// Console output of the latest turn
    last_chunk: String,
    state: SessionState,
    iterations: usize,
    vm: Option<VmHandle>,
    out: W,
}

impl<C, W> Session<C, W>
where
    C: Completer,
    W: Write,
{
    /// Create a session over a connected console
    ///
    /// # Arguments
    /// * `channel` - console channel, already connected
    /// * `completer` - source of commands
    /// * `counter` - token counter used for trimming
    /// * `settings` - context mode and token budget
    /// * `out` - where console output and commands are echoed (stdout in
    ///   the binary)
    pub fn new(
        channel: ConsoleChannel,
        completer: C,
        counter: impl TokenCounter + 'static,
        settings: PromptSettings,
        out: W,
    ) -> Self {
        Self {
            channel,
            completer,
            counter: Box::new(counter),
            settings,
            transcript: Transcript::new(),
            prompt_start: 0,
            last_chunk: String::new(),
            state: SessionState::Starting,
            iterations: 0,
            vm: None,
            out,
        }
    }

    /// Hand the VM to the session so shutdown tears it down
    pub fn with_vm(mut self, vm: VmHandle) -> Self {
        self.vm = Some(vm);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn last_chunk(&self) -> &str {
        &self.last_chunk
    }

    /// Number of completed model turns
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// The trimmed text the next completion request will carry
    pub fn prompt(&self) -> &str {
        let source = match self.settings.context_mode {
            ContextMode::WholeTranscript => &self.transcript.as_str()[self.prompt_start..],
            ContextMode::LastChunk => self.last_chunk.as_str(),
        };
        trim_to_budget(source, self.settings.max_tokens, self.counter.as_ref())
    }

    /// Move the whole-transcript prompt start past the lines that no longer
    /// fit, so trimming only ever looks at the text added since last turn
    fn advance_prompt_start(&mut self) {
        if self.settings.context_mode != ContextMode::WholeTranscript {
            return;
        }
        let kept = self.prompt().len();
        self.prompt_start = self.transcript.len() - kept;
    }

    /// Wake the console with a newline and seed the transcript with its
    /// immediate response
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.set_state(SessionState::Connected);

        self.channel.send(b"\n").await?;
        self.print("\n")?;
        self.transcript.append("\n");

        let idle = self.channel.idle_timeout();
        let chunk = self.channel.read_chunk(idle).await?;
        self.print(&chunk)?;
        self.transcript.append(&chunk);
        self.last_chunk = chunk;

        info!(seed_bytes = self.transcript.len(), "Session started");
        Ok(())
    }

    /// One turn: ask for a command, send it, drain the console
    ///
    /// Returns the command that was sent.
    pub async fn step(&mut self) -> Result<String, SessionError> {
        if self.state == SessionState::Starting {
            self.start().await?;
        }

        self.set_state(SessionState::WaitingForModel);
        self.advance_prompt_start();
        let prompt = self.prompt();
        debug!(
            iteration = self.iterations + 1,
            prompt_bytes = prompt.len(),
            "Requesting completion"
        );
        let command = self.completer.complete(prompt).await?;
        self.iterations += 1;

        writeln!(self.out, "{}", ::console::style(&command).red())?;
        self.out.flush()?;

        let line = format!("{}\n", command);
        self.channel.send(line.as_bytes()).await?;
        self.transcript.append(&line);

        self.set_state(SessionState::WaitingForMachine);
        let out = &mut self.out;
        let mut write_error = None;
        let drained = self
            .channel
            .read_until_idle(Some(command.as_str()), |piece| {
                if let Err(e) = out.write_all(piece.as_bytes()).and_then(|_| out.flush()) {
                    write_error.get_or_insert(e);
                }
            })
            .await?;
        if let Some(e) = write_error {
            return Err(e.into());
        }

        debug!(
            iteration = self.iterations,
            output_bytes = drained.len(),
            transcript_bytes = self.transcript.len() + drained.len(),
            "Console idle"
        );
        self.transcript.append(&drained);
        self.last_chunk = drained;

        Ok(command)
    }

    /// Run turns until `cancel` fires or a step fails
    ///
    /// The token is raced against each step, so an interrupt does not wait
    /// for a pending completion or console read to finish.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<Outcome, SessionError> {
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                stepped = self.step() => Some(stepped),
            };

            match result {
                None => {
                    info!(iterations = self.iterations, "Session interrupted");
                    return Ok(Outcome::Interrupted);
                }
                Some(Err(e)) => {
                    self.set_state(SessionState::Terminated);
                    return Err(e);
                }
                Some(Ok(_)) => {}
            }
        }
    }

    /// Print the full transcript between banners
    pub fn dump_transcript(&mut self) -> Result<(), SessionError> {
        write!(
            self.out,
            "\n\n\n\nTranscript:\n==========\n{}\n==========\n\n\n\n",
            self.transcript
        )?;
        self.out.flush()?;
        Ok(())
    }

    /// Kill the VM, if the session owns one
    pub async fn teardown(&mut self) {
        self.set_state(SessionState::Terminated);
        if let Some(vm) = self.vm.as_mut() {
            vm.shutdown().await;
        }
    }

    /// Interrupt path: dump the transcript, then tear down
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        let dumped = self.dump_transcript();
        self.teardown().await;
        dumped
    }

    fn print(&mut self, text: &str) -> Result<(), SessionError> {
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Session state");
            self.state = state;
        }
    }
}
