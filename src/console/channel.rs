//! Console channel to the guest's telnet serial port
//!
//! The guest runs a free-running terminal, not a framed protocol, so output
//! is drained opportunistically: each read is bounded by a deadline (and by
//! a random sentinel that should never appear), and a turn is over when a
//! read comes back empty.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::telnet::{TelnetDecoder, WILL_ECHO};

/// Default time a read waits for more output
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default pause between connection attempts
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(1);

const READ_BUF_SIZE: usize = 4096;

/// How `ConsoleChannel::connect` treats a refused connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPolicy {
    /// Keep trying forever. QEMU opens the port some time after launch and
    /// there is no other readiness signal; an unreachable guest waits forever.
    RetryIndefinitely { delay: Duration },
    /// Give up after `max` failed attempts
    Attempts { max: u32, delay: Duration },
}

impl ConnectPolicy {
    pub fn delay(&self) -> Duration {
        match self {
            ConnectPolicy::RetryIndefinitely { delay } | ConnectPolicy::Attempts { delay, .. } => {
                *delay
            }
        }
    }

    /// Whether another attempt may follow `failed` failed attempts
    pub fn should_retry(&self, failed: u32) -> bool {
        match self {
            ConnectPolicy::RetryIndefinitely { .. } => true,
            ConnectPolicy::Attempts { max, .. } => failed < *max,
        }
    }
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        ConnectPolicy::RetryIndefinitely {
            delay: DEFAULT_CONNECT_DELAY,
        }
    }
}

/// Byte string that bounds a single read call
///
/// Generated once per run. It only stops a read early if it happens to show
/// up in the output; it is not a protocol delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel(Vec<u8>);

impl Sentinel {
    pub fn random() -> Self {
        Self(Uuid::new_v4().into_bytes().to_vec())
    }

    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Index just past the first occurrence in `haystack`
    fn end_in(&self, haystack: &[u8]) -> Option<usize> {
        if self.0.is_empty() || haystack.len() < self.0.len() {
            return None;
        }
        haystack
            .windows(self.0.len())
            .position(|w| w == self.0.as_slice())
            .map(|start| start + self.0.len())
    }
}

/// Error type for console operations
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("failed to connect to {addr} after {attempts} attempts")]
    Connect {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("console connection closed by the guest")]
    Closed,

    #[error("console I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode console bytes as UTF-8, dropping anything that is not valid
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

/// Remove the echo of `command` from the start of the first output chunk
pub fn strip_echo<'a>(chunk: &'a str, command: &str) -> &'a str {
    match chunk.strip_prefix(command) {
        Some(rest) => rest.trim_start(),
        None => chunk,
    }
}

/// Byte-stream connection to the guest's serial console
pub struct ConsoleChannel {
    stream: TcpStream,
    decoder: TelnetDecoder,
    /// Decoded bytes received but not yet returned
    pending: Vec<u8>,
    sentinel: Sentinel,
    idle_timeout: Duration,
    eof: bool,
}

impl ConsoleChannel {
    /// Connect to `host:port`, retrying per `policy`, then ask the remote
    /// end to stop echoing
    pub async fn connect(
        host: &str,
        port: u16,
        policy: ConnectPolicy,
    ) -> Result<Self, ConsoleError> {
        let addr = format!("{}:{}", host, port);
        let mut failed = 0u32;

        loop {
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    info!(addr = %addr, attempts = failed + 1, "Console connected");
                    return Self::from_stream(stream).await;
                }
                Err(e) => {
                    failed += 1;
                    debug!(addr = %addr, attempt = failed, error = %e, "Console not ready");
                    if !policy.should_retry(failed) {
                        return Err(ConsoleError::Connect {
                            addr,
                            attempts: failed,
                            source: e,
                        });
                    }
                    tokio::time::sleep(policy.delay()).await;
                }
            }
        }
    }

    /// Wrap an already connected stream and send the echo-off request
    pub async fn from_stream(mut stream: TcpStream) -> Result<Self, ConsoleError> {
        stream.write_all(&WILL_ECHO).await?;

        Ok(Self {
            stream,
            decoder: TelnetDecoder::new(),
            pending: Vec::new(),
            sentinel: Sentinel::random(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            eof: false,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_sentinel(mut self, sentinel: Sentinel) -> Self {
        self.sentinel = sentinel;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Write raw bytes to the console
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ConsoleError> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// One bounded read: returns when the sentinel is seen or `timeout` has
    /// elapsed since the call started, with whatever arrived by then
    ///
    /// Returns an empty string if nothing arrived. Bytes following a
    /// sentinel stay buffered for the next call.
    pub async fn read_chunk(&mut self, timeout: Duration) -> Result<String, ConsoleError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; READ_BUF_SIZE];

        loop {
            if let Some(end) = self.sentinel.end_in(&self.pending) {
                let chunk: Vec<u8> = self.pending.drain(..end).collect();
                return Ok(decode_lossy(&chunk));
            }
            if self.eof {
                break;
            }

            match tokio::time::timeout_at(deadline, self.stream.read(&mut buf)).await {
                // Deadline passed
                Err(_) => break,
                Ok(Ok(0)) => self.eof = true,
                Ok(Ok(n)) => {
                    let decoded = self.decoder.decode(&buf[..n]);
                    if !decoded.replies.is_empty() {
                        self.stream.write_all(&decoded.replies).await?;
                    }
                    self.pending.extend_from_slice(&decoded.data);
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        if self.eof && self.pending.is_empty() {
            return Err(ConsoleError::Closed);
        }

        let chunk = std::mem::take(&mut self.pending);
        Ok(decode_lossy(&chunk))
    }

    /// Drain console output until a read times out empty
    ///
    /// `on_chunk` sees each non-empty piece as it arrives. When `echo` is
    /// given, its echo is stripped from the first piece. Returns everything
    /// drained, concatenated.
    pub async fn read_until_idle<F>(
        &mut self,
        echo: Option<&str>,
        mut on_chunk: F,
    ) -> Result<String, ConsoleError>
    where
        F: FnMut(&str),
    {
        let mut all = String::new();
        let mut first = true;

        loop {
            let chunk = match self.read_chunk(self.idle_timeout).await {
                Ok(chunk) => chunk,
                // Hand back what we have; the next read reports the close
                Err(ConsoleError::Closed) if !all.is_empty() => break,
                Err(e) => return Err(e),
            };
            if chunk.is_empty() {
                break;
            }

            let piece = match (first, echo) {
                (true, Some(command)) => strip_echo(&chunk, command),
                _ => chunk.as_str(),
            };
            first = false;

            if !piece.is_empty() {
                on_chunk(piece);
                all.push_str(piece);
            }
        }

        Ok(all)
    }
}

impl std::fmt::Debug for ConsoleChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleChannel")
            .field("peer", &self.stream.peer_addr().ok())
            .field("pending", &self.pending.len())
            .field("idle_timeout", &self.idle_timeout)
            .field("eof", &self.eof)
            .finish()
    }
}
