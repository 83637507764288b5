//! QEMU launch
//!
//! Builds the emulator command line and spawns it. The guest's first serial
//! port is exposed as a telnet server on `localhost:<port>`; nothing here
//! waits for it to come up, the console channel retries until it does.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use super::VmHandle;

pub const DEFAULT_QEMU_BIN: &str = "qemu-system-x86_64";
pub const DEFAULT_MEMORY: &str = "1G";
pub const DEFAULT_SNAPSHOT: &str = "bootroot";
pub const DEFAULT_CONSOLE_PORT: u16 = 3456;

/// Launch configuration for a single QEMU guest
#[derive(Debug, Clone, PartialEq)]
pub struct QemuConfig {
    /// Emulator binary (looked up on PATH when relative)
    pub binary: PathBuf,
    /// Guest memory size in QEMU notation (e.g. "1G")
    pub memory: String,
    /// Disk image booted as the first hard disk
    pub image: PathBuf,
    /// Internal snapshot restored with `-loadvm`
    pub snapshot: String,
    /// Local port of the telnet serial console
    pub port: u16,
}

impl QemuConfig {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_QEMU_BIN),
            memory: DEFAULT_MEMORY.to_string(),
            image: image.into(),
            snapshot: DEFAULT_SNAPSHOT.to_string(),
            port: DEFAULT_CONSOLE_PORT,
        }
    }

    /// Emulator arguments: KVM acceleration, no display, user-mode
    /// networking and the serial console on a telnet server socket
    pub fn args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.memory.clone(),
            "-hda".to_string(),
            self.image.display().to_string(),
            "-machine".to_string(),
            "accel=kvm".to_string(),
            "-serial".to_string(),
            format!("telnet:localhost:{},server,nowait", self.port),
            "-display".to_string(),
            "none".to_string(),
            "-net".to_string(),
            "nic".to_string(),
            "-net".to_string(),
            "user".to_string(),
            "-loadvm".to_string(),
            self.snapshot.clone(),
        ]
    }
}

/// Error type for VM launch
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("VM image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("failed to spawn {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("QEMU exited before the console came up (exit code {code:?})")]
    EarlyExit { code: Option<i32> },
}

/// Spawn QEMU for the given configuration
///
/// The image is checked up front so a typo fails here rather than as a
/// console that never answers. The child is killed if the returned handle
/// is dropped.
pub fn spawn_qemu(config: &QemuConfig) -> Result<VmHandle, LaunchError> {
    if !config.image.exists() {
        return Err(LaunchError::ImageNotFound(config.image.clone()));
    }

    let child = Command::new(&config.binary)
        .args(config.args())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            binary: config.binary.clone(),
            source,
        })?;

    info!(
        pid = child.id(),
        image = %config.image.display(),
        snapshot = %config.snapshot,
        port = config.port,
        "QEMU launched"
    );

    Ok(VmHandle::new(child, config.port))
}
