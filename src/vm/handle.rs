//! VM Handle - owns a running QEMU process
//!
//! Lifecycle: Running -> Stopping -> Exited

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tracing::{info, warn};

/// Status of the guest process
#[derive(Debug, Clone, PartialEq)]
pub enum VmStatus {
    /// QEMU is running (the guest may still be restoring its snapshot)
    Running,
    /// Shutdown requested, waiting for the process to exit
    Stopping,
    /// The process has exited
    Exited(Option<i32>),
}

/// Owns the QEMU child process
///
/// The child was spawned with kill-on-drop, so dropping the handle also
/// tears the guest down; `shutdown` does it explicitly and reaps it.
pub struct VmHandle {
    process: Child,
    /// Local telnet port of the serial console
    pub console_port: u16,
    pub status: VmStatus,
    created_at: Instant,
}

impl VmHandle {
    pub fn new(process: Child, console_port: u16) -> Self {
        Self {
            process,
            console_port,
            status: VmStatus::Running,
            created_at: Instant::now(),
        }
    }

    /// OS process id, `None` once the child has been reaped
    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    /// Get time since the VM was launched
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Non-blocking check whether QEMU has exited on its own
    pub fn try_exit_status(&mut self) -> std::io::Result<Option<ExitStatus>> {
        let status = self.process.try_wait()?;
        if let Some(s) = status {
            self.status = VmStatus::Exited(s.code());
        }
        Ok(status)
    }

    /// Resolve once QEMU exits on its own, checking every `interval`
    pub async fn wait_for_exit(&mut self, interval: Duration) -> std::io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.try_exit_status()? {
                warn!(code = ?status.code(), uptime_secs = self.age().as_secs(), "QEMU exited on its own");
                return Ok(status);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Kill the QEMU process and wait for it to exit
    pub async fn shutdown(&mut self) {
        if matches!(self.status, VmStatus::Exited(_)) {
            return;
        }
        self.status = VmStatus::Stopping;

        // Process might already be dead
        if let Err(e) = self.process.start_kill() {
            warn!(error = %e, "Failed to kill QEMU process");
        }

        match self.process.wait().await {
            Ok(status) => {
                info!(code = ?status.code(), uptime_secs = self.age().as_secs(), "QEMU exited");
                self.status = VmStatus::Exited(status.code());
            }
            Err(e) => {
                warn!(error = %e, "Failed to reap QEMU process");
                self.status = VmStatus::Exited(None);
            }
        }
    }
}

impl std::fmt::Debug for VmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmHandle")
            .field("pid", &self.pid())
            .field("console_port", &self.console_port)
            .field("status", &self.status)
            .field("age", &self.age())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn sleeper() -> Child {
        Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_kills_and_reaps() {
        let mut vm = VmHandle::new(sleeper(), 3456);
        assert!(vm.pid().is_some());
        assert_eq!(vm.status, VmStatus::Running);

        vm.shutdown().await;

        assert!(matches!(vm.status, VmStatus::Exited(_)));
        assert!(vm.pid().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_noop() {
        let mut vm = VmHandle::new(sleeper(), 3456);
        vm.shutdown().await;
        vm.shutdown().await;
        assert!(matches!(vm.status, VmStatus::Exited(_)));
    }

    #[tokio::test]
    async fn test_wait_for_exit_reports_early_exit() {
        let child = Command::new("sh")
            .args(["-c", "exit 3"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut vm = VmHandle::new(child, 3456);

        let status = vm.wait_for_exit(Duration::from_millis(10)).await.unwrap();

        assert_eq!(status.code(), Some(3));
        assert_eq!(vm.status, VmStatus::Exited(Some(3)));

        // Already reaped
        vm.shutdown().await;
        assert_eq!(vm.status, VmStatus::Exited(Some(3)));
    }

    #[tokio::test]
    async fn test_try_exit_status_running() {
        let mut vm = VmHandle::new(sleeper(), 3456);
        assert!(vm.try_exit_status().unwrap().is_none());
        vm.shutdown().await;
    }
}
