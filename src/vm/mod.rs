//! QEMU VM management module
//!
//! This module provides:
//! - QEMU launch configuration and argument building
//! - Process spawning with the serial console bridged to a telnet port
//! - A handle that owns the child process and tears it down

pub mod handle;
pub mod qemu;

pub use handle::VmHandle;
pub use qemu::*;
