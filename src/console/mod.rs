//! Serial console access
//!
//! QEMU exposes the guest's serial port as a telnet server. This module
//! connects to it, strips telnet command sequences and drains terminal
//! output with per-read timeouts.

pub mod channel;
pub mod telnet;

pub use channel::{
    decode_lossy, strip_echo, ConnectPolicy, ConsoleChannel, ConsoleError, Sentinel,
    DEFAULT_CONNECT_DELAY, DEFAULT_IDLE_TIMEOUT,
};
pub use telnet::TelnetDecoder;
