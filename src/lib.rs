//! bbswitch: Power down the discrete GPU of a dual-graphics machine
//!
//! This library provides the userspace side of bbswitch:
//! - Daemon configuration
//! - The control socket daemon that owns the managed device
//! - A client for the control socket
//!
//! The hardware logic lives in `bbswitch-core`, the Linux backends in
//! `bbswitch-linux`.

pub mod client;
pub mod config;
pub mod daemon;

// Re-export commonly used types
pub use config::DaemonConfig;
pub use daemon::protocol::{Request, Response};
