//! # murmur-daemon - Tor Process Supervision
//!
//! Launches, monitors, and stops the local Tor daemon. The supervisor owns
//! the lifecycle state machine ([`murmur_core::DaemonState`]) and exposes
//! it through a shared [`murmur_core::StatusHandle`]; the bootstrap monitor
//! is the only writer once the process is up.
//!
//! - [`TorSupervisor`] - start/stop/status/is_reachable
//! - [`TorProcess`] - child handle: reader tasks, wait task, kill channel
//! - [`TorConfig`] - generated runtime configuration (torrc)

pub mod launcher;
pub mod monitor;
pub mod supervisor;
pub mod torrc;

pub use launcher::{ensure_executable, resolve_executable, TorLaunch, TorProcess};
pub use supervisor::TorSupervisor;
pub use torrc::TorConfig;
