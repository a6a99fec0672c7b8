//! # murmur-bridge - Engine Control Bridge
//!
//! Correlated request/response channel to the engine process over its stdio,
//! newline-delimited JSON-RPC 2.0.
//!
//! ## Public API
//!
//! ### Bridge (`bridge`)
//! - [`ControlBridge`] - connect/send/subscribe/disconnect, daemon-gated
//!
//! ### Commands (`commands`)
//! - [`EngineCommand`] - the typed command surface
//!
//! ### Process (`process`)
//! - [`EngineProcess`] - spawn and stdio plumbing, clearnet-off environment
//! - [`EngineConfig`] - invocation parameters
//!
//! ### Protocol (`protocol`)
//! - [`Envelope`] / [`Notification`] / [`Request`] - the wire format

pub mod bridge;
pub mod commands;
pub mod process;
pub mod protocol;
pub mod tracker;

pub use bridge::ControlBridge;
pub use commands::EngineCommand;
pub use process::{EngineConfig, EngineProcess};
pub use protocol::{Envelope, Notification, Request, WireError};
pub use tracker::{EngineReply, RequestTracker};
