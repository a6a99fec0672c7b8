//! # murmur-core - Core Domain Types
//!
//! Foundation crate for the murmur process core. Provides the daemon status
//! model, error taxonomy, the log-line classifier, settings, and logging
//! init. No internal dependencies -- only external crates (serde, thiserror,
//! regex, tracing, toml).
//!
//! ## Public API
//!
//! ### Status (`status`)
//! - [`DaemonState`] - lifecycle phase (Stopped, Starting, Connecting, Connected, Error)
//! - [`DaemonStatus`] - consistent point-in-time snapshot
//! - [`StatusHandle`] - cloneable owned handle; the supervisor is the only writer
//! - [`ErrorRecord`] - message + exit code captured on failure
//!
//! ### Classifier (`classifier`)
//! - [`classify_line()`] - `Bootstrapped NN%` / bind-failure detection
//! - [`BootstrapSignal`] - Progress / Fatal / Noise
//!
//! ### Error Handling (`error`)
//! - [`Error`] - typed failures, `fatal` vs `recoverable` classification
//! - [`Result`] - alias for `std::result::Result<T, Error>`
//!
//! ### Settings (`config`)
//! - [`Settings`] - TOML settings with full defaults
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use murmur_core::prelude::*;
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod status;

/// Prelude for common imports used throughout all murmur crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use classifier::{classify_line, BootstrapSignal};
pub use config::{DaemonSettings, EngineSettings, Settings};
pub use error::{Error, Result, ResultExt};
pub use events::ProcessEvent;
pub use status::{DaemonState, DaemonStatus, ErrorRecord, StatusHandle};
