//! Application error types with rich context

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Daemon Launch Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Tor executable not found: {path}")]
    ExecutableMissing { path: PathBuf },

    #[error("Tor executable is not executable and could not be repaired: {path}")]
    ExecutionDenied { path: PathBuf },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Daemon exited during startup with code {code:?}")]
    ImmediateExit {
        code: Option<i32>,
        /// Output collected before the exit, for diagnostics.
        output: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Daemon Lifecycle Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Daemon port conflict: {message}")]
    PortConflict { message: String },

    #[error("Process terminated unexpectedly")]
    ProcessTerminated,

    // ─────────────────────────────────────────────────────────────
    // Kill-Switch Gate (command rejected before reaching the engine)
    // ─────────────────────────────────────────────────────────────
    #[error("Daemon is not started")]
    DaemonNotStarted,

    #[error("Daemon is still bootstrapping ({progress}%)")]
    DaemonBootstrapping { progress: u8 },

    #[error("Daemon is in an error state: {message}")]
    DaemonErrored { message: String },

    // ─────────────────────────────────────────────────────────────
    // Bridge/Channel Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No engine channel is connected")]
    ChannelNotConnected,

    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Request '{method}' timed out after {timeout:?}")]
    RequestTimedOut { method: String, timeout: Duration },

    #[error("Engine error: {message}")]
    Engine {
        message: String,
        code: Option<i64>,
    },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn port_conflict(message: impl Into<String>) -> Self {
        Self::PortConflict {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>, code: Option<i64>) -> Self {
        Self::Engine {
            message: message.into(),
            code,
        }
    }

    pub fn timed_out(method: impl Into<String>, timeout: Duration) -> Self {
        Self::RequestTimedOut {
            method: method.into(),
            timeout,
        }
    }

    /// A timeout is worth retrying; an explicit engine error usually is not.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::RequestTimedOut { .. })
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RequestTimedOut { .. }
                | Error::Engine { .. }
                | Error::ChannelSend { .. }
                | Error::DaemonNotStarted
                | Error::DaemonBootstrapping { .. }
                | Error::ChannelNotConnected
        )
    }

    /// Check if this error should trigger application exit
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ExecutableMissing { .. }
                | Error::ExecutionDenied { .. }
                | Error::ProcessSpawn { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::engine("identity not loaded", Some(-32000));
        assert_eq!(err.to_string(), "Engine error: identity not loaded");

        let err = Error::ExecutableMissing {
            path: PathBuf::from("/opt/tor/tor"),
        };
        assert!(err.to_string().contains("/opt/tor/tor"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_timeout_distinguishable_from_engine_error() {
        let timeout = Error::timed_out("send_message", Duration::from_secs(1));
        let engine = Error::engine("mailbox unreachable", None);

        assert!(timeout.is_timeout());
        assert!(!engine.is_timeout());
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::ExecutionDenied {
            path: PathBuf::from("/t")
        }
        .is_fatal());
        assert!(Error::spawn("fork failed").is_fatal());
        assert!(!Error::DaemonNotStarted.is_fatal());
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::timed_out("x", Duration::ZERO).is_recoverable());
        assert!(Error::DaemonBootstrapping { progress: 40 }.is_recoverable());
        assert!(!Error::ExecutableMissing {
            path: PathBuf::from("/t")
        }
        .is_recoverable());
    }

    #[test]
    fn test_gate_errors_name_the_reason() {
        assert!(Error::DaemonNotStarted.to_string().contains("not started"));
        assert!(Error::DaemonBootstrapping { progress: 85 }
            .to_string()
            .contains("85%"));
        assert!(Error::DaemonErrored {
            message: "port conflict".into()
        }
        .to_string()
        .contains("port conflict"));
    }

    #[test]
    fn test_immediate_exit_carries_output() {
        let err = Error::ImmediateExit {
            code: Some(13),
            output: "Permission denied".into(),
        };
        assert!(err.to_string().contains("13"));
        if let Error::ImmediateExit { output, .. } = err {
            assert_eq!(output, "Permission denied");
        }
    }
}
