//! Shared daemon lifecycle state
//!
//! The supervisor is the only writer; any number of observers read snapshots.
//! Held behind a std `RwLock` (no await points) so `snapshot()` is safe from
//! any thread, including ones driving UI redraws.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Daemon lifecycle phase.
///
/// Forward transitions only (`Stopped → Starting → Connecting → Connected`);
/// `Error` and `Stopped` are reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    Stopped,
    Starting,
    Connecting,
    Connected,
    Error,
}

impl DaemonState {
    /// The daemon process is expected to be alive in this state.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            DaemonState::Starting | DaemonState::Connecting | DaemonState::Connected
        )
    }
}

/// Captured failure details, set whenever the state becomes [`DaemonState::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub exit_code: Option<i32>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }
}

/// Point-in-time view of the daemon lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub state: DaemonState,
    /// Bootstrap percentage, meaningful while `Connecting`.
    pub bootstrap_progress: u8,
    pub error: Option<ErrorRecord>,
    pub is_running: bool,
}

#[derive(Debug)]
struct StatusInner {
    state: DaemonState,
    progress: u8,
    error: Option<ErrorRecord>,
}

/// Cloneable handle to the daemon status, constructed once per supervisor.
///
/// All mutators take `&self`; only the supervisor's own tasks call them.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusInner>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StatusInner {
                state: DaemonState::Stopped,
                progress: 0,
                error: None,
            })),
        }
    }

    /// Transition to `Starting`, clearing progress and any previous error
    /// record in the same write so observers never see a mix of fresh state
    /// and stale error text.
    pub fn begin_start(&self) {
        let mut inner = self.write();
        inner.state = DaemonState::Starting;
        inner.progress = 0;
        inner.error = None;
    }

    /// Transition from `Starting` to `Connecting` once the process survived
    /// the launch grace window.
    pub fn begin_connecting(&self) {
        let mut inner = self.write();
        if inner.state == DaemonState::Starting {
            inner.state = DaemonState::Connecting;
        }
    }

    /// Record a bootstrap percentage. Reaching 100 transitions to
    /// `Connected`; `Connected` is reachable from no other path.
    pub fn set_progress(&self, progress: u8) {
        let mut inner = self.write();
        if inner.state != DaemonState::Connecting {
            return;
        }
        inner.progress = progress.min(100);
        if inner.progress == 100 {
            inner.state = DaemonState::Connected;
        }
    }

    /// Force the `Error` state with a descriptive record. Valid from any
    /// state.
    pub fn record_error(&self, message: impl Into<String>, exit_code: Option<i32>) {
        let mut inner = self.write();
        inner.state = DaemonState::Error;
        inner.error = Some(ErrorRecord::new(message, exit_code));
    }

    /// Force the `Stopped` state. Valid from any state; keeps the last error
    /// record for inspection until the next `begin_start`.
    pub fn mark_stopped(&self) {
        let mut inner = self.write();
        inner.state = DaemonState::Stopped;
        inner.progress = 0;
    }

    /// Consistent snapshot of the current lifecycle. Never blocks on I/O.
    pub fn snapshot(&self) -> DaemonStatus {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        DaemonStatus {
            state: inner.state,
            bootstrap_progress: inner.progress,
            error: inner.error.clone(),
            is_running: inner.state.is_running(),
        }
    }

    pub fn state(&self) -> DaemonState {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).state
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StatusInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}
