//! Bootstrap monitor
//!
//! Consumes the daemon's combined output stream and drives the shared state
//! machine: progress markers advance `Connecting` toward `Connected`, fatal
//! patterns force `Error`, and stream closure while the daemon is still
//! expected to run is itself an error -- closure is never treated as a clean
//! stop unless `stop()` was invoked first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use murmur_core::prelude::*;
use murmur_core::{classify_line, BootstrapSignal, ProcessEvent, StatusHandle};

/// Consume daemon output until the stream closes or a stop is requested.
///
/// `buffered` holds events drained during the supervisor's launch grace
/// window; they are classified first so no early progress marker is lost.
pub async fn run_monitor(
    buffered: Vec<ProcessEvent>,
    mut events: mpsc::Receiver<ProcessEvent>,
    status: StatusHandle,
    stopping: Arc<AtomicBool>,
) {
    debug!("Bootstrap monitor started");

    for event in buffered {
        if handle_event(event, &status, &stopping) {
            return;
        }
    }

    while let Some(event) = events.recv().await {
        if handle_event(event, &status, &stopping) {
            return;
        }
    }

    // Reader tasks dropped their senders without an Exited event. If we are
    // not stopping, the daemon is gone without a trace.
    if !stopping.load(Ordering::Acquire) {
        warn!("Daemon output stream closed without exit notification");
        status.record_error("tor process terminated unexpectedly", None);
    }
    debug!("Bootstrap monitor finished");
}

/// Apply one event to the state machine. Returns true when monitoring is
/// complete (the process is gone).
fn handle_event(event: ProcessEvent, status: &StatusHandle, stopping: &AtomicBool) -> bool {
    match event {
        ProcessEvent::Stdout(line) => {
            match classify_line(&line) {
                BootstrapSignal::Progress(pct) => {
                    debug!("Bootstrap progress: {}%", pct);
                    status.set_progress(pct);
                }
                BootstrapSignal::Fatal(message) => {
                    error!("Fatal daemon output: {}", line);
                    status.record_error(message, None);
                }
                BootstrapSignal::Noise => trace!("tor: {}", line),
            }
            false
        }
        ProcessEvent::Stderr(line) => {
            // Diagnostics only; progress never arrives here.
            debug!("tor stderr: {}", line);
            false
        }
        ProcessEvent::Exited { code } => {
            if stopping.load(Ordering::Acquire) {
                debug!("Daemon exited during requested stop (code {:?})", code);
            } else {
                error!("Daemon exited unexpectedly with code {:?}", code);
                status.record_error("tor process terminated unexpectedly", code);
            }
            true
        }
    }
}
