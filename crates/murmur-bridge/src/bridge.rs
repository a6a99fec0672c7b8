//! Correlated request/response bridge over the engine's stdio
//!
//! One dispatch task owns the engine's event stream: responses are matched to
//! pending requests by id, notifications fan out to subscribers, and process
//! death drains every in-flight request with a uniform failure.
//!
//! Every outgoing command passes the daemon gate first: unless the tor daemon
//! is `Connected`, the command is rejected before anything touches the wire,
//! so nothing the engine could send would leave the machine unprotected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use murmur_core::prelude::*;
use murmur_core::{DaemonState, ProcessEvent, StatusHandle};

use crate::commands::EngineCommand;
use crate::process::{EngineConfig, EngineProcess};
use crate::protocol::{Envelope, Notification, Request};
use crate::tracker::{EngineReply, RequestTracker};

/// How long `disconnect` waits for the engine to honor a shutdown request
/// before escalating to signals.
const SHUTDOWN_REQUEST_WAIT: Duration = Duration::from_secs(2);
/// How long to wait after SIGTERM before SIGKILL.
const GRACEFUL_EXIT_WAIT: Duration = Duration::from_secs(2);
/// How long to wait after SIGKILL for the exit to be reaped.
const FORCED_EXIT_WAIT: Duration = Duration::from_secs(1);

type Subscribers = Arc<StdMutex<Vec<mpsc::UnboundedSender<Notification>>>>;

struct Connected {
    process: EngineProcess,
    stdin: mpsc::UnboundedSender<String>,
    dispatch: JoinHandle<()>,
}

/// Control channel to the engine, gated on daemon state.
pub struct ControlBridge {
    daemon_status: StatusHandle,
    tracker: Arc<RequestTracker>,
    state: Mutex<Option<Connected>>,
    subscribers: Subscribers,
    /// Fast-path flag: set on connect, cleared by disconnect and by the
    /// dispatch task when the engine exits on its own.
    connected: Arc<AtomicBool>,
}

impl ControlBridge {
    pub fn new(daemon_status: StatusHandle) -> Self {
        Self {
            daemon_status,
            tracker: Arc::new(RequestTracker::new()),
            state: Mutex::new(None),
            subscribers: Arc::new(StdMutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub async fn pending_requests(&self) -> usize {
        self.tracker.pending_count().await
    }

    /// Spawn the engine and start dispatching its output. No-op if a live
    /// engine is already connected.
    pub async fn connect(&self, config: &EngineConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(connected) = state.as_ref() {
            if connected.process.is_running() {
                debug!("Engine already connected, ignoring connect request");
                return Ok(());
            }
            // Stale handle from a dead engine; replace it.
            state.take();
        }

        let (event_tx, event_rx) = mpsc::channel::<ProcessEvent>(256);
        let process = EngineProcess::spawn(config, event_tx)?;
        let stdin = process.stdin_sender();

        let dispatch = tokio::spawn(Self::dispatch(
            event_rx,
            Arc::clone(&self.tracker),
            Arc::clone(&self.subscribers),
            Arc::clone(&self.connected),
        ));

        *state = Some(Connected {
            process,
            stdin,
            dispatch,
        });
        self.connected.store(true, Ordering::Release);
        info!("Engine control channel connected");
        Ok(())
    }

    /// Dispatch loop: one consumer of the engine's event stream.
    async fn dispatch(
        mut events: mpsc::Receiver<ProcessEvent>,
        tracker: Arc<RequestTracker>,
        subscribers: Subscribers,
        connected: Arc<AtomicBool>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Stdout(line) => match Envelope::parse(&line) {
                    Some(Envelope::Response { id, result, error }) => {
                        let reply = match error {
                            Some(err) => EngineReply::Fault {
                                message: err.message,
                                code: err.code,
                            },
                            None => EngineReply::Result(result.unwrap_or(Value::Null)),
                        };
                        if !tracker.resolve(id, reply).await {
                            warn!("Dropping stale response for request id {}", id);
                        }
                    }
                    Some(Envelope::Notification(notification)) => {
                        Self::fan_out(&subscribers, notification);
                    }
                    None => {
                        warn!("Skipping malformed engine output: {}", line);
                    }
                },
                ProcessEvent::Stderr(line) => {
                    // Diagnostics only, never parsed as protocol data.
                    debug!("engine stderr: {}", line);
                }
                ProcessEvent::Exited { code } => {
                    warn!("Engine process exited (code {:?}), draining in-flight requests", code);
                    connected.store(false, Ordering::Release);
                    tracker.fail_all().await;
                    break;
                }
            }
        }

        // Stream can close without an Exited event if the readers die first.
        connected.store(false, Ordering::Release);
        tracker.fail_all().await;
        debug!("engine dispatch task finished");
    }

    /// Deliver a notification to every live subscriber, pruning closed ones.
    fn fan_out(subscribers: &Subscribers, notification: Notification) {
        let mut subs = subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    /// Subscribe to engine notifications. Events arrive in the order the
    /// engine emitted them.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Reject a command unless the tor daemon is fully connected.
    fn check_gate(&self) -> Result<()> {
        let status = self.daemon_status.snapshot();
        match status.state {
            DaemonState::Connected => Ok(()),
            DaemonState::Stopped => Err(Error::DaemonNotStarted),
            DaemonState::Starting | DaemonState::Connecting => Err(Error::DaemonBootstrapping {
                progress: status.bootstrap_progress,
            }),
            DaemonState::Error => Err(Error::DaemonErrored {
                message: status
                    .error
                    .map(|record| record.message)
                    .unwrap_or_else(|| "unknown daemon failure".into()),
            }),
        }
    }

    /// Send a command and await its response.
    ///
    /// The gate and connection checks run before a request id is registered,
    /// so a rejected command leaves no pending entry behind.
    pub async fn send(&self, command: &EngineCommand, timeout: Duration) -> Result<Value> {
        self.check_gate()?;
        if !self.is_connected() {
            return Err(Error::ChannelNotConnected);
        }

        let stdin = {
            let state = self.state.lock().await;
            match state.as_ref() {
                Some(connected) if connected.process.is_running() => connected.stdin.clone(),
                _ => return Err(Error::ChannelNotConnected),
            }
        };

        let (id, rx) = self.tracker.register().await;
        let line = Request::new(id, command.method(), command.params()).to_line();
        debug!("-> engine [{}] {}", id, command.description());

        if stdin.send(line).is_err() {
            self.tracker.remove(id).await;
            return Err(Error::channel_send("engine stdin channel closed"));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(EngineReply::Result(value))) => Ok(value),
            Ok(Ok(EngineReply::Fault { message, code })) => Err(Error::engine(message, code)),
            Ok(Ok(EngineReply::Terminated)) | Ok(Err(_)) => Err(Error::ProcessTerminated),
            Err(_) => {
                self.tracker.remove(id).await;
                warn!(
                    "Request '{}' (id {}) timed out after {:?}",
                    command.method(),
                    id,
                    timeout
                );
                Err(Error::timed_out(command.method(), timeout))
            }
        }
    }

    /// Stop the engine: polite shutdown request, then SIGTERM, then SIGKILL.
    /// Idempotent; all in-flight requests are drained before returning.
    pub async fn disconnect(&self) -> Result<()> {
        let connected = {
            let mut state = self.state.lock().await;
            match state.take() {
                Some(connected) => connected,
                None => return Ok(()),
            }
        };
        self.connected.store(false, Ordering::Release);

        // Best effort: the engine flushes state on a shutdown command. The
        // daemon gate is skipped here since the daemon may already be down.
        if connected.process.is_running() {
            let command = EngineCommand::Shutdown;
            let (id, rx) = self.tracker.register().await;
            let line = Request::new(id, command.method(), command.params()).to_line();
            if connected.stdin.send(line).is_ok() {
                match tokio::time::timeout(SHUTDOWN_REQUEST_WAIT, rx).await {
                    Ok(Ok(EngineReply::Result(_))) => {
                        debug!("Engine acknowledged shutdown request")
                    }
                    _ => {
                        self.tracker.remove(id).await;
                        debug!("Shutdown request not acknowledged");
                    }
                }
            } else {
                self.tracker.remove(id).await;
            }
        }

        let mut process = connected.process;
        if !process.wait_exited(Duration::from_millis(100)).await {
            process.terminate();
            if !process.wait_exited(GRACEFUL_EXIT_WAIT).await {
                warn!("Engine ignored SIGTERM, force killing");
                process.force_kill();
                process.wait_exited(FORCED_EXIT_WAIT).await;
            }
        }

        // The dispatch task drains the tracker when it sees Exited; give it
        // a moment, then make sure nothing is left hanging either way.
        if tokio::time::timeout(Duration::from_secs(2), connected.dispatch)
            .await
            .is_err()
        {
            warn!("Engine dispatch task did not finish in time");
        }
        self.tracker.fail_all().await;

        info!("Engine control channel disconnected");
        Ok(())
    }
}
