//! Process supervisor for the Tor daemon
//!
//! Owns the single lifecycle truth other components depend on: the daemon is
//! deliverable only once the monitor has observed full bootstrap. `start` and
//! `stop` are idempotent; `stop` never hangs the caller -- every wait it
//! performs has a hard upper bound.

use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use murmur_core::prelude::*;
use murmur_core::{DaemonSettings, DaemonStatus, ProcessEvent, StatusHandle};

use crate::launcher::{ensure_executable, resolve_executable, TorLaunch, TorProcess};
use crate::monitor::run_monitor;
use crate::torrc::TorConfig;

/// Window in which an immediately-failing daemon is caught before we claim
/// it is connecting.
const LAUNCH_GRACE_WINDOW: Duration = Duration::from_millis(500);
/// Bounded wait for graceful exit after SIGTERM.
const GRACEFUL_EXIT_WAIT: Duration = Duration::from_secs(5);
/// Bounded wait for the force-killed process to be reaped.
const FORCED_EXIT_WAIT: Duration = Duration::from_secs(2);
/// Bounded wait for the monitor task to finish during stop.
const MONITOR_JOIN_WAIT: Duration = Duration::from_secs(2);
/// Reachability probe connect timeout.
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(3);

struct Running {
    process: TorProcess,
    monitor: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
}

/// Supervises the Tor daemon: launch, bootstrap monitoring, shutdown.
pub struct TorSupervisor {
    settings: DaemonSettings,
    /// Private storage root; torrc, tor data, and the scoped environment all
    /// live under here.
    root: PathBuf,
    status: StatusHandle,
    inner: Mutex<Option<Running>>,
}

impl TorSupervisor {
    pub fn new(root: impl Into<PathBuf>, settings: DaemonSettings) -> Self {
        Self {
            settings,
            root: root.into(),
            status: StatusHandle::new(),
            inner: Mutex::new(None),
        }
    }

    /// Shared status handle for observers (UI, bridge kill-switch gate).
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Snapshot of `{state, progress, error, is_running}`. Safe to call
    /// concurrently with `start`/`stop`; never blocks on I/O.
    pub fn status(&self) -> DaemonStatus {
        self.status.snapshot()
    }

    /// Launch the daemon and begin bootstrap monitoring.
    ///
    /// A no-op returning `Ok` when the daemon is already running. On any
    /// failure the shared status reflects the same error the caller gets.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(running) = inner.as_ref() {
            if running.process.is_running() {
                debug!("start() ignored: daemon already running");
                return Ok(());
            }
            // Previous process died; clean up before relaunching.
            inner.take();
        }

        self.status.begin_start();

        let launch = match self.prepare_launch() {
            Ok(launch) => launch,
            Err(e) => {
                self.status.record_error(e.to_string(), None);
                return Err(e);
            }
        };

        let (event_tx, mut event_rx) = mpsc::channel::<ProcessEvent>(256);
        let process = match TorProcess::spawn(&launch, event_tx) {
            Ok(process) => process,
            Err(e) => {
                self.status.record_error(e.to_string(), None);
                return Err(e);
            }
        };

        // Grace window: an immediate exit (bad permissions, broken binary,
        // unparsable config) must fail this call, not linger as a phantom
        // "connecting" daemon.
        let mut buffered = Vec::new();
        let deadline = tokio::time::Instant::now() + LAUNCH_GRACE_WINDOW;
        loop {
            match tokio::time::timeout_at(deadline, event_rx.recv()).await {
                Ok(Some(event)) => {
                    if let ProcessEvent::Exited { code } = &event {
                        let code = *code;
                        let output = collect_output(&buffered);
                        error!(
                            "Daemon exited within grace window: code {:?}, output: {}",
                            code, output
                        );
                        self.status
                            .record_error("tor exited during startup", code);
                        return Err(Error::ImmediateExit { code, output });
                    }
                    buffered.push(event);
                }
                Ok(None) => {
                    // All senders gone without an exit event; treat as an
                    // immediate failure.
                    let output = collect_output(&buffered);
                    self.status
                        .record_error("tor exited during startup", None);
                    return Err(Error::ImmediateExit { code: None, output });
                }
                Err(_) => break, // survived the window
            }
        }

        self.status.begin_connecting();

        let stopping = Arc::new(AtomicBool::new(false));
        let monitor = tokio::spawn(run_monitor(
            buffered,
            event_rx,
            self.status.clone(),
            Arc::clone(&stopping),
        ));

        *inner = Some(Running {
            process,
            monitor,
            stopping,
        });

        info!("Daemon launched, bootstrap monitoring active");
        Ok(())
    }

    /// Stop the daemon. Idempotent; bounded waits only.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let Some(mut running) = inner.take() else {
            debug!("stop() ignored: daemon not running");
            self.status.mark_stopped();
            return Ok(());
        };

        info!("Stopping daemon");
        running.stopping.store(true, Ordering::Release);

        running.process.terminate();
        if !running.process.wait_exited(GRACEFUL_EXIT_WAIT).await {
            warn!("Daemon did not exit gracefully, force killing");
            running.process.force_kill();
            if !running.process.wait_exited(FORCED_EXIT_WAIT).await {
                error!("Daemon still not reaped after force kill");
            }
        }

        // Join the monitor with a bound; a stuck monitor must not hang the
        // shutdown path.
        match tokio::time::timeout(MONITOR_JOIN_WAIT, &mut running.monitor).await {
            Ok(_) => debug!("Monitor task joined"),
            Err(_) => {
                warn!("Monitor join timed out, aborting task");
                running.monitor.abort();
            }
        }

        self.status.mark_stopped();
        info!("Daemon stopped");
        Ok(())
    }

    /// Point-in-time reachability probe of the SOCKS listener. Always a
    /// fresh connection attempt, never cached. May block up to the connect
    /// timeout, so it runs on the blocking pool.
    pub async fn is_reachable(&self) -> bool {
        let (ip, port) = self.settings.socks_addr();
        let addr = SocketAddr::new(ip, port);

        tokio::task::spawn_blocking(move || {
            TcpStream::connect_timeout(&addr, REACHABILITY_TIMEOUT).is_ok()
        })
        .await
        .unwrap_or(false)
    }

    /// Resolve and validate the executable, then materialize the torrc.
    fn prepare_launch(&self) -> Result<TorLaunch> {
        let executable = resolve_executable(self.settings.executable.as_deref())?;
        ensure_executable(&executable)?;

        let mut config = TorConfig::new(
            self.root.join("tor-data"),
            self.settings.socks_port,
            self.settings.control_port,
        );
        config.geoip_file = self.settings.geoip_file.clone();
        config.geoip6_file = self.settings.geoip6_file.clone();

        let torrc = config.write(&self.root)?;

        Ok(TorLaunch {
            executable,
            torrc,
            work_dir: self.root.clone(),
        })
    }
}

fn collect_output(events: &[ProcessEvent]) -> String {
    let mut lines = Vec::new();
    for event in events {
        match event {
            ProcessEvent::Stdout(line) | ProcessEvent::Stderr(line) => lines.push(line.as_str()),
            ProcessEvent::Exited { .. } => {}
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::DaemonState;

    #[tokio::test]
    async fn test_stop_when_not_running_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = TorSupervisor::new(tmp.path(), DaemonSettings::default());

        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.status().state, DaemonState::Stopped);
    }

    #[tokio::test]
    async fn test_start_missing_executable_sets_error_state() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = DaemonSettings {
            executable: Some(PathBuf::from("/nonexistent/tor")),
            ..DaemonSettings::default()
        };
        let supervisor = TorSupervisor::new(tmp.path(), settings);

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, Error::ExecutableMissing { .. }));

        let snap = supervisor.status();
        assert_eq!(snap.state, DaemonState::Error);
        assert!(snap.error.is_some());
    }

    #[tokio::test]
    async fn test_is_reachable_false_on_closed_port() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = DaemonSettings {
            // An unassigned loopback port; connect must be refused.
            socks_port: 1,
            ..DaemonSettings::default()
        };
        let supervisor = TorSupervisor::new(tmp.path(), settings);
        assert!(!supervisor.is_reachable().await);
    }

    #[tokio::test]
    async fn test_is_reachable_true_on_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let tmp = tempfile::tempdir().unwrap();
        let settings = DaemonSettings {
            socks_port: port,
            ..DaemonSettings::default()
        };
        let supervisor = TorSupervisor::new(tmp.path(), settings);
        assert!(supervisor.is_reachable().await);
    }

    #[test]
    fn test_collect_output_joins_both_streams() {
        let events = vec![
            ProcessEvent::Stdout("out".into()),
            ProcessEvent::Stderr("err".into()),
            ProcessEvent::Exited { code: Some(1) },
        ];
        assert_eq!(collect_output(&events), "out\nerr");
    }
}
