//! Engine process invocation and stdio plumbing
//!
//! Unlike the tor daemon, the engine speaks a protocol over stdin/stdout, so
//! the child keeps a piped stdin fed by a dedicated writer task. The `Child`
//! itself is moved into a `wait_for_exit` task so the real exit code is
//! captured and delivered as `ProcessEvent::Exited`.
//!
//! The engine must never touch the clearnet: every spawn pins
//! `MURMUR_SOCKS_PROXY` to the local daemon's SOCKS listener and sets
//! `MURMUR_ALLOW_CLEARNET=0`, whatever the inherited environment says.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};

use murmur_core::prelude::*;
use murmur_core::ProcessEvent;

/// Everything needed to invoke the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine executable (name resolved via PATH, or an absolute path).
    pub program: String,
    /// Extra arguments before the generated ones.
    pub args: Vec<String>,
    /// Private storage directory, passed as `--data-dir`.
    pub data_dir: PathBuf,
    /// Local SOCKS port the engine must route all traffic through.
    pub socks_port: u16,
}

/// Handle for a running engine process.
pub struct EngineProcess {
    pid: Option<u32>,
    /// Lines queued here are written to the child's stdin, one per line.
    stdin_tx: mpsc::UnboundedSender<String>,
    /// One-shot sender that tells the wait task to force-kill the process.
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
}

impl EngineProcess {
    /// Spawn the engine. Output lines and the final exit are sent to
    /// `event_tx`; immediate spawn failure surfaces as a typed error.
    pub fn spawn(config: &EngineConfig, event_tx: mpsc::Sender<ProcessEvent>) -> Result<Self> {
        let socks_proxy = format!("socks5h://127.0.0.1:{}", config.socks_port);
        info!(
            "Spawning engine: {} --data-dir {} (proxy {})",
            config.program,
            config.data_dir.display(),
            socks_proxy
        );

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .arg("--data-dir")
            .arg(&config.data_dir)
            .env("MURMUR_SOCKS_PROXY", &socks_proxy)
            .env("MURMUR_ALLOW_CLEARNET", "0")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ExecutableMissing {
                        path: PathBuf::from(&config.program),
                    }
                } else if e.kind() == std::io::ErrorKind::PermissionDenied {
                    Error::ExecutionDenied {
                        path: PathBuf::from(&config.program),
                    }
                } else {
                    Error::spawn(e.to_string())
                }
            })?;

        let pid = child.id();
        info!("Engine process started with PID: {:?}", pid);

        let stdin = child.stdin.take().expect("stdin was configured");
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(Self::stdin_writer(stdin, stdin_rx));

        let stdout = child.stdout.take().expect("stdout was configured");
        tokio::spawn(Self::stdout_reader(stdout, event_tx.clone()));

        let stderr = child.stderr.take().expect("stderr was configured");
        tokio::spawn(Self::stderr_reader(stderr, event_tx.clone()));

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            pid,
            stdin_tx,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    /// Sender for outgoing frames. Each queued string is written as one line.
    pub fn stdin_sender(&self) -> mpsc::UnboundedSender<String> {
        self.stdin_tx.clone()
    }

    /// Background task: owns the child's stdin, writes queued frames with a
    /// newline delimiter and flushes after each one.
    async fn stdin_writer(
        mut stdin: tokio::process::ChildStdin,
        mut rx: mpsc::UnboundedReceiver<String>,
    ) {
        while let Some(line) = rx.recv().await {
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                warn!("Engine stdin write failed: {}", e);
                break;
            }
            if let Err(e) = stdin.write_all(b"\n").await {
                warn!("Engine stdin write failed: {}", e);
                break;
            }
            if let Err(e) = stdin.flush().await {
                warn!("Engine stdin flush failed: {}", e);
                break;
            }
        }
        debug!("engine stdin writer finished");
    }

    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ProcessEvent>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Engine process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for engine process: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing engine process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill engine process: {}", e);
                }
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        let _ = event_tx.send(ProcessEvent::Exited { code }).await;
    }

    async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stdout).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("engine stdout: {}", line);
            if tx.send(ProcessEvent::Stdout(line)).await.is_err() {
                debug!("stdout channel closed");
                break;
            }
        }

        debug!("engine stdout reader finished");
    }

    async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("engine stderr: {}", line);
            if tx.send(ProcessEvent::Stderr(line)).await.is_err() {
                debug!("stderr channel closed");
                break;
            }
        }

        debug!("engine stderr reader finished");
    }

    /// Request graceful termination. SIGTERM on unix; elsewhere we go
    /// straight to the force-kill path.
    pub fn terminate(&mut self) {
        if self.has_exited() {
            return;
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => {
                    debug!("Sent SIGTERM to engine (pid {})", pid);
                    return;
                }
                Err(nix::errno::Errno::ESRCH) => return,
                Err(e) => warn!("SIGTERM failed for engine (pid {}): {}", pid, e),
            }
        }

        self.force_kill();
    }

    pub fn force_kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            warn!("Force killing engine process via kill channel");
            let _ = tx.send(());
        }
    }

    /// Wait up to `timeout` for the process to exit. Returns true if it did.
    ///
    /// Race-free: the `notified()` future is created before the final
    /// `has_exited()` check, so a notification between check and await
    /// cannot be missed.
    pub async fn wait_exited(&self, timeout: std::time::Duration) -> bool {
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return true;
        }
        tokio::time::timeout(timeout, notified).await.is_ok()
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("EngineProcess dropped while process may still be running");
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net.
    }
}
