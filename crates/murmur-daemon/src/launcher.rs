//! Tor daemon invocation and process handle
//!
//! The `Child` handle is moved into a dedicated `wait_for_exit` background
//! task that calls `child.wait()`, so the real exit code is captured and
//! emitted as `ProcessEvent::Exited { code: Some(N) }` rather than `None`.
//!
//! `TorProcess` retains a kill channel for force-kill, an atomic flag for
//! synchronous `has_exited()` checks, and a [`Notify`] handle so shutdown
//! can await graceful exit without holding a lock across `.await`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};

use murmur_core::prelude::*;
use murmur_core::ProcessEvent;

/// Everything needed to invoke the daemon: executable, generated torrc, and
/// the private storage directory that scopes cwd and environment.
#[derive(Debug, Clone)]
pub struct TorLaunch {
    pub executable: PathBuf,
    pub torrc: PathBuf,
    pub work_dir: PathBuf,
}

/// Resolve the tor executable: explicit setting first, PATH second.
pub fn resolve_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => {
            if path.exists() {
                Ok(path.to_path_buf())
            } else {
                Err(Error::ExecutableMissing {
                    path: path.to_path_buf(),
                })
            }
        }
        None => which::which("tor").map_err(|_| Error::ExecutableMissing {
            path: PathBuf::from("tor"),
        }),
    }
}

/// Check the execute bit; attempt to grant it once before giving up.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|_| Error::ExecutableMissing {
        path: path.to_path_buf(),
    })?;

    let mut perms = metadata.permissions();
    if perms.mode() & 0o111 != 0 {
        return Ok(());
    }

    warn!(
        "Tor executable lacks execute permission, attempting repair: {}",
        path.display()
    );
    perms.set_mode(perms.mode() | 0o700);
    std::fs::set_permissions(path, perms).map_err(|_| Error::ExecutionDenied {
        path: path.to_path_buf(),
    })
}

#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Handle for a running Tor daemon process.
pub struct TorProcess {
    /// Process ID for logging and signalling
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

impl TorProcess {
    /// Spawn the daemon. Output lines and the final exit are sent to
    /// `event_tx`; immediate spawn failure surfaces as a typed error.
    pub fn spawn(launch: &TorLaunch, event_tx: mpsc::Sender<ProcessEvent>) -> Result<Self> {
        info!(
            "Spawning tor: {} -f {}",
            launch.executable.display(),
            launch.torrc.display()
        );

        let mut child = Command::new(&launch.executable)
            .arg("-f")
            .arg(&launch.torrc)
            .current_dir(&launch.work_dir)
            // Scope the environment to private storage: no stray state in
            // the real home, bundled libraries found next to the data.
            .env("HOME", &launch.work_dir)
            .env("LD_LIBRARY_PATH", &launch.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ExecutableMissing {
                        path: launch.executable.clone(),
                    }
                } else if e.kind() == std::io::ErrorKind::PermissionDenied {
                    Error::ExecutionDenied {
                        path: launch.executable.clone(),
                    }
                } else {
                    Error::spawn(e.to_string())
                }
            })?;

        let pid = child.id();
        info!("Tor process started with PID: {:?}", pid);

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
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    /// Background task: owns `child`, waits for it to exit, emits
    /// `ProcessEvent::Exited` with the real exit code.
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
                        info!("Tor process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for tor process: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing tor process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill tor process: {}", e);
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

        // Mark exited and wake waiters before sending the event so
        // `has_exited()` is already true when observers see it.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        let _ = event_tx.send(ProcessEvent::Exited { code }).await;
    }

    /// Read stdout lines into `ProcessEvent::Stdout`. Does NOT emit
    /// `Exited` -- that is the wait task's job.
    async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stdout).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("tor stdout: {}", line);
            if tx.send(ProcessEvent::Stdout(line)).await.is_err() {
                debug!("stdout channel closed");
                break;
            }
        }

        debug!("tor stdout reader finished");
    }

    async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("tor stderr: {}", line);
            if tx.send(ProcessEvent::Stderr(line)).await.is_err() {
                debug!("stderr channel closed");
                break;
            }
        }

        debug!("tor stderr reader finished");
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
                    debug!("Sent SIGTERM to tor (pid {})", pid);
                    return;
                }
                Err(nix::errno::Errno::ESRCH) => return,
                Err(e) => warn!("SIGTERM failed for tor (pid {}): {}", pid, e),
            }
        }

        self.force_kill();
    }

    /// Force kill by signalling the wait task, which calls `child.kill()`
    /// and then reaps the process.
    pub fn force_kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            warn!("Force killing tor process via kill channel");
            // The wait task may have already exited naturally.
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

    /// Non-blocking, synchronous exit check backed by the wait task's flag.
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

impl Drop for TorProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("TorProcess dropped while process may still be running");
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_explicit_missing() {
        let result = resolve_executable(Some(Path::new("/nonexistent/tor")));
        assert!(matches!(result, Err(Error::ExecutableMissing { .. })));
    }

    #[test]
    fn test_resolve_explicit_present() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tor");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();

        let resolved = resolve_executable(Some(&path)).unwrap();
        assert_eq!(resolved, path);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_executable_repairs_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tor");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        ensure_executable(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_ne!(mode & 0o100, 0, "execute bit should have been granted");
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_executable_missing_file() {
        let result = ensure_executable(Path::new("/nonexistent/tor"));
        assert!(matches!(result, Err(Error::ExecutableMissing { .. })));
    }

    /// Spawn a short-lived shell stand-in through the real machinery.
    fn sh_launch(dir: &Path, script: &str) -> TorLaunch {
        // `-f <torrc>` is ignored by sh -c via the script file trick: we
        // write the script as the "executable".
        let exe = dir.join("fake-tor");
        std::fs::write(&exe, format!("#!/bin/sh\n{}\n", script)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let torrc = dir.join("torrc");
        std::fs::write(&torrc, "").unwrap();
        TorLaunch {
            executable: exe,
            torrc,
            work_dir: dir.to_path_buf(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_captured() {
        let tmp = tempfile::tempdir().unwrap();
        let launch = sh_launch(tmp.path(), "exit 42");
        let (tx, mut rx) = mpsc::channel(16);

        let _process = TorProcess::spawn(&launch, tx).unwrap();

        let mut code = None;
        while let Some(event) = rx.recv().await {
            if let ProcessEvent::Exited { code: c } = event {
                code = c;
                break;
            }
        }
        assert_eq!(code, Some(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_lines_delivered_before_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let launch = sh_launch(tmp.path(), "echo one; echo two");
        let (tx, mut rx) = mpsc::channel(16);

        let _process = TorProcess::spawn(&launch, tx).unwrap();

        let mut lines = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                ProcessEvent::Stdout(line) => lines.push(line),
                ProcessEvent::Exited { .. } => break,
                ProcessEvent::Stderr(_) => {}
            }
        }
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_ends_long_running_process() {
        let tmp = tempfile::tempdir().unwrap();
        let launch = sh_launch(tmp.path(), "sleep 60");
        let (tx, mut rx) = mpsc::channel(16);

        let mut process = TorProcess::spawn(&launch, tx).unwrap();
        assert!(process.is_running());

        process.terminate();
        assert!(
            process.wait_exited(std::time::Duration::from_secs(5)).await,
            "process should exit after SIGTERM"
        );
        assert!(process.has_exited());

        // Exited event still arrives through the channel.
        let mut saw_exit = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv()).await
        {
            if matches!(event, ProcessEvent::Exited { .. }) {
                saw_exit = true;
                break;
            }
        }
        assert!(saw_exit);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_force_kill_path() {
        let tmp = tempfile::tempdir().unwrap();
        // Trap TERM so only SIGKILL can end it.
        let launch = sh_launch(tmp.path(), "trap '' TERM; sleep 60");
        let (tx, _rx) = mpsc::channel(16);

        let mut process = TorProcess::spawn(&launch, tx).unwrap();
        process.force_kill();
        assert!(process.wait_exited(std::time::Duration::from_secs(5)).await);
    }
}
