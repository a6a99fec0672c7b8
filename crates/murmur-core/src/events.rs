//! Child process event definitions

/// Events emitted by a supervised child process's reader and wait tasks.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Raw stdout line
    Stdout(String),

    /// Stderr output (diagnostics only, never protocol-bearing)
    Stderr(String),

    /// The process has exited
    Exited { code: Option<i32> },
}
