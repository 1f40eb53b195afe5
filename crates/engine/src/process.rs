//! External process invocation for stream jobs.
//!
//! The stream worker talks to child processes only through the
//! [`ProcessLauncher`]/[`ProcessHandle`] seam, so tests can substitute
//! scripted or deliberately hanging processes. The default implementation
//! wraps `tokio::process` with `kill_on_drop(true)` so a dropped handle
//! never leaves an orphan behind.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};

/// Command-line description of one external operation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

/// Exclusive handle to one running external process.
///
/// Owned by a single stream worker for the job's lifetime; no other
/// component signals the process directly.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Next diagnostic line from the process, `Ok(None)` at end of stream.
    async fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Request graceful termination (SIGINT on Unix). The process may
    /// ignore it; callers follow up with [`kill`](Self::kill) after a
    /// grace period.
    fn terminate(&mut self);

    /// Force-kill the process.
    async fn kill(&mut self);

    /// Wait for the process to exit and return its exit code
    /// (-1 when terminated by a signal).
    async fn wait(&mut self) -> io::Result<i32>;
}

/// Launches external processes. The seam between the stream worker and
/// the host system.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ProcessHandle>>;
}

// ---------------------------------------------------------------------------
// Tokio implementation
// ---------------------------------------------------------------------------

/// Production launcher backed by `tokio::process::Command`.
///
/// Diagnostics are read from stderr, which is where ffmpeg-style tools
/// emit their progress stats; stdout is discarded (output goes to files
/// named in the process arguments).
pub struct TokioProcessLauncher;

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ProcessHandle>> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .map(|s| BufReader::new(s).lines());

        Ok(Box::new(TokioProcessHandle { child, stderr }))
    }
}

struct TokioProcessHandle {
    child: Child,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
}

#[async_trait]
impl ProcessHandle for TokioProcessHandle {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        match &mut self.stderr {
            Some(lines) => lines.next_line().await,
            None => Ok(None),
        }
    }

    fn terminate(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // Graceful interrupt; the grace-period/kill escalation lives
            // in the stream worker.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGINT);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(error = %e, "Failed to kill child process");
        }
    }

    async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }
}
