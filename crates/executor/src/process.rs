use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::ExecutorConfig;
use crate::error::Result;
use crate::workspace::Workspace;

/// Filename of the prepared source inside the workspace root. The artifact
/// collector excludes it from the returned files.
pub(crate) const SCRIPT_NAME: &str = "script.py";

/// Grace period between SIGTERM and SIGKILL on deadline.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Cap on waiting for the output pipes to close after the group is killed.
/// Only reachable when a descendant escaped the process group entirely
/// (e.g. via setsid); the buffered output is kept either way.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

pub(crate) struct RunOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: Option<ExitStatus>,
    pub timed_out: bool,
}

/// A spawned child plus reader tasks draining its output pipes.
///
/// The child is made the leader of a fresh process group so that
/// termination reaches its whole tree: a grandchild inherits the output
/// pipes, and one that survived a kill of the direct child alone would
/// both outlive the deadline and hold the pipe reads open indefinitely.
pub(crate) struct ChildHandle {
    child: Child,
    /// Group leader pid, captured at spawn (`Child::id` is gone once the
    /// child has been reaped).
    pgid: Option<i32>,
    stdout: Drain,
    stderr: Drain,
}

impl ChildHandle {
    pub fn spawn(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;
        let pgid = child.id().map(|pid| pid as i32);
        let stdout = Drain::new(child.stdout.take());
        let stderr = Drain::new(child.stderr.take());
        Ok(Self {
            child,
            pgid,
            stdout,
            stderr,
        })
    }

    /// Wait for exit, up to `deadline`. On deadline the process group is
    /// terminated (SIGTERM, then SIGKILL after a short grace period) and
    /// the outcome is marked `timed_out`, keeping the partial output
    /// captured so far. The group is killed on every path before the
    /// drains are collected, so backgrounded descendants can neither
    /// outlive the request nor hold it open past the deadline.
    pub async fn wait(mut self, deadline: Duration) -> Result<RunOutcome> {
        let (exit, timed_out) = match tokio::time::timeout(deadline, self.child.wait()).await {
            Ok(status) => (Some(status?), false),
            Err(_) => {
                self.signal_group(Signal::SIGTERM);
                let exit = match tokio::time::timeout(KILL_GRACE, self.child.wait()).await {
                    Ok(status) => status.ok(),
                    Err(_) => None,
                };
                (exit, true)
            }
        };

        // Reap whatever is left of the group, whether the run finished or
        // timed out. This closes the inherited pipe write ends, so the
        // drains below complete promptly.
        self.signal_group(Signal::SIGKILL);
        if exit.is_none() {
            let _ = tokio::time::timeout(KILL_GRACE, self.child.wait()).await;
        }

        let stdout = self.stdout.into_bytes().await;
        let stderr = self.stderr.into_bytes().await;

        Ok(RunOutcome {
            stdout,
            stderr,
            exit,
            timed_out,
        })
    }

    /// Signal the whole process group (negative pid). ESRCH just means
    /// every member is already gone.
    fn signal_group(&self, sig: Signal) {
        if let Some(pgid) = self.pgid
            && let Err(e) = signal::kill(Pid::from_raw(-pgid), sig)
            && e != Errno::ESRCH
        {
            warn!(pgid, signal = %sig, error = %e, "failed to signal process group");
        }
    }
}

/// Background reader appending one output pipe into a shared buffer, so
/// whatever arrived before a kill is recoverable even if the reader has
/// to be abandoned.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Drain {
    fn new(stream: Option<impl AsyncRead + Unpin + Send + 'static>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task_buf = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let Some(mut stream) = stream else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let (Ok(mut buf), Some(data)) = (task_buf.lock(), chunk.get(..n)) {
                            buf.extend_from_slice(data);
                        }
                    }
                }
            }
        });
        Self { buf, task }
    }

    /// Take the captured bytes, waiting briefly for the pipe to close and
    /// abandoning the reader if something still holds the write end.
    async fn into_bytes(self) -> Vec<u8> {
        let abort = self.task.abort_handle();
        if tokio::time::timeout(DRAIN_GRACE, self.task).await.is_err() {
            abort.abort();
        }
        self.buf
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Write the prepared source into the workspace and run it with the
/// configured interpreter, cwd pinned to the workspace root.
pub(crate) async fn run_script(
    config: &ExecutorConfig,
    workspace: &Workspace,
    prepared: &str,
    deadline: Duration,
) -> Result<RunOutcome> {
    let script_path = workspace.root().join(SCRIPT_NAME);
    tokio::fs::write(&script_path, prepared).await?;

    let mut cmd = Command::new(&config.python_bin);
    cmd.arg(&script_path).current_dir(workspace.root());
    ChildHandle::spawn(cmd)?.wait(deadline).await
}

/// Lossily decode captured bytes and cap at `max_bytes`, cutting on a char
/// boundary. Applied to the captured buffer, not the live stream.
pub(crate) fn truncate_utf8(bytes: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max_bytes {
        return text.into_owned();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn captures_both_streams_and_exit_status() {
        let handle = ChildHandle::spawn(shell("echo out; echo err >&2; exit 3")).unwrap();
        let outcome = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.stdout, b"out\n");
        assert_eq!(outcome.stderr, b"err\n");
        assert_eq!(outcome.exit.and_then(|s| s.code()), Some(3));
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn deadline_kills_and_keeps_partial_output() {
        let handle = ChildHandle::spawn(shell("echo early; sleep 30")).unwrap();
        let start = Instant::now();
        let outcome = handle.wait(Duration::from_millis(200)).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.stdout, b"early\n");
        // SIGTERM stops a sleeping shell well inside the grace period.
        assert!(start.elapsed() < KILL_GRACE + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn sigkill_escalation_stops_a_term_ignoring_child() {
        // The shell shrugs off the group SIGTERM (its short-lived sleep
        // children do not, so the loop respawns them) and only dies to the
        // escalated SIGKILL.
        let handle =
            ChildHandle::spawn(shell("trap '' TERM; while true; do sleep 1; done")).unwrap();
        let outcome = handle.wait(Duration::from_millis(200)).await.unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.exit.is_none());
    }

    #[tokio::test]
    async fn backgrounded_grandchild_does_not_block_the_wait() {
        // The background sleep inherits the output pipes; without the
        // group kill the drain would stay open for its full 8 seconds.
        let handle = ChildHandle::spawn(shell("sleep 8 & echo quick")).unwrap();
        let start = Instant::now();
        let outcome = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout, b"quick\n");
        assert!(start.elapsed() < Duration::from_secs(4), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn timeout_kills_backgrounded_grandchildren_too() {
        let handle = ChildHandle::spawn(shell("sleep 30 & echo going; sleep 30")).unwrap();
        let start = Instant::now();
        let outcome = handle.wait(Duration::from_millis(200)).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.stdout, b"going\n");
        assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
    }

    #[test]
    fn truncate_leaves_short_output_alone() {
        assert_eq!(truncate_utf8(b"hello\n", 100), "hello\n");
    }

    #[test]
    fn truncate_caps_long_output() {
        let big = vec![b'x'; 1000];
        assert_eq!(truncate_utf8(&big, 100).len(), 100);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // "é" is two bytes; a cap in the middle must not split it.
        let text = "aé".as_bytes();
        let cut = truncate_utf8(text, 2);
        assert_eq!(cut, "a");
    }
}
