use std::time::Duration;

use tokio::process::Command;
use tracing::info;

use crate::error::{ExecError, Result};
use crate::process::ChildHandle;

/// Install the requested packages with pip, bounded by `timeout`.
///
/// Returns the combined stdout+stderr log on success. Fails with
/// `ExecError::Install` carrying the log when pip exits non-zero or the
/// deadline elapses. Runs through the same process-group handle as the
/// script itself, so a hung resolver (and anything it spawned) is torn
/// down as a tree on deadline.
pub(crate) async fn install_dependencies(
    python_bin: &str,
    packages: &[String],
    timeout: Duration,
) -> Result<String> {
    info!(count = packages.len(), "installing dependencies");

    let mut cmd = Command::new(python_bin);
    cmd.args(["-m", "pip", "install", "-q"]).args(packages);
    let outcome = ChildHandle::spawn(cmd)?.wait(timeout).await?;

    if outcome.timed_out {
        return Err(ExecError::Install {
            log: "Dependency installation timed out".into(),
        });
    }

    let mut log = String::from_utf8_lossy(&outcome.stdout).into_owned();
    log.push_str(&String::from_utf8_lossy(&outcome.stderr));

    if !outcome.exit.is_some_and(|status| status.success()) {
        return Err(ExecError::Install { log });
    }
    info!(log_len = log.len(), "dependencies installed");
    Ok(log)
}
