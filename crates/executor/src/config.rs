use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(30);
/// Fixed deadline for the pip install step (matching the service contract).
pub(crate) const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Per-stream cap on captured output (100 KiB).
pub(crate) const DEFAULT_MAX_OUTPUT_BYTES: usize = 100 * 1024;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base directory under which per-request workspaces are created.
    pub work_dir: PathBuf,
    /// Server-wide ceiling for per-request execution timeouts.
    pub max_timeout: Duration,
    /// Deadline for the optional dependency-install step.
    pub install_timeout: Duration,
    /// Cap on captured stdout/stderr, applied independently per stream.
    pub max_output_bytes: usize,
    /// Interpreter used for both pip and the prepared script.
    pub python_bin: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("code-executor"),
            max_timeout: DEFAULT_MAX_TIMEOUT,
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            python_bin: "python3".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Clamp a requested timeout to the server-wide ceiling. A missing or
    /// zero request value means "use the ceiling"; zero would otherwise be
    /// an instant deadline no run could meet.
    pub fn clamp_timeout(&self, requested: Option<u64>) -> Duration {
        match requested {
            Some(secs) if secs > 0 => Duration::from_secs(secs).min(self.max_timeout),
            _ => self.max_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_small_requests() {
        let config = ExecutorConfig::default();
        assert_eq!(config.clamp_timeout(Some(5)), Duration::from_secs(5));
    }

    #[test]
    fn clamp_caps_large_requests() {
        let config = ExecutorConfig::default();
        assert_eq!(config.clamp_timeout(Some(86_400)), DEFAULT_MAX_TIMEOUT);
    }

    #[test]
    fn zero_timeout_uses_ceiling() {
        let config = ExecutorConfig::default();
        assert_eq!(config.clamp_timeout(Some(0)), DEFAULT_MAX_TIMEOUT);
    }

    #[test]
    fn missing_timeout_uses_ceiling() {
        let config = ExecutorConfig::default();
        assert_eq!(config.clamp_timeout(None), DEFAULT_MAX_TIMEOUT);
    }
}
