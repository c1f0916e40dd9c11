#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("workspace error: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Failed to install dependencies: {log}")]
    Install { log: String },

    #[error("Execution timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("{message}")]
    Runtime { message: String },

    #[error("invalid input file: {message}")]
    InvalidInput { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_limit() {
        let e = ExecError::Timeout { secs: 1 };
        assert_eq!(e.to_string(), "Execution timed out after 1 seconds");
    }

    #[test]
    fn install_message_carries_the_log() {
        let e = ExecError::Install {
            log: "no matching distribution".into(),
        };
        assert!(e.to_string().contains("no matching distribution"));
    }
}
