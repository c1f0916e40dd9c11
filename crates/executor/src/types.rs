use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub code: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub input_files: Vec<InputFile>,
}

/// A caller-supplied file staged into the workspace before execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    pub filename: String,
    /// Base64-encoded content.
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub plots: Vec<Plot>,
    pub files: Vec<FileArtifact>,
    pub execution_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_log: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Plot {
    pub format: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct FileArtifact {
    pub filename: String,
    /// Base64-encoded content.
    pub data: String,
    /// Decoded byte length.
    pub size: usize,
}

impl ExecutionResponse {
    /// A response for a request that failed before producing any output.
    pub(crate) fn failed(error: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
            plots: Vec::new(),
            files: Vec::new(),
            execution_time_seconds: 0.0,
            install_log: None,
        }
    }
}
