use std::time::Instant;

use tracing::{error, info};

use crate::collect::{collect_artifacts, strip_plot_markers};
use crate::config::ExecutorConfig;
use crate::error::ExecError;
use crate::install::install_dependencies;
use crate::prepare;
use crate::process::{run_script, truncate_utf8};
use crate::types::{ExecutionRequest, ExecutionResponse};
use crate::workspace::Workspace;

/// Sequences one request through the pipeline: workspace creation, input
/// staging, optional dependency install, code preparation, bounded
/// execution, artifact collection, and unconditional workspace teardown.
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one request end to end. Infallible at this boundary: every fault
    /// folds into a well-formed response with `success == false`.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResponse {
        let start = Instant::now();
        info!(
            code_len = request.code.len(),
            deps = request.dependencies.len(),
            input_files = request.input_files.len(),
            "executing code"
        );

        let workspace = match Workspace::create(&self.config.work_dir).await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(error = %e, "workspace creation failed");
                let mut response = ExecutionResponse::failed(e.to_string());
                response.execution_time_seconds = start.elapsed().as_secs_f64();
                return response;
            }
        };

        // Every early return after this point happens inside execute_inner,
        // so the workspace is destroyed on all paths, timeouts included.
        let exec_id = workspace.id();
        let mut response = self.execute_inner(&workspace, request).await;
        workspace.destroy().await;

        response.execution_time_seconds = start.elapsed().as_secs_f64();
        info!(
            exec_id = %exec_id,
            success = response.success,
            plots = response.plots.len(),
            files = response.files.len(),
            "execution finished"
        );
        response
    }

    async fn execute_inner(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> ExecutionResponse {
        if let Err(e) = workspace.stage_files(&request.input_files).await {
            return ExecutionResponse::failed(e.to_string());
        }

        let mut install_log = None;
        if !request.dependencies.is_empty() {
            match install_dependencies(
                &self.config.python_bin,
                &request.dependencies,
                self.config.install_timeout,
            )
            .await
            {
                Ok(log) => install_log = Some(log),
                Err(e) => {
                    // Install failure short-circuits the pipeline: no run,
                    // no collection, empty stdout/stderr.
                    let log = match &e {
                        ExecError::Install { log } => log.clone(),
                        _ => String::new(),
                    };
                    let mut response = ExecutionResponse::failed(e.to_string());
                    response.install_log = Some(log);
                    return response;
                }
            }
        }

        let deadline = self.config.clamp_timeout(request.timeout_seconds);
        let prepared = prepare::wrap(&request.code, workspace);
        let outcome = match run_script(&self.config, workspace, &prepared, deadline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "failed to launch execution");
                let mut response = ExecutionResponse::failed(e.to_string());
                response.install_log = install_log;
                return response;
            }
        };

        let stdout = truncate_utf8(&outcome.stdout, self.config.max_output_bytes);
        let stderr = truncate_utf8(&outcome.stderr, self.config.max_output_bytes);

        let error = if outcome.timed_out {
            Some(
                ExecError::Timeout {
                    secs: deadline.as_secs(),
                }
                .to_string(),
            )
        } else {
            match outcome.exit {
                Some(status) if !status.success() => Some(
                    ExecError::Runtime {
                        message: stderr_summary(&stderr),
                    }
                    .to_string(),
                ),
                _ => None,
            }
        };

        // Collection runs even after a timeout: the child may have produced
        // artifacts before it was killed.
        let (plots, files) = collect_artifacts(workspace).await;

        ExecutionResponse {
            success: error.is_none(),
            stdout: strip_plot_markers(&stdout),
            stderr,
            error,
            plots,
            files,
            execution_time_seconds: 0.0,
            install_log,
        }
    }
}

/// Best-effort one-line diagnostic from captured stderr.
///
/// Python tracebacks end with an `ExceptionType: message` line, so when an
/// "Error:" marker is present the last non-empty line is the summary.
/// Otherwise the whole (trimmed) stderr is reported, with a generic
/// fallback for silent failures.
fn stderr_summary(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "Execution failed with non-zero exit code".to_string();
    }
    if trimmed.contains("Error:") {
        if let Some(line) = trimmed.lines().rev().find(|l| !l.trim().is_empty()) {
            return line.trim().to_string();
        }
    }
    trimmed.to_string()
}
