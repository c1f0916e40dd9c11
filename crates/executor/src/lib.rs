mod collect;
mod config;
mod error;
mod executor;
mod install;
mod prepare;
mod process;
mod types;
mod workspace;

pub use config::ExecutorConfig;
pub use error::{ExecError, Result};
pub use executor::Executor;
pub use types::{ExecutionRequest, ExecutionResponse, FileArtifact, InputFile, Plot};
pub use workspace::Workspace;
