mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use executor::{Executor, ExecutorConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "code-executor", version, about = "HTTP service that runs untrusted Python snippets in isolated child processes")]
struct Cli {
    /// Address to bind the HTTP server on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8001")]
    bind: SocketAddr,

    /// Base directory for per-request workspaces
    #[arg(long, env = "WORK_DIR", default_value = "/tmp/code-executor")]
    work_dir: PathBuf,

    /// Server-wide ceiling for per-request execution timeouts, in seconds
    #[arg(long, env = "EXECUTION_TIMEOUT", default_value_t = 30)]
    max_timeout: u64,

    /// Python interpreter used for installs and execution
    #[arg(long, env = "PYTHON_BIN", default_value = "python3")]
    python_bin: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> std::io::Result<()> {
    let config = ExecutorConfig {
        work_dir: cli.work_dir,
        max_timeout: Duration::from_secs(cli.max_timeout),
        python_bin: cli.python_bin,
        ..ExecutorConfig::default()
    };
    tokio::fs::create_dir_all(&config.work_dir).await?;
    info!(
        work_dir = %config.work_dir.display(),
        max_timeout_secs = config.max_timeout.as_secs(),
        python = %config.python_bin,
        "starting code executor"
    );

    let app = routes::router(Arc::new(Executor::new(config)));
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(addr = %cli.bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install ctrl-c handler");
    }
}
