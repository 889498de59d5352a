//! `steamdl` binary - configuration, logging and the HTTP server.

use std::path::Path;

use clap::Parser;
use steamdl_axum::{ServerArgs, ServerConfig, start_server};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Stdout plus a daily rolling file in `log_dir`.
///
/// `RUST_LOG` takes priority over `default_level`. The returned guard must
/// live until exit so buffered file output is flushed.
fn init_tracing(log_dir: &Path, default_level: &str) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, "steamdl.log");
            Some(tracing_appender::non_blocking(appender))
        }
        Err(e) => {
            eprintln!("Failed to create log directory {}: {}", log_dir.display(), e);
            None
        }
    };
    let (writer, guard) = file.unzip();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .compact(),
        )
        .with(writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false) // No ANSI colors in files
                .compact()
        }))
        .try_init()
        .ok();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads the environment
    dotenvy::dotenv().ok();

    let args = ServerArgs::parse();
    let _guard = init_tracing(&args.log_dir, &args.log_level);

    let config = ServerConfig::from_args(&args)?;
    start_server(config).await
}
