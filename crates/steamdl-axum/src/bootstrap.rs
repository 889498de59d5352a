//! Axum server bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together.
//! All concrete port implementations are instantiated here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use steamdl_core::config::{
    DEFAULT_CANCEL_GRACE, DEFAULT_JOB_TIMEOUT, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
    DEFAULT_MAX_HISTORY, DEFAULT_MAX_LOG_LINES,
};
use steamdl_core::{JobStateRepositoryPort, NoopJobStateRepository, OrchestratorConfig};
use steamdl_download::{Scheduler, SchedulerDeps, StatusReporter};
use steamdl_runtime::{
    JsonStateFileRepository, STEAMCMD_ARCHIVE_URL, SteamCmd, SysinfoProbe, ensure_installed,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::routes::create_router;

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsConfig {
    /// Allow all origins.
    #[default]
    AllowAll,
    /// Allow specific origins.
    AllowOrigins(Vec<String>),
}

/// Command-line and environment settings for the `steamdl` binary.
///
/// Every flag falls back to an environment variable; `.env` is loaded
/// before parsing.
#[derive(Debug, Clone, Parser)]
#[command(name = "steamdl", version, about = "Steam download orchestrator")]
pub struct ServerArgs {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 7860)]
    pub port: u16,

    /// Root directory for job workspaces.
    #[arg(long, env = "STEAM_DOWNLOAD_PATH", default_value = "downloads")]
    pub download_path: PathBuf,

    /// Directory holding (or receiving) steamcmd.
    #[arg(long, env = "STEAMCMD_DIR", default_value = "steamcmd")]
    pub steamcmd_dir: PathBuf,

    /// Directory for the daily rolling log file.
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "MAX_CONCURRENT_DOWNLOADS", default_value_t = DEFAULT_MAX_CONCURRENT_DOWNLOADS)]
    pub max_concurrent_downloads: usize,

    /// Per-job timeout in seconds; 0 disables it.
    #[arg(long, env = "DOWNLOAD_TIMEOUT", default_value_t = DEFAULT_JOB_TIMEOUT.as_secs())]
    pub download_timeout: u64,

    /// Seconds between SIGTERM and SIGKILL when stopping a job.
    #[arg(long, env = "CANCEL_GRACE_SECS", default_value_t = DEFAULT_CANCEL_GRACE.as_secs())]
    pub cancel_grace_secs: u64,

    /// Finished jobs kept in memory.
    #[arg(long, env = "MAX_HISTORY_SIZE", default_value_t = DEFAULT_MAX_HISTORY)]
    pub max_history: usize,

    /// Log lines kept in memory per job.
    #[arg(long, env = "MAX_LOG_LINES", default_value_t = DEFAULT_MAX_LOG_LINES)]
    pub max_log_lines: usize,

    /// Keep job records in `<download_path>/<id>/job.json` across restarts.
    #[arg(long, env = "PERSIST_JOBS", default_value_t = false, action = ArgAction::Set)]
    pub persist_jobs: bool,

    /// Download steamcmd on startup when it is missing.
    #[arg(long, env = "STEAMCMD_AUTO_INSTALL", default_value_t = true, action = ArgAction::Set)]
    pub steamcmd_auto_install: bool,

    /// Comma-separated allowed origins; empty allows all.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub orchestrator: OrchestratorConfig,
    pub steamcmd_dir: PathBuf,
    pub steamcmd_auto_install: bool,
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Resolve and validate settings. Called once at startup.
    pub fn from_args(args: &ServerArgs) -> Result<Self> {
        let ip = args
            .host
            .parse()
            .with_context(|| format!("invalid HOST {:?}", args.host))?;

        let orchestrator = OrchestratorConfig {
            max_concurrent_downloads: args.max_concurrent_downloads,
            job_timeout: (args.download_timeout > 0)
                .then(|| Duration::from_secs(args.download_timeout)),
            cancel_grace_period: Duration::from_secs(args.cancel_grace_secs),
            max_log_lines: args.max_log_lines,
            max_history: args.max_history,
            persist_jobs: args.persist_jobs,
            ..OrchestratorConfig::with_storage_root(&args.download_path)
        };
        orchestrator
            .validate()
            .context("invalid orchestrator configuration")?;

        let origins: Vec<String> = args
            .cors_origins
            .iter()
            .map(|o| o.trim().to_owned())
            .filter(|o| !o.is_empty())
            .collect();
        let cors = if origins.is_empty() {
            CorsConfig::AllowAll
        } else {
            CorsConfig::AllowOrigins(origins)
        };

        Ok(Self {
            addr: SocketAddr::new(ip, args.port),
            orchestrator,
            steamcmd_dir: args.steamcmd_dir.clone(),
            steamcmd_auto_install: args.steamcmd_auto_install,
            cors,
        })
    }
}

/// Application context for the Axum adapter.
pub struct AxumContext {
    pub scheduler: Scheduler,
    pub reporter: StatusReporter,
    /// Cancelled once jobs have been stopped; ends every SSE stream.
    pub shutdown: CancellationToken,
}

impl AxumContext {
    pub fn new(scheduler: Scheduler, reporter: StatusReporter) -> Self {
        Self {
            scheduler,
            reporter,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Wire steamcmd, persistence and the host probe into a running scheduler.
///
/// A failed steamcmd install is logged and startup continues; jobs then
/// fail with a spawn cause.
pub async fn bootstrap(config: &ServerConfig) -> Result<AxumContext> {
    info!(
        target: "steamdl.paths",
        storage_root = %config.orchestrator.storage_root.display(),
        steamcmd_dir = %config.steamcmd_dir.display(),
        "bootstrap resolved paths"
    );

    let steamcmd = SteamCmd::new(&config.steamcmd_dir);
    if config.steamcmd_auto_install {
        match ensure_installed(&steamcmd, STEAMCMD_ARCHIVE_URL).await {
            Ok(true) => info!(path = %steamcmd.executable().display(), "steamcmd installed"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "steamcmd install failed; downloads will fail until it is present"),
        }
    } else if !steamcmd.is_installed() {
        warn!(path = %steamcmd.executable().display(), "steamcmd not found and auto-install is disabled");
    }

    let repository: Arc<dyn JobStateRepositoryPort> = if config.orchestrator.persist_jobs {
        Arc::new(JsonStateFileRepository::new(&config.orchestrator.storage_root))
    } else {
        Arc::new(NoopJobStateRepository)
    };

    let scheduler = Scheduler::start(SchedulerDeps {
        config: config.orchestrator.clone(),
        planner: Arc::new(steamcmd),
        repository,
    })
    .await
    .context("failed to start scheduler")?;

    let reporter = StatusReporter::new(scheduler.clone(), Arc::new(SysinfoProbe::new()));

    Ok(AxumContext::new(scheduler, reporter))
}

/// Serve `ctx` on `listener` until `cancel` fires.
///
/// Shutdown stops every job first, then ends the SSE streams; open streams
/// would otherwise keep graceful shutdown waiting.
pub async fn serve(
    listener: TcpListener,
    ctx: AxumContext,
    cors: &CorsConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let scheduler = ctx.scheduler.clone();
    let streams = ctx.shutdown.clone();
    let app = create_router(ctx, cors);

    info!("steamdl listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("Stopping jobs before closing connections");
            scheduler.shutdown().await;
            streams.cancel();
        })
        .await
        .context("server error")?;

    info!("steamdl server shut down");
    Ok(())
}

/// Serve until Ctrl-C or SIGTERM, then stop every job.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let ctx = bootstrap(&config).await?;

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    serve(listener, ctx, &config.cors, cancel).await
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT (Ctrl-C), starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
