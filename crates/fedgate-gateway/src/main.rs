//! fedgate gateway binary.
//!
//! - Admission endpoint: POST /v1/admit
//! - Ops endpoints: /healthz, /readyz, /metrics
//! - Ctrl-C starts draining (readyz turns 503) and shuts down gracefully
//! - Queued rejection records are flushed to the sink before exit

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use fedgate_core::error::{FedgateError, Result};
use fedgate_core::Environment;
use fedgate_gateway::{app_state::AppState, config, router};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnvArg {
    Production,
    Development,
}

impl From<EnvArg> for Environment {
    fn from(v: EnvArg) -> Self {
        match v {
            EnvArg::Production => Environment::Production,
            EnvArg::Development => Environment::Development,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "fedgate-gateway", version, about = "GraphQL admission-control gateway")]
struct Args {
    /// Gateway YAML config.
    #[arg(long, default_value = "fedgate.yaml")]
    config: PathBuf,

    /// Overrides `admission.environment`.
    #[arg(long, value_enum)]
    environment: Option<EnvArg>,

    /// Used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.client_code().as_str(), error = %e, "fedgate-gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut cfg = config::load_from_file(&args.config)?;
    if let Some(env) = args.environment {
        cfg.admission.environment = env.into();
    }
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| FedgateError::Config(format!("gateway.listen: {e}")))?;

    tracing::info!(
        environment = cfg.admission.environment.as_str(),
        dry_run = cfg.admission.debug_mode,
        max_depth = cfg.admission.max_depth,
        max_cost = cfg.admission.max_cost,
        "admission configured"
    );

    let state = AppState::new(cfg).await?;
    let _refreshers = state.spawn_refreshers();
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "fedgate-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| FedgateError::Internal(format!("bind {listen} failed: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|e| FedgateError::Internal(format!("server failed: {e}")));

    state.flush_rejections(state.cfg().reporter.flush_timeout).await;
    served
}

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    state.metrics().set_draining();
    tracing::info!("draining; shutting down");
}
