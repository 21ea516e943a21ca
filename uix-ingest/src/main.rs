//! uix-ingest - Uncertainty index ingest service
//!
//! Serves the HTTP trigger layer by default; `ingest` and `backfill`
//! subcommands run a single job and exit, for use from a scheduler.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uix_common::config::{load_toml_config, resolve_root_folder, DATABASE_FILE};
use uix_common::{Clock, MonthLabel, SystemClock};

use uix_ingest::adapters::{build_http_client, default_panel, PanelConfig};
use uix_ingest::AppState;

const DEFAULT_BIND: &str = "127.0.0.1:5740";

/// Command-line arguments for uix-ingest
#[derive(Parser, Debug)]
#[command(name = "uix-ingest")]
#[command(about = "Monthly uncertainty index ingest and approval service")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, env = "UIX_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "UIX_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides TOML bind_address)
    #[arg(short, long, env = "UIX_BIND")]
    bind: Option<SocketAddr>,

    /// Log filter when RUST_LOG is unset (overrides TOML [logging] level)
    #[arg(long, env = "UIX_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Ingest one month and exit
    Ingest {
        /// Month label such as "Feb 2026"; defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },
    /// Ingest the current and preceding months and exit
    Backfill {
        #[arg(long, default_value_t = 4)]
        months: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_toml_config(args.config.as_deref()).context("Failed to load config")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("uix_ingest={level},uix_common={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting uix-ingest");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = root_folder.join(DATABASE_FILE);
    info!("Database: {}", db_path.display());
    let db = uix_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let sources = &toml_config.sources;
    let timeout = Duration::from_secs(sources.http_timeout_secs);
    let ledger = uix_ingest::config::build_ledger(&toml_config.ledger, timeout).context("Ledger setup failed")?;

    let panel_config = PanelConfig {
        fred_api_key: uix_ingest::config::resolve_fred_api_key(&db, &toml_config).await?,
        fred_base_url: sources.fred_base_url.clone(),
        page_cache_ttl: Duration::from_secs(sources.page_cache_ttl_secs),
        workbook_cache_ttl: Duration::from_secs(sources.workbook_cache_ttl_secs),
        ..PanelConfig::default()
    };
    let http = build_http_client(timeout).context("HTTP client setup failed")?;
    let adapters = default_panel(&panel_config, http).context("Source panel setup failed")?;
    info!("Source panel: {} adapters", adapters.len());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(db, ledger, adapters, clock, sources.max_concurrency);
    state.orchestrator.schedules().seed().await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let addr = match args.bind {
                Some(addr) => addr,
                None => toml_config
                    .bind_address
                    .as_deref()
                    .unwrap_or(DEFAULT_BIND)
                    .parse()
                    .context("Invalid bind_address")?,
            };
            serve(state, addr).await
        }
        Command::Ingest { month } => {
            let month = month.as_deref().map(MonthLabel::parse).transpose()?;
            let summary = state.orchestrator.run_monthly_ingest(month).await?;
            info!(month = %summary.month, warnings = summary.warnings.len(), "Ingest finished");
            for warning in &summary.warnings {
                warn!("{}", warning);
            }
            Ok(())
        }
        Command::Backfill { months } => {
            let report = state.orchestrator.run_backfill(months).await?;
            for result in &report.results {
                info!(month = %result.month, status = ?result.status, error = ?result.error, "Backfill month");
            }
            Ok(())
        }
    }
}

async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = uix_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
