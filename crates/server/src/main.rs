//! viewdeck server
//!
//! Keeps the livestream allowlist and tracks who is watching right now.
//! Presence lives in memory only; the allowlist lives in SQLite.

mod client_ip;
mod cmd_init;
mod config;
mod email_handler;
mod email_store;
mod error;
mod logging;
mod migration_runner;
mod paths;
mod presence_handler;
mod presence_registry;
mod reaper;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{PresenceConfig, ServerConfig, DEFAULT_BIND, DEFAULT_SWEEP_INTERVAL_MS};
use crate::email_handler::{create_email, delete_email, list_emails, record_view};
use crate::email_store::EmailStore;
use crate::presence_handler::{presence_mutate, presence_snapshot, stream_presence};
use crate::presence_registry::{PresenceRegistry, STALE_THRESHOLD_MS};
use crate::reaper::spawn_reaper;
use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "viewdeck", version, about = "Livestream allowlist and live viewer presence")]
struct Cli {
    /// Data directory (database, logs)
    #[arg(long, env = "VIEWDECK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "VIEWDECK_BIND", default_value = DEFAULT_BIND, global = true)]
    bind: SocketAddr,

    /// Evict viewer sessions not refreshed for this many milliseconds
    #[arg(long, env = "VIEWDECK_STALE_AFTER_MS", default_value_t = STALE_THRESHOLD_MS, global = true)]
    stale_after_ms: u64,

    /// How often the stale-session sweep runs, in milliseconds
    #[arg(long, env = "VIEWDECK_SWEEP_INTERVAL_MS", default_value_t = DEFAULT_SWEEP_INTERVAL_MS, global = true)]
    sweep_interval_ms: u64,

    /// Development mode: report loopback callers as "localhost (dev)"
    #[arg(long, env = "VIEWDECK_DEV", global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server (default)
    Start,
    /// Create the data directory and database, then exit
    Init,
}

impl Cli {
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        Ok(ServerConfig {
            bind: self.bind,
            dev_mode: self.dev,
            presence: PresenceConfig::new(self.stale_after_ms, self.sweep_interval_ms)?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = paths::init_data_dir(cli.data_dir.as_deref())?;

    match cli.command {
        Some(Command::Init) => cmd_init::run(&data_dir),
        Some(Command::Start) | None => {
            let config = cli.server_config()?;
            paths::ensure_dirs()?;
            run_server(config).await
        }
    }
}

async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let logging = logging::init_logging()?;

    info!(
        component = "server",
        event = "server.starting",
        version = VERSION,
        run_id = %logging.run_id,
        bind = %config.bind,
        dev_mode = config.dev_mode,
        "Starting viewdeck server"
    );

    let emails = EmailStore::open(&paths::db_path()?)?;
    let registry = Arc::new(PresenceRegistry::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = spawn_reaper(Arc::clone(&registry), config.presence, shutdown_rx);

    let state = AppState::new(registry, emails, config.dev_mode);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        component = "server",
        event = "server.listening",
        bind = %config.bind,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop_reaper(shutdown_tx, reaper).await;

    info!(
        component = "server",
        event = "server.stopped",
        "viewdeck server stopped"
    );
    drop(logging);
    Ok(())
}

async fn stop_reaper(shutdown_tx: watch::Sender<bool>, reaper: JoinHandle<()>) {
    // Err only means the reaper already exited and dropped its receiver.
    shutdown_tx.send(true).ok();
    if let Err(e) = reaper.await {
        warn!(
            component = "server",
            event = "server.reaper_join_failed",
            error = %e,
            "Reaper task did not exit cleanly"
        );
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/presence",
            get(presence_snapshot).post(presence_mutate),
        )
        .route("/api/presence/{stream_id}", get(stream_presence))
        // Path used by earlier clients
        .route(
            "/api/websocket",
            get(presence_snapshot).post(presence_mutate),
        )
        .route(
            "/api/emails",
            get(list_emails).post(create_email).delete(delete_email),
        )
        .route("/api/emails/{id}/ip", put(record_view))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(
            component = "server",
            event = "server.signal_failed",
            error = %e,
            "Failed to listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
    info!(
        component = "server",
        event = "server.shutdown_requested",
        "Shutdown requested"
    );
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
