//! Process entrypoint: wires the components into one `AppState` and serves
//! the HTTP surface. Also exposes a `migrate` subcommand so deploys can run
//! the schema forward without booting the server.

mod agent;
mod auth;
mod config;
mod db;
mod error;
mod http;
mod llm;
mod model;
mod permission;
mod progress;
mod recipe;
mod scaffold;
mod session;
mod substrate;
mod supervision;
mod ticket;
mod tools;
mod work_request;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use agent::AgentRuntime;
use config::AppConfig;
use db::Store;
use http::AppState;
use llm::HttpLlmProvider;
use permission::PermissionGate;
use progress::ProgressChannel;
use recipe::RecipeCatalog;
use scaffold::ProjectScaffolder;
use session::SessionRegistry;
use substrate::SubstrateClient;
use supervision::SupervisionBridge;
use ticket::WorkTicketExecutor;
use tools::ToolCatalog;
use work_request::WorkRequestRecorder;

#[derive(Parser)]
#[command(name = "work-orchestrator", about = "Work-request orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending database migrations and exit (default if omitted: serve).
    Migrate,
    /// Run the HTTP server. This is the default when no subcommand is given.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let store = Store::new(&config.database).await?;
    store.run_migrations().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            tracing::info!("migrations applied, exiting");
            Ok(())
        }
        Command::Serve => serve(config, store).await,
    }
}

async fn serve(config: AppConfig, store: Store) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let store = Arc::new(store);
    let db: Arc<dyn db::Database> = store.clone();

    let substrate = Arc::new(SubstrateClient::new(config.substrate.clone(), &config.circuit_breaker));
    let llm = Arc::new(HttpLlmProvider::new(&config.llm)) as Arc<dyn llm::LlmClient>;
    let progress = Arc::new(ProgressChannel::new());
    let recipes = Arc::new(RecipeCatalog::new());
    let tools = Arc::new(ToolCatalog::new(tools::builtin::all()));

    let permission = Arc::new(PermissionGate::new(db.clone(), config.trial_cap));
    let recorder = Arc::new(WorkRequestRecorder::new(db.clone()));
    let sessions = Arc::new(SessionRegistry::new(db.clone()));
    let runtime = Arc::new(AgentRuntime::new(
        llm.clone(),
        tools.clone(),
        progress.clone(),
        config.clone(),
    ));

    let executor = Arc::new(WorkTicketExecutor::new(
        db.clone(),
        permission.clone(),
        recorder.clone(),
        sessions.clone(),
        runtime,
        substrate.clone(),
        progress.clone(),
        tools,
        recipes,
        config.clone(),
    ));

    let supervision = Arc::new(SupervisionBridge::new(substrate.clone(), db.clone()));
    let scaffolder = Arc::new(ProjectScaffolder::new(
        permission,
        substrate.clone(),
        db.clone(),
        sessions,
        recorder,
    ));

    let state = AppState {
        config: config.clone(),
        db,
        store,
        substrate,
        executor,
        progress,
        supervision,
        scaffolder,
    };

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    tracing::info!(port = config.http_port, "work-orchestrator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// SIGTERM (or Ctrl-C locally) drains in-flight tickets up to their next
/// suspension point; axum stops accepting new connections and waits for
/// in-flight requests to finish before this future resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
}
