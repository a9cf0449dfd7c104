//! HTTP Surface.
//!
//! Composes the axum router over the shared [`AppState`]: JSON request
//! handling, JWT extraction via [`crate::auth::AuthUser`], and SSE for
//! ticket progress. Route fragments merge into one `Router`, served with
//! graceful shutdown from a single fragment since this crate has one HTTP
//! origin rather than several channel adapters.

mod dto;
mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::{Database, Store};
use crate::progress::ProgressChannel;
use crate::scaffold::ProjectScaffolder;
use crate::substrate::SubstrateClient;
use crate::supervision::SupervisionBridge;
use crate::ticket::WorkTicketExecutor;

/// Shared application state handed to every route. Carries both the
/// `Database` trait object (used by most components) and the concrete
/// `Store` (used only by `/health/db` to ping the pool directly, so the
/// trait itself never needs a health-check method).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<dyn Database>,
    pub store: Arc<Store>,
    pub substrate: Arc<SubstrateClient>,
    pub executor: Arc<WorkTicketExecutor>,
    pub progress: Arc<ProgressChannel>,
    pub supervision: Arc<SupervisionBridge>,
    pub scaffolder: Arc<ProjectScaffolder>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/projects/scaffold", post(routes::scaffold_project))
        .route("/api/agents/run", post(routes::run_agent))
        .route("/api/work/queue", post(routes::queue_work))
        .route("/api/work/tickets/{id}/stream", get(routes::stream_ticket))
        .route(
            "/api/supervision/baskets/{basket_id}/outputs",
            get(routes::list_outputs),
        )
        .route(
            "/api/supervision/baskets/{basket_id}/outputs/{output_id}/approve",
            post(routes::approve_output),
        )
        .route(
            "/api/supervision/baskets/{basket_id}/outputs/{output_id}/reject",
            post(routes::reject_output),
        )
        .route(
            "/api/supervision/baskets/{basket_id}/outputs/{output_id}/promote",
            post(routes::promote_output),
        )
        .route(
            "/api/supervision/baskets/{basket_id}/outputs/{output_id}/skip-promotion",
            post(routes::skip_promotion),
        )
        .route("/api/tp/chat", post(routes::tp_chat))
        .route("/health", get(routes::health))
        .route("/health/db", get(routes::health_db))
        .route("/health/queue", get(routes::health_queue))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
