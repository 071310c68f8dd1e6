//! Health check endpoint, for load balancers and container probes.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    scheduler_running: bool,
    pending_invites: usize,
}

/// Health check router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = state.db.health_check().await;

    Json(HealthResponse {
        status: if db_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        scheduler_running: state.manager.is_running().await,
        pending_invites: state.manager.store().len().await,
    })
}
