//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use mixpool_core::keys::KeyState;
use mixpool_core::scheduler::SchedulerState;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/deposits/fillable", get(api::list_fillable_deposits))
        .route("/countdown/refresh", post(api::refresh_countdown))
        .route("/scheduler/activate", post(api::activate_scheduler))
        .route("/scheduler/deactivate", post(api::deactivate_scheduler))
        .route("/ws", get(api::ws::operator_ws))
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    key_state: KeyState,
    scheduler_state: SchedulerState,
}

/// Health check: degraded while the encryption key is missing or the
/// scheduler is stopped, since no deals can happen in either case.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let key_state = state.keys.state();
    let scheduler_state = state.scheduler.state();
    let healthy = key_state == KeyState::Cached && scheduler_state == SchedulerState::Running;

    let body = Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        key_state,
        scheduler_state,
    });

    if healthy {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}
