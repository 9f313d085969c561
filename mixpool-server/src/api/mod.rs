//! HTTP and WebSocket API surface.

pub mod ws;

use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use mixpool_sdk::objects::deposit::DepositRecord;
use serde::Deserialize;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct FillableQuery {
    /// Decimal amount in the ledger's smallest unit; defaults to the
    /// configured minimum.
    pub minimum_amount: Option<String>,
}

/// `GET /deposits/fillable` — list fillable deposits.
pub async fn list_fillable_deposits(
    State(state): State<AppState>,
    Query(query): Query<FillableQuery>,
) -> impl IntoResponse {
    let minimum_amount = match &query.minimum_amount {
        Some(raw) => match raw.parse::<u128>() {
            Ok(amount) => amount,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "minimum_amount is not a decimal amount"})),
                )
                    .into_response();
            }
        },
        None => state.config.read().await.minimum_amount,
    };

    match state.registry.fetch_fillable_deposits(minimum_amount).await {
        Ok(deposits) => {
            let records: Vec<DepositRecord> = deposits.iter().map(DepositRecord::from).collect();
            Json(serde_json::json!({ "deposits": records })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Unable to list fillable deposits");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

/// `POST /scheduler/activate` — resume countdown checks.
pub async fn activate_scheduler(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.activate();
    Json(serde_json::json!({"active": true}))
}

/// `POST /scheduler/deactivate` — pause countdown checks.
pub async fn deactivate_scheduler(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.deactivate();
    Json(serde_json::json!({"active": false}))
}

/// `POST /countdown/refresh` — force a countdown poll.
pub async fn refresh_countdown(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.refresh_countdown().await {
        Ok(countdown) => Json(serde_json::json!({
            "blocks_remaining": countdown.max(0),
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Countdown refresh failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "ledger unreachable"})),
            )
                .into_response()
        }
    }
}
