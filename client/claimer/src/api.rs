//! Axum operator API over the claim coordinator.

use std::sync::Arc;

use alloy_primitives::U256;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::balances::StakedBalances;
use crate::coordinator::{ClaimCoordinator, ClaimView};
use crate::errors::ClaimError;
use crate::events::ClaimEventRecord;
use crate::journal;
use crate::types::{Receipt, Tranche};

pub struct ApiState {
    pub coordinator: Arc<ClaimCoordinator>,
    pub balances: Arc<StakedBalances>,
    pub pool: SqlitePool,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/claims", get(get_claims))
        .route("/claims/history", get(get_history))
        .route("/claims/:tranche", post(post_claim))
        .route("/reload", post(reload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ClaimRequest {
    /// Lock duration in seconds, optional tranche only.
    pub duration: Option<U256>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsResponse {
    #[serde(flatten)]
    pub view: ClaimView,
    pub staked_balance: Option<U256>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub events: Vec<ClaimEventRecord>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn status_for(e: &ClaimError) -> StatusCode {
    match e {
        ClaimError::NotReady { .. } => StatusCode::CONFLICT,
        ClaimError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ClaimError::NotLoaded(_) | ClaimError::SignerUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ClaimError::SignerRejected(_) => StatusCode::FORBIDDEN,
        e if e.is_write_path() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /claims`
pub async fn get_claims(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(ClaimsResponse {
        view: state.coordinator.view().await,
        staked_balance: state.balances.latest(),
    })
}

/// `POST /claims/:tranche`
///
/// Runs the claim to completion and returns the receipt. A mined but failed
/// transaction is still `200` with `status != 1`.
pub async fn post_claim(
    State(state): State<Arc<ApiState>>,
    Path(tranche): Path<String>,
    body: Option<Json<ClaimRequest>>,
) -> Response {
    let Some(tranche) = Tranche::from_name(&tranche) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown tranche {tranche}"));
    };
    let request = body.map(|Json(b)| b).unwrap_or_default();

    match state.coordinator.claim(tranche, request.duration).await {
        Ok(receipt) => (StatusCode::OK, Json::<Receipt>(receipt)).into_response(),
        Err(e) => error_response(status_for(&e), e),
    }
}

/// `POST /reload`
pub async fn reload(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.coordinator.reload().await;
    Json(state.coordinator.view().await)
}

/// `GET /claims/history`
///
/// Journaled events for the current account, oldest first.
pub async fn get_history(State(state): State<Arc<ApiState>>) -> Response {
    let Some(account) = state.coordinator.view().await.account else {
        return Json(HistoryResponse {
            count: 0,
            events: vec![],
        })
        .into_response();
    };
    match journal::get_events_for_account(&state.pool, &account.to_string()).await {
        Ok(events) => Json(HistoryResponse {
            count: events.len(),
            events,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
