//! Sweep trigger for the external scheduler.

use crate::{app::AppState, metrics, sweep};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::error;

/// Run one sweep pass. Safe on any schedule, including overlapping calls.
pub async fn run_sweep(State(state): State<AppState>) -> impl IntoResponse {
  match sweep::run_sweep(&state.db, Utc::now()).await {
    Ok(report) => Json(report).into_response(),
    Err(e) => {
      error!("sweep aborted: {e}");
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "sweep failed"})),
      )
        .into_response()
    }
  }
}

/// Read-only snapshot for the scheduler's health checks.
pub async fn sweep_status(State(state): State<AppState>) -> impl IntoResponse {
  match metrics::get_all(&state.db).await {
    Ok(counters) => {
      let rates = metrics::derive_rates(&counters);
      Json(json!({"counters": counters, "derived": rates})).into_response()
    }
    Err(e) => {
      error!("sweep_status error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}
