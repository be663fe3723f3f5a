//! Metrics API: public read, admin-gated writes.

use crate::{app::AppState, http::admin::require_admin, metrics};
use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

pub async fn list_metrics(State(state): State<AppState>) -> impl IntoResponse {
  match metrics::get_all(&state.db).await {
    Ok(counters) => {
      let rates = metrics::derive_rates(&counters);
      Json(json!({"counters": counters, "derived": rates})).into_response()
    }
    Err(e) => {
      error!("list_metrics error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MetricCommand {
  Increment {
    name: String,
    #[serde(default = "default_amount")]
    amount: i64,
  },
  Set {
    name: String,
    value: i64,
  },
}

fn default_amount() -> i64 {
  1
}

pub async fn mutate_metric(
  State(state): State<AppState>,
  headers: HeaderMap,
  body: Json<MetricCommand>,
) -> impl IntoResponse {
  if let Err(denied) = require_admin(&state, &headers) {
    return denied;
  }
  let result = match body.0 {
    MetricCommand::Increment { ref name, amount } => metrics::increment(&state.db, name, amount).await,
    MetricCommand::Set { ref name, value } => metrics::set(&state.db, name, value).await,
  };
  match result {
    Ok(()) => Json(json!({"success": true})).into_response(),
    Err(e) => {
      error!("mutate_metric error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}
