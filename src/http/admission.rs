//! Relay-facing admission hook.
//!
//! Form-encoded per relay convention. Statuses mirror the SMTP decision
//! classes verbatim: 550 bounces permanently, 451 asks the relay to retry.
//! A store failure must never come back in the permanent class.

use crate::{admission, app::AppState, metrics};
use axum::{Form, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct AdmissionForm {
  pub recipient: String,
  #[serde(default)]
  pub sender: Option<String>,
}

pub async fn admit_recipient(
  State(state): State<AppState>,
  Form(form): Form<AdmissionForm>,
) -> impl IntoResponse {
  let recipient = form.recipient.trim().to_lowercase();
  let decision = admission::admit(&state.db, &state.domain, &recipient, Utc::now()).await;

  if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_ADMISSION_CHECKS, 1).await {
    error!("admission metric failed: {e}");
  }
  if matches!(decision, admission::Decision::Reject { .. }) {
    if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_ADMISSION_REJECTED, 1).await {
      error!("admission metric failed: {e}");
    }
  }

  match decision {
    admission::Decision::Accept { inbox_id } => (
      StatusCode::OK,
      Json(json!({
        "success": true,
        "recipient": recipient,
        "inbox_id": inbox_id,
      })),
    )
      .into_response(),
    admission::Decision::Reject { reason } => {
      let status = StatusCode::from_u16(550).unwrap_or(StatusCode::NOT_ACCEPTABLE);
      (status, Json(json!({"error": reason}))).into_response()
    }
    admission::Decision::TempFail { .. } => {
      let status = StatusCode::from_u16(451).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
      (status, Json(json!({"error": "Temporary failure"}))).into_response()
    }
  }
}
