//! HTTP router and handlers.

use crate::app::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod admission;
pub mod attachments;
pub mod inboxes;
pub mod maintenance;
pub mod metrics;

/// Assemble the HTTP router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/inboxes", post(inboxes::create_inbox))
        .route("/inboxes/:address", get(inboxes::get_inbox))
        .route("/inboxes/:address/emails", get(inboxes::list_emails))
        .route("/inboxes/:address/emails/:id", get(inboxes::get_email))
        .route(
            "/attachments/:att_id/download",
            get(attachments::download_attachment),
        )
        .route("/mail/admission", post(admission::admit_recipient))
        .route(
            "/maintenance/sweep",
            post(maintenance::run_sweep).get(maintenance::sweep_status),
        )
        .route(
            "/metrics",
            get(metrics::list_metrics).post(metrics::mutate_metric),
        )
        .route("/admin/stats", get(admin::stats))
        .route("/admin/blocked", get(admin::list_blocked))
        .route("/admin/offenders", get(admin::top_offenders))
        .route("/admin/command", post(admin::run_command))
        .with_state(state)
}
