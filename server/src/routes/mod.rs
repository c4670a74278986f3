//! HTTP router.

pub mod jobs;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Uploaded images are bounded well above typical phone-camera sizes.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/jobs", post(jobs::submit))
        .route("/jobs/check-limit", get(jobs::check_limit))
        .route(
            "/jobs/:id",
            get(jobs::get_job)
                .patch(jobs::update_fields)
                .delete(jobs::delete_job),
        )
        .route("/jobs/:id/mark-action", post(jobs::mark_action))
        .route("/jobs/:id/favorite", post(jobs::favorite))
        .route("/history", get(jobs::history))
        .route("/stats", get(jobs::stats))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
