use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;

use crate::AppState;

/// One scheduler tick. Failures are reported in the body, never as a
/// non-200 status, so the external trigger keeps firing.
#[axum::debug_handler]
pub async fn run_automation(State(state): State<AppState>) -> impl IntoResponse {
    let result = state
        .scheduler
        .tick(Utc::now(), state.settings.job_batch_size)
        .await;
    Json(result)
}

#[axum::debug_handler]
pub async fn run_outreach(State(state): State<AppState>) -> impl IntoResponse {
    let result = state
        .outreach
        .tick(Utc::now(), state.settings.outreach_batch_size)
        .await;
    Json(result)
}
