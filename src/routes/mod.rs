pub mod candidates;
pub mod cron;
pub mod decisions;
pub mod health;
pub mod jobs;
pub mod messages;
pub mod outreach;
pub mod telegram;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};

use crate::middleware::{auth::require_manager, trigger_auth::require_trigger_secret};
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let base_routes = Router::new()
        .route("/health", get(health::health))
        .route("/api/webhook/telegram", post(telegram::handle_webhook));

    let cron_api = Router::new()
        .route(
            "/api/cron/automation",
            get(cron::run_automation).post(cron::run_automation),
        )
        .route(
            "/api/cron/outreach",
            get(cron::run_outreach).post(cron::run_outreach),
        )
        .layer(from_fn_with_state(state.clone(), require_trigger_secret));

    let manager_api = Router::new()
        .route("/api/automation/jobs", post(jobs::enqueue_job))
        .route("/api/automation/jobs/:id/retry", post(jobs::retry_job))
        .route("/api/automation/outreach/:id", patch(outreach::edit_outreach))
        .route(
            "/api/automation/outreach/:id/cancel",
            post(outreach::cancel_outreach),
        )
        .route(
            "/api/automation/outreach/:id/send-now",
            post(outreach::send_now),
        )
        .route(
            "/api/automation/candidates/:id/outreach/cancel",
            post(outreach::cancel_candidate_outreach),
        )
        .route(
            "/api/automation/messages/generate",
            post(messages::generate_message),
        )
        .route("/api/automation/decisions", post(decisions::record_final_decision))
        .route(
            "/api/automation/candidates/:id/test-task-decision",
            post(decisions::record_test_task_decision),
        )
        .route(
            "/api/automation/candidates/:id/extend-deadline",
            post(candidates::extend_deadline),
        )
        .route(
            "/api/automation/candidates/:id/conversation",
            get(candidates::conversation),
        )
        .layer(from_fn_with_state(state.clone(), require_manager));

    Router::new()
        .merge(base_routes)
        .merge(cron_api)
        .merge(manager_api)
        .with_state(state)
}
