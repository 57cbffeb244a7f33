use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::automation_dto::EnqueueJobPayload,
    error::{Error, Result},
    models::automation_job::NewJob,
    AppState,
};

#[axum::debug_handler]
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(payload): Json<EnqueueJobPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    if state
        .stores
        .candidates
        .get_candidate(payload.candidate_id)
        .await?
        .is_none()
    {
        return Err(Error::precondition(
            "candidate_not_found",
            format!("Candidate {} not found", payload.candidate_id),
        ));
    }

    let job = state
        .stores
        .jobs
        .enqueue_job(NewJob {
            action_type: payload.action_type,
            candidate_id: payload.candidate_id,
            request_id: payload.request_id,
            scheduled_for: payload.scheduled_for,
        })
        .await?;
    tracing::info!(job_id = %job.id, action = %job.action_type, "Job enqueued manually");
    Ok((StatusCode::CREATED, Json(job)))
}

#[axum::debug_handler]
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let job = state.scheduler.retry(id, Utc::now()).await?;
    Ok(Json(job))
}
