use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::automation_dto::ExtendDeadlinePayload,
    error::{Error, Result},
    AppState,
};

#[axum::debug_handler]
pub async fn extend_deadline(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
    Json(payload): Json<ExtendDeadlinePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let outcome = state
        .extensions
        .request_extension(candidate_id, &payload.message, Utc::now())
        .await?;
    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn conversation(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    if state
        .stores
        .candidates
        .get_candidate(candidate_id)
        .await?
        .is_none()
    {
        return Err(Error::precondition(
            "candidate_not_found",
            format!("Candidate {} not found", candidate_id),
        ));
    }
    let entries = state
        .stores
        .conversations
        .entries_for_candidate(candidate_id)
        .await?;
    Ok(Json(entries))
}
