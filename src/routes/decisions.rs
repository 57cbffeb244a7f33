use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::automation_dto::{FinalDecisionPayload, TestTaskDecisionPayload},
    error::Result,
    middleware::auth::Claims,
    AppState,
};

#[axum::debug_handler]
pub async fn record_final_decision(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<FinalDecisionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let outcome = state
        .decisions
        .record_final_decision(
            payload.candidate_id,
            payload.request_id,
            payload.decision,
            &claims.sub,
            Utc::now(),
        )
        .await?;
    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn record_test_task_decision(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(candidate_id): Path<Uuid>,
    Json(payload): Json<TestTaskDecisionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let outcome = state
        .decisions
        .record_test_task_decision(
            candidate_id,
            payload.decision,
            payload.feedback.as_deref(),
            &claims.sub,
        )
        .await?;
    Ok(Json(outcome))
}
