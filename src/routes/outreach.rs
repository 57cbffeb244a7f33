use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::automation_dto::{CancelledOutreach, EditOutreachPayload},
    error::Result,
    middleware::auth::Claims,
    models::outreach::OutreachEdit,
    AppState,
};

#[axum::debug_handler]
pub async fn cancel_outreach(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let item = state.outreach.cancel(id).await?;
    Ok(Json(item))
}

#[axum::debug_handler]
pub async fn cancel_candidate_outreach(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let cancelled = state.outreach.cancel_for_candidate(candidate_id).await?;
    Ok(Json(CancelledOutreach { cancelled }))
}

#[axum::debug_handler]
pub async fn edit_outreach(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditOutreachPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let edit = OutreachEdit {
        message: payload.message,
        scheduled_for: payload.scheduled_for,
    };
    let item = state
        .outreach
        .edit(id, edit, &claims.sub, Utc::now())
        .await?;
    Ok(Json(item))
}

#[axum::debug_handler]
pub async fn send_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.outreach.send_now(id, Utc::now()).await?;
    Ok(Json(outcome))
}
