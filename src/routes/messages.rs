use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use validator::Validate;

use crate::{
    dto::automation_dto::{GenerateMessagePayload, GeneratedMessage},
    error::{Error, Result},
    services::message_generator::MessageContext,
    AppState,
};

/// Drafts a message for manager review without sending it.
#[axum::debug_handler]
pub async fn generate_message(
    State(state): State<AppState>,
    Json(payload): Json<GenerateMessagePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let candidate = state
        .stores
        .candidates
        .get_candidate(payload.candidate_id)
        .await?
        .ok_or_else(|| {
            Error::precondition(
                "candidate_not_found",
                format!("Candidate {} not found", payload.candidate_id),
            )
        })?;
    let request = match payload.request_id {
        Some(id) => Some(state.stores.requests.get_request(id).await?.ok_or_else(|| {
            Error::precondition("request_not_found", format!("Request {} not found", id))
        })?),
        None => None,
    };

    let mut ctx = MessageContext::new(&candidate, request.as_ref())
        .with_feedback(payload.feedback.as_deref());
    if let Some(deadline) = payload.deadline {
        ctx = ctx.with_deadline(deadline);
    }
    let message = state.generator.generate(payload.kind, ctx).await;
    Ok(Json(GeneratedMessage {
        kind: payload.kind,
        message,
    }))
}
