use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use crate::{
    dto::telegram_dto::TelegramUpdate,
    error::{Error, Result},
    AppState,
};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Telegram retries any non-200 answer, so processing errors are logged and
/// acknowledged. Only updates without the registered secret are refused.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<TelegramUpdate>,
) -> Result<(StatusCode, Json<Value>)> {
    verify_secret(&headers, &state.auth.telegram_secret)?;

    tracing::info!(update_id = update.update_id, "Received Telegram update");
    let Some(message) = update.message else {
        return Ok((StatusCode::OK, Json(json!({ "ok": true }))));
    };
    let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Ok((StatusCode::OK, Json(json!({ "ok": true }))));
    };

    match state
        .inbound
        .handle_telegram_message(message.chat.id, text, Utc::now())
        .await
    {
        Ok(outcome) => Ok((StatusCode::OK, Json(json!({ "ok": true, "result": outcome })))),
        Err(e) => {
            tracing::error!(error = %e, chat_id = message.chat.id, "Failed to handle Telegram message");
            Ok((StatusCode::OK, Json(json!({ "ok": false }))))
        }
    }
}

fn verify_secret(headers: &HeaderMap, expected: &str) -> Result<()> {
    let Some(header) = headers.get(SECRET_HEADER) else {
        tracing::warn!("Telegram update without secret token");
        return Err(Error::Unauthorized("missing_telegram_secret".into()));
    };
    let provided = header
        .to_str()
        .map_err(|_| Error::Unauthorized("invalid_secret_header".into()))?;
    if ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into() {
        Ok(())
    } else {
        tracing::warn!("Telegram update with an invalid secret token");
        Err(Error::Unauthorized("invalid_telegram_secret".into()))
    }
}
