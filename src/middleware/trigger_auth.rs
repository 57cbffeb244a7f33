use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::AppState;

/// Guards the periodic trigger endpoints. With no secret configured the
/// endpoints are open; otherwise the secret must arrive as a bearer token or
/// a `secret` query parameter.
pub async fn require_trigger_secret(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.auth.cron_secret.as_deref() else {
        return next.run(req).await;
    };

    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let from_query = req.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("secret=").map(str::to_string)
        })
    });

    let Some(provided) = from_header.or(from_query) else {
        return Error::Unauthorized("missing_trigger_secret".into()).into_response();
    };
    if ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into() {
        next.run(req).await
    } else {
        tracing::warn!("Trigger called with an invalid secret");
        Error::Unauthorized("invalid_trigger_secret".into()).into_response()
    }
}
