use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;

/// Manager token claims. `sub` is the manager id recorded on decisions and
/// edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

const MANAGER_ROLES: [&str; 2] = ["admin", "hr"];

fn unauthorized(error: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": error, "code": error }))).into_response()
}

fn bearer_token(req: &Request) -> Result<&str, Response> {
    let Some(auth_header) = req.headers().get(header::AUTHORIZATION) else {
        return Err(unauthorized("missing_authorization"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(unauthorized("bad_authorization"));
    };
    auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("unsupported_scheme"))
}

pub async fn require_manager(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&req) {
        Ok(token) => token,
        Err(response) => return response,
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.jwt_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => {
            let role = data.claims.role.clone().unwrap_or_default();
            if !MANAGER_ROLES.iter().any(|r| r.eq_ignore_ascii_case(&role)) {
                return (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "error": "forbidden", "code": "forbidden" })),
                )
                    .into_response();
            }
            req.extensions_mut().insert(data.claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected manager token");
            unauthorized("invalid_token")
        }
    }
}
