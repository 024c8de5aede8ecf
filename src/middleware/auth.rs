//! Shared-secret bearer authentication. Aegis has no user/session model of
//! its own — one opaque credential gates the whole API surface, presented
//! as `Authorization: Bearer <key>`.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::utils::ApiError;

#[derive(Clone)]
pub struct AuthState {
    pub api_key: String,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.api_key => Ok(next.run(req).await),
        _ => {
            tracing::warn!(path = %req.uri().path(), "rejected request with invalid or missing credential");
            Err(ApiError::Unauthorized)
        },
    }
}
