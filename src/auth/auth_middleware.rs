// Axum authentication middleware

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::api::responses::ApiError;
use crate::api::AppState;

/// Bearer authentication middleware
///
/// Extracts the access token from `Authorization: Bearer`, validates it and
/// sets the resulting `AuthUser` in request extensions for handlers to use.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

    let user = state.accounts.authenticate(token).await?;
    tracing::debug!(user_id = user.user_id, "Request authenticated");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extract the bearer token from request headers
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Extract the client IP from request headers
///
/// Checks `X-Forwarded-For` first (first hop), then `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("X-Real-IP").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
