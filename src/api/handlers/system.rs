use axum::{extract::State, http::StatusCode, http::header, response::IntoResponse, Json};

use crate::api::responses::{ApiResult, HealthResponse};
use crate::api::AppState;

/// Health check handler
///
/// Returns 503 when the store does not answer.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                store: "ok".to_string(),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Store ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    store: "unavailable".to_string(),
                }),
            )
        }
    }
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
