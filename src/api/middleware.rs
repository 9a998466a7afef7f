// Request context, error enrichment and HTTP metrics

use axum::{
    extract::{Request, State},
    http::{header, HeaderName},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use uuid::Uuid;

use super::responses::{ApiError, ErrorMessage};
use super::AppState;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request id from the caller, or a fresh UUID v4
fn request_id_of(request: &Request) -> String {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Stamps the request id into error bodies, counts the response status
/// and logs one line per request. Runs inside `SetRequestIdLayer`, so the
/// header is normally present already.
pub async fn request_context(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = request_id_of(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(request).await;

    if let Some(ErrorMessage(message)) = response.extensions_mut().remove::<ErrorMessage>() {
        let status = response.status();
        let headers = response.headers().clone();
        response = ApiError::new(status, message)
            .with_request_id(request_id.clone())
            .into_response();
        for (name, value) in headers.iter() {
            if name != header::CONTENT_LENGTH && name != header::CONTENT_TYPE {
                response.headers_mut().insert(name.clone(), value.clone());
            }
        }
        response.extensions_mut().remove::<ErrorMessage>();
    }

    let status = response.status().as_u16();
    state.metrics.observe_status(status);
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}
