use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Reject requests whose Host header is not in the trusted list.
/// An empty list or a "*" entry disables the check.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let trusted = &state.config.trusted_hosts;
    if trusted.is_empty() || trusted.iter().any(|host| host.trim() == "*") {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(':').next().unwrap_or(value).trim().to_string())
        .unwrap_or_default();

    if host.is_empty() || !trusted.iter().any(|candidate| candidate == &host) {
        return (StatusCode::BAD_REQUEST, "Invalid host header").into_response();
    }

    next.run(request).await
}
