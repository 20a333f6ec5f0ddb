use crate::config::{AppState, AuthMode};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

/// Check the `Authorization: Bearer <token>` header against the configured
/// secret. Pure check: no session state is touched on either outcome.
pub fn verify_bearer(auth: &AuthMode, headers: &HeaderMap) -> bool {
    let AuthMode::Enabled { token } = auth else {
        return true;
    };

    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|presented| {
            // Constant-time over the full token; no prefix short-circuit.
            presented.as_bytes().ct_eq(token.as_bytes()).into()
        })
        .unwrap_or(false)
}

/// Auth guard middleware for the `/mcp` routes. Runs before any session or
/// protocol logic so unauthenticated traffic mutates nothing.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !verify_bearer(&state.auth, request.headers()) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(request).await
}
