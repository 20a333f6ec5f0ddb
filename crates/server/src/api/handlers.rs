// Transport handlers for the /mcp endpoint: header validation, envelope
// parsing, engine dispatch, and HTTP status mapping.

use crate::config::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use trustydata_core::SessionId;
use trustydata_mcp::protocol::{JsonRpcError, JsonRpcResponse, McpPayload};
use trustydata_mcp::{Outcome, SUPPORTED_PROTOCOL_VERSIONS};

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_HEADER: &str = "mcp-protocol-version";

/// HTTP status for a single JSON-RPC response. Envelope-level rejections map
/// to 4xx; method- and tool-level errors stay 200 so clients can tell
/// transport failure from protocol failure.
fn status_for(response: &JsonRpcResponse) -> StatusCode {
    match response.error.as_ref().map(|e| e.code) {
        Some(-32700) | Some(-32600) => StatusCode::BAD_REQUEST,
        Some(-32001) => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    }
}

fn json_response(
    status: StatusCode,
    body: impl Serialize,
    session_id: Option<&SessionId>,
) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Some(id) = session_id {
        if let Ok(value) = HeaderValue::from_str(id.as_str()) {
            response.headers_mut().insert("Mcp-Session-Id", value);
        }
    }
    response
}

fn envelope_rejection(error: JsonRpcError) -> Response {
    let response = JsonRpcResponse::error(serde_json::Value::Null, error);
    json_response(status_for(&response), response, None)
}

fn session_id_from(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(SessionId::new)
}

/// Validate the `MCP-Protocol-Version` header against the payload.
///
/// A present header must name a supported revision. An absent header is only
/// tolerated when every element is an `initialize` (first contact: the
/// version is negotiated via params, so the client cannot know it yet).
fn validate_protocol_header(headers: &HeaderMap, payload: &McpPayload) -> Result<(), Response> {
    match headers.get(PROTOCOL_HEADER).map(|h| h.to_str()) {
        Some(Ok(version)) => {
            if SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
                Ok(())
            } else {
                Err(envelope_rejection(JsonRpcError::invalid_request(format!(
                    "unsupported protocol version '{version}' (supported: {})",
                    SUPPORTED_PROTOCOL_VERSIONS.join(", ")
                ))))
            }
        }
        Some(Err(_)) => Err(envelope_rejection(JsonRpcError::invalid_request(
            "malformed MCP-Protocol-Version header",
        ))),
        None => {
            let only_initialize = match payload {
                McpPayload::Single(req) => req.method == "initialize",
                McpPayload::Batch(reqs) => reqs.iter().all(|r| r.method == "initialize"),
            };
            if only_initialize {
                Ok(())
            } else {
                Err(envelope_rejection(JsonRpcError::invalid_request(
                    "missing MCP-Protocol-Version header",
                )))
            }
        }
    }
}

/// POST /mcp — the sole MCP entry point. One JSON-RPC envelope or a batch.
pub async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return envelope_rejection(JsonRpcError::invalid_request(
            "Content-Type must be application/json",
        ));
    }

    let payload: McpPayload = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => return envelope_rejection(JsonRpcError::parse_error(e.to_string())),
    };

    if let Err(rejection) = validate_protocol_header(&headers, &payload) {
        return rejection;
    }

    let session_header = session_id_from(&headers);

    match payload {
        McpPayload::Single(req) => {
            match state.engine.handle(session_header.as_ref(), req).await {
                Outcome::Reply {
                    response,
                    session_id,
                } => json_response(status_for(&response), response, session_id.as_ref()),
                Outcome::Accepted { session_id } => {
                    let mut response = StatusCode::ACCEPTED.into_response();
                    if let Some(id) = session_id {
                        if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                            response.headers_mut().insert("Mcp-Session-Id", value);
                        }
                    }
                    response
                }
                Outcome::SessionMissing => StatusCode::NOT_FOUND.into_response(),
            }
        }
        McpPayload::Batch(reqs) => {
            if reqs.is_empty() {
                return envelope_rejection(JsonRpcError::invalid_request("empty batch"));
            }

            let mut responses = Vec::new();
            let mut echo_session = session_header.clone();
            for req in reqs {
                match state.engine.handle(session_header.as_ref(), req).await {
                    Outcome::Reply {
                        response,
                        session_id,
                    } => {
                        if session_id.is_some() {
                            echo_session = session_id;
                        }
                        responses.push(response);
                    }
                    Outcome::Accepted { .. } | Outcome::SessionMissing => {}
                }
            }

            if responses.is_empty() {
                // Batch of pure notifications.
                StatusCode::ACCEPTED.into_response()
            } else {
                json_response(StatusCode::OK, responses, echo_session.as_ref())
            }
        }
    }
}

/// GET /mcp — the server-initiated SSE channel is not served; the legacy
/// event-stream transport lives outside this gateway.
pub async fn mcp_get(headers: HeaderMap) -> Response {
    let accepts_sse = headers
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false);

    if !accepts_sse {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    (
        StatusCode::METHOD_NOT_ALLOWED,
        "server-initiated streaming not supported",
    )
        .into_response()
}

/// DELETE /mcp — explicit session teardown. Idempotent: 204 whether or not
/// the session still exists.
pub async fn mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_id_from(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header").into_response();
    };

    state.sessions.destroy(&session_id);
    StatusCode::NO_CONTENT.into_response()
}
