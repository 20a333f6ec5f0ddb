// Protocol engine: JSON-RPC method dispatch plus the per-session state
// machine. Session identity arrives out-of-band (the Mcp-Session-Id header),
// so the engine is stateless per call and correlates through the store.

use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerInfo,
};
use crate::tools::ToolRegistry;
use crate::{PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
use serde_json::Value;
use std::sync::Arc;
use trustydata_core::{SessionId, SessionStore};

/// Result of dispatching one envelope.
#[derive(Debug)]
pub enum Outcome {
    /// A request was handled; the transport serializes the response and, when
    /// a session id is present, echoes it in the `Mcp-Session-Id` header.
    Reply {
        response: JsonRpcResponse,
        session_id: Option<SessionId>,
    },
    /// A notification was accepted; the transport answers 202 with no body.
    Accepted { session_id: Option<SessionId> },
    /// A notification referenced an unknown or expired session. There is no
    /// request id to correlate an error envelope with, so the transport
    /// answers 404 directly.
    SessionMissing,
}

pub struct ProtocolEngine {
    server_info: ServerInfo,
    capabilities: Value,
    sessions: Arc<SessionStore>,
    registry: Arc<ToolRegistry>,
}

impl ProtocolEngine {
    pub fn new(
        server_info: ServerInfo,
        sessions: Arc<SessionStore>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            server_info,
            capabilities: serde_json::json!({
                "tools": {
                    "listChanged": false
                }
            }),
            sessions,
            registry,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn negotiate_protocol(requested: Option<&str>) -> String {
        match requested {
            Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => v.to_string(),
            // Unsupported or absent: answer with the revision we implement;
            // the client decides whether to proceed.
            _ => PROTOCOL_VERSION.to_string(),
        }
    }

    /// Dispatch one JSON-RPC envelope against the session named in the
    /// transport header (absent only on `initialize`).
    pub async fn handle(&self, session_header: Option<&SessionId>, req: JsonRpcRequest) -> Outcome {
        if req.jsonrpc != "2.0" {
            let id = req.id.unwrap_or(Value::Null);
            return Outcome::Reply {
                response: JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request("invalid jsonrpc version field"),
                ),
                session_id: None,
            };
        }

        if req.method == "initialize" {
            return self.handle_initialize(req);
        }

        // Every other method requires a live session.
        let Some(session_id) = session_header else {
            if req.is_notification() {
                return Outcome::SessionMissing;
            }
            return Outcome::Reply {
                response: JsonRpcResponse::error(
                    req.id.unwrap_or(Value::Null),
                    JsonRpcError::invalid_request("missing Mcp-Session-Id header"),
                ),
                session_id: None,
            };
        };

        // One atomic check-and-touch: lookup validates the session and
        // refreshes its activity timestamp under a single lock.
        if self.sessions.lookup(session_id).is_err() {
            tracing::warn!("rejected {} for unknown session {}", req.method, session_id);
            if req.is_notification() {
                return Outcome::SessionMissing;
            }
            return Outcome::Reply {
                response: JsonRpcResponse::error(
                    req.id.unwrap_or(Value::Null),
                    JsonRpcError::session_not_found(session_id.as_str()),
                ),
                session_id: None,
            };
        }

        if req.is_notification() {
            // notifications/initialized and friends carry no response.
            tracing::debug!("notification {} on session {}", req.method, session_id);
            return Outcome::Accepted {
                session_id: Some(session_id.clone()),
            };
        }

        let id = req.id.clone().unwrap_or(Value::Null);
        let response = match req.method.as_str() {
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                ListToolsResult {
                    tools: self.registry.list_schemas(),
                },
            ),
            "tools/call" => self.handle_tool_call(id, req.params).await,
            method => JsonRpcResponse::error(id, JsonRpcError::method_not_found(method)),
        };

        Outcome::Reply {
            response,
            session_id: Some(session_id.clone()),
        }
    }

    fn handle_initialize(&self, req: JsonRpcRequest) -> Outcome {
        let params: InitializeParams = match req.params {
            Some(value) => match serde_json::from_value(value) {
                Ok(params) => params,
                Err(e) => {
                    return Outcome::Reply {
                        response: JsonRpcResponse::error(
                            req.id.unwrap_or(Value::Null),
                            JsonRpcError::invalid_params(e.to_string()),
                        ),
                        session_id: None,
                    }
                }
            },
            None => InitializeParams::default(),
        };

        let Some(id) = req.id else {
            // initialize as a notification makes no sense; nothing to answer
            // and no session is created.
            return Outcome::Accepted { session_id: None };
        };

        let negotiated = Self::negotiate_protocol(params.protocol_version.as_deref());
        let (client_name, client_version) = params
            .client_info
            .map(|c| (Some(c.name), Some(c.version)))
            .unwrap_or((None, None));

        let session_id = self
            .sessions
            .create(negotiated.clone(), client_name, client_version);

        let result = InitializeResult {
            protocol_version: negotiated,
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
        };

        Outcome::Reply {
            response: JsonRpcResponse::success(id, result),
            session_id: Some(session_id),
        }
    }

    async fn handle_tool_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, JsonRpcError::invalid_params("missing params"));
        };
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string()))
            }
        };

        let Some(tool) = self.registry.get(&params.name) else {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::method_not_found(&format!("unknown tool '{}'", params.name)),
            );
        };

        match tool.execute(params.arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                // Tool-level failures stay protocol-level so the session
                // remains usable for subsequent calls.
                tracing::warn!("tool {} failed: {}", params.name, err);
                JsonRpcResponse::error(id, err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CallToolResult, ToolContent, ToolSchema};
    use crate::tools::{json_schema_object, Tool};
    use chrono::Duration;
    use trustydata_core::GatewayError;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".to_string(),
                description: "Echo arguments back".to_string(),
                input_schema: json_schema_object(serde_json::json!({}), vec![]),
            }
        }

        async fn execute(
            &self,
            arguments: Value,
        ) -> Result<CallToolResult, GatewayError> {
            Ok(CallToolResult {
                content: vec![ToolContent::text(arguments.to_string())],
                is_error: None,
            })
        }
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "slow".to_string(),
                description: "Always exceeds its deadline".to_string(),
                input_schema: json_schema_object(serde_json::json!({}), vec![]),
            }
        }

        async fn execute(&self, _arguments: Value) -> Result<CallToolResult, GatewayError> {
            Err(GatewayError::Timeout)
        }
    }

    fn engine() -> ProtocolEngine {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(SlowTool));

        ProtocolEngine::new(
            ServerInfo {
                name: "trustydata-mcp".to_string(),
                version: "1.0.0".to_string(),
            },
            Arc::new(SessionStore::new(Duration::seconds(3600))),
            Arc::new(registry),
        )
    }

    async fn initialize(engine: &ProtocolEngine) -> SessionId {
        let req = JsonRpcRequest::new(1, "initialize", serde_json::json!({}));
        match engine.handle(None, req).await {
            Outcome::Reply {
                response,
                session_id: Some(session_id),
            } => {
                assert!(response.error.is_none());
                session_id
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn initialize_creates_session_and_declares_version() {
        let engine = engine();
        let req = JsonRpcRequest::new(
            1,
            "initialize",
            serde_json::json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }),
        );

        let Outcome::Reply {
            response,
            session_id: Some(session_id),
        } = engine.handle(None, req).await
        else {
            panic!("expected reply with session id");
        };

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-06-18");
        assert_eq!(result["serverInfo"]["name"], "trustydata-mcp");
        assert!(result["capabilities"]["tools"].is_object());

        let session = engine.sessions().lookup(&session_id).unwrap();
        assert_eq!(session.client_name.as_deref(), Some("test-client"));
    }

    #[tokio::test]
    async fn each_initialize_yields_a_fresh_session() {
        let engine = engine();
        let a = initialize(&engine).await;
        let b = initialize(&engine).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unsupported_requested_version_falls_back_to_latest() {
        let engine = engine();
        let req = JsonRpcRequest::new(
            1,
            "initialize",
            serde_json::json!({ "protocolVersion": "1999-01-01" }),
        );
        let Outcome::Reply { response, .. } = engine.handle(None, req).await else {
            panic!("expected reply");
        };
        assert_eq!(response.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn non_initialize_without_header_is_invalid_request() {
        let engine = engine();
        let req = JsonRpcRequest::new(1, "tools/list", serde_json::json!({}));
        let Outcome::Reply { response, .. } = engine.handle(None, req).await else {
            panic!("expected reply");
        };
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected_without_creating_one() {
        let engine = engine();
        let bogus = SessionId::new("0123456789abcdef0123456789abcdef");
        let req = JsonRpcRequest::new(1, "tools/list", serde_json::json!({}));

        let Outcome::Reply { response, session_id } = engine.handle(Some(&bogus), req).await
        else {
            panic!("expected reply");
        };
        assert_eq!(response.error.unwrap().code, -32001);
        assert!(session_id.is_none());
        assert!(engine.sessions().is_empty());
    }

    #[tokio::test]
    async fn lifecycle_initialize_then_list_then_call() {
        let engine = engine();
        let sid = initialize(&engine).await;

        let req = JsonRpcRequest::new(2, "tools/list", serde_json::json!({}));
        let Outcome::Reply { response, session_id } = engine.handle(Some(&sid), req).await
        else {
            panic!("expected reply");
        };
        assert_eq!(session_id, Some(sid.clone()));
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 2);

        let req = JsonRpcRequest::new(
            3,
            "tools/call",
            serde_json::json!({ "name": "echo", "arguments": { "hello": "world" } }),
        );
        let Outcome::Reply { response, .. } = engine.handle(Some(&sid), req).await else {
            panic!("expected reply");
        };
        let content = &response.result.unwrap()["content"];
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"].as_str().unwrap().contains("world"));
    }

    #[tokio::test]
    async fn ping_answers_empty_object() {
        let engine = engine();
        let sid = initialize(&engine).await;
        let req = JsonRpcRequest::new(2, "ping", serde_json::json!({}));
        let Outcome::Reply { response, .. } = engine.handle(Some(&sid), req).await else {
            panic!("expected reply");
        };
        assert_eq!(response.result.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let engine = engine();
        let sid = initialize(&engine).await;
        let req = JsonRpcRequest::new(2, "resources/list", serde_json::json!({}));
        let Outcome::Reply { response, .. } = engine.handle(Some(&sid), req).await else {
            panic!("expected reply");
        };
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let engine = engine();
        let sid = initialize(&engine).await;
        let req = JsonRpcRequest::new(
            2,
            "tools/call",
            serde_json::json!({ "name": "no_such_tool", "arguments": {} }),
        );
        let Outcome::Reply { response, .. } = engine.handle(Some(&sid), req).await else {
            panic!("expected reply");
        };
        let err = response.error.unwrap();
        assert_eq!(err.code, -32601);
        assert!(err.message.contains("no_such_tool"));
    }

    #[tokio::test]
    async fn missing_call_params_is_invalid_params() {
        let engine = engine();
        let sid = initialize(&engine).await;
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(2)),
            method: "tools/call".to_string(),
            params: None,
        };
        let Outcome::Reply { response, .. } = engine.handle(Some(&sid), req).await else {
            panic!("expected reply");
        };
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn tool_timeout_surfaces_as_protocol_error_and_session_survives() {
        let engine = engine();
        let sid = initialize(&engine).await;

        let req = JsonRpcRequest::new(
            2,
            "tools/call",
            serde_json::json!({ "name": "slow", "arguments": {} }),
        );
        let Outcome::Reply { response, .. } = engine.handle(Some(&sid), req).await else {
            panic!("expected reply");
        };
        let err = response.error.unwrap();
        assert_eq!(err.code, -32003);
        assert_eq!(err.message, "Timeout");

        // Session is still usable after the tool-level failure.
        let req = JsonRpcRequest::new(3, "ping", serde_json::json!({}));
        let Outcome::Reply { response, .. } = engine.handle(Some(&sid), req).await else {
            panic!("expected reply");
        };
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn notifications_are_accepted_without_response() {
        let engine = engine();
        let sid = initialize(&engine).await;

        let note = JsonRpcRequest::notification("notifications/initialized");
        match engine.handle(Some(&sid), note).await {
            Outcome::Accepted { session_id } => assert_eq!(session_id, Some(sid)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn notification_on_unknown_session_is_missing() {
        let engine = engine();
        let note = JsonRpcRequest::notification("notifications/initialized");
        let bogus = SessionId::new("ffffffffffffffffffffffffffffffff");
        assert!(matches!(
            engine.handle(Some(&bogus), note).await,
            Outcome::SessionMissing
        ));
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_invalid_request() {
        let engine = engine();
        let req = JsonRpcRequest {
            jsonrpc: "1.0".to_string(),
            id: Some(serde_json::json!(1)),
            method: "initialize".to_string(),
            params: None,
        };
        let Outcome::Reply { response, .. } = engine.handle(None, req).await else {
            panic!("expected reply");
        };
        assert_eq!(response.error.unwrap().code, -32600);
        assert!(engine.sessions().is_empty());
    }
}
