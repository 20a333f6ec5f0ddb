use thiserror::Error;

use crate::types::SessionId;

/// Error taxonomy for the gateway core.
///
/// Transport maps these onto HTTP status + JSON-RPC error codes; nothing is
/// silently swallowed.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid bearer token while auth is enabled.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Body is not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structurally valid JSON that is not a valid JSON-RPC 2.0 envelope,
    /// or an unsupported protocol version header.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown or expired session id on a non-initialize call.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Unknown RPC method or unknown tool name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Tool arguments violate the tool's input contract.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The data provider answered with a network error or non-2xx status.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// The outbound provider call exceeded its deadline.
    #[error("Timeout")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// JSON-RPC error code for this failure class.
    ///
    /// Standard codes where JSON-RPC defines one; the -32000..-32099
    /// implementation-defined range for gateway-specific classes.
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            GatewayError::Parse(_) => -32700,
            GatewayError::InvalidRequest(_) | GatewayError::Unauthenticated => -32600,
            GatewayError::MethodNotFound(_) => -32601,
            GatewayError::InvalidParams(_) => -32602,
            GatewayError::Internal(_) => -32603,
            GatewayError::SessionNotFound(_) => -32001,
            GatewayError::Upstream(_) => -32002,
            GatewayError::Timeout => -32003,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_is_bare() {
        // Clients render this message verbatim on tool-call deadline misses.
        assert_eq!(GatewayError::Timeout.to_string(), "Timeout");
        assert_eq!(GatewayError::Timeout.jsonrpc_code(), -32003);
    }

    #[test]
    fn standard_codes_are_the_jsonrpc_ones() {
        assert_eq!(GatewayError::Parse("x".into()).jsonrpc_code(), -32700);
        assert_eq!(GatewayError::InvalidRequest("x".into()).jsonrpc_code(), -32600);
        assert_eq!(GatewayError::MethodNotFound("x".into()).jsonrpc_code(), -32601);
        assert_eq!(GatewayError::InvalidParams("x".into()).jsonrpc_code(), -32602);
    }
}
