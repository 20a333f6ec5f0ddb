use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for an MCP session.
///
/// Generated from 16 bytes of OS randomness (128 bits), hex-encoded so it is
/// safe to echo through the `Mcp-Session-Id` header unescaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(hex::encode(rand::random::<[u8; 16]>()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State tracked for one MCP session, created by a valid `initialize` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Protocol revision negotiated at `initialize`.
    pub protocol_version: String,
    /// Client identity reported in `initialize` params, when present.
    pub client_name: Option<String>,
    pub client_version: Option<String>,
}

impl Session {
    pub fn new(
        id: SessionId,
        protocol_version: String,
        client_name: Option<String>,
        client_version: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: now,
            protocol_version,
            client_name,
            client_version,
        }
    }
}
