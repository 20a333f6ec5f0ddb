use anyhow::{bail, Result};
use chrono::Duration;
use std::sync::Arc;
use trustydata_core::SessionStore;
use trustydata_mcp::protocol::ServerInfo;
use trustydata_mcp::tools::{SearchLocalitiesTool, ToolRegistry};
use trustydata_mcp::ProtocolEngine;

/// Bearer authentication, selected once at startup.
///
/// The two-variant form keeps the insecure fallback explicit instead of a
/// nullable token threaded through handlers.
#[derive(Debug, Clone)]
pub enum AuthMode {
    Enabled { token: String },
    Disabled,
}

impl AuthMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, AuthMode::Enabled { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the TrustyData API.
    pub api_base_url: String,
    /// Provider API key. Absence is fatal at startup.
    pub api_key: String,
    pub auth: AuthMode,
    pub session_ttl: Duration,
    pub upstream_timeout: std::time::Duration,
}

impl ServerConfig {
    /// Load configuration from the environment.
    ///
    /// `TRUSTYDATA_API_KEY` is required; `SERVER_AUTH_TOKEN` absence selects
    /// insecure mode, which the caller is expected to log loudly.
    pub fn from_env(session_ttl_secs: u64, upstream_timeout_secs: u64) -> Result<Self> {
        Self::from_values(
            std::env::var("TRUSTYDATA_API_KEY").ok(),
            std::env::var("SERVER_AUTH_TOKEN").ok(),
            std::env::var("API_BASE_URL").ok(),
            session_ttl_secs,
            upstream_timeout_secs,
        )
    }

    /// Build a configuration from already-read values. Empty strings count
    /// as absent, matching how empty environment variables are treated.
    fn from_values(
        api_key: Option<String>,
        auth_token: Option<String>,
        api_base_url: Option<String>,
        session_ttl_secs: u64,
        upstream_timeout_secs: u64,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) if !key.is_empty() => key,
            _ => bail!("TRUSTYDATA_API_KEY environment variable not set"),
        };

        let auth = match auth_token {
            Some(token) if !token.is_empty() => AuthMode::Enabled { token },
            _ => AuthMode::Disabled,
        };

        Ok(Self {
            api_base_url: api_base_url
                .unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
            api_key,
            auth,
            session_ttl: Duration::seconds(session_ttl_secs as i64),
            upstream_timeout: std::time::Duration::from_secs(upstream_timeout_secs),
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub engine: Arc<ProtocolEngine>,
    pub auth: AuthMode,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let sessions = Arc::new(SessionStore::new(config.session_ttl));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SearchLocalitiesTool::new(
            config.api_base_url.clone(),
            config.api_key.clone(),
            config.upstream_timeout,
        )?));

        let engine = Arc::new(ProtocolEngine::new(
            ServerInfo {
                name: "trustydata-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            sessions.clone(),
            Arc::new(registry),
        ));

        Ok(Self {
            sessions,
            engine,
            auth: config.auth.clone(),
        })
    }
}
