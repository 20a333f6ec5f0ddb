use anyhow::Result;
use clap::Parser;

mod api;
mod config;
mod middleware;

use config::{AppState, ServerConfig};
use trustydata_mcp::PROTOCOL_VERSION;

#[derive(Parser, Debug)]
#[command(name = "trustydata-mcp-server")]
#[command(about = "Remote MCP server exposing TrustyData locality search (Streamable HTTP)", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8500")]
    port: u16,

    /// Idle session TTL in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "3600")]
    session_ttl: u64,

    /// Deadline for outbound TrustyData calls, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "30")]
    upstream_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trustydata=info,tower_http=debug".into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = ServerConfig::from_env(args.session_ttl, args.upstream_timeout)?;

    tracing::info!("Starting TrustyData MCP server");
    tracing::info!("Protocol version: {}", PROTOCOL_VERSION);
    tracing::info!("TrustyData API base URL: {}", config.api_base_url);

    if !config.auth.is_enabled() {
        tracing::warn!("SERVER_AUTH_TOKEN not set - authentication disabled");
        tracing::warn!("set SERVER_AUTH_TOKEN for production deployments");
    }

    let state = AppState::new(&config)?;

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("MCP endpoint: http://{}/mcp", addr);

    api::serve(&addr, state).await?;

    Ok(())
}
