use crate::config::AppState;
use crate::middleware::auth;
use anyhow::Result;
use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use trustydata_mcp::PROTOCOL_VERSION;

pub mod handlers;

/// How often the background task drops idle sessions. Expiry is already lazy
/// on lookup; the sweep only bounds growth from clients that never return.
const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Start the MCP server
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper.sessions.sweep();
            if removed > 0 {
                tracing::info!("swept {} expired session(s)", removed);
            }
        }
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the router
pub fn create_router(state: AppState) -> Router {
    let mcp = Router::new()
        .route(
            "/mcp",
            axum::routing::post(handlers::mcp_post)
                .get(handlers::mcp_get)
                .delete(handlers::mcp_delete),
        )
        // Auth runs before any session or protocol logic.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(mcp)
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new()),
        )
        // claude.ai connectors call from the browser origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe: no auth, never used by MCP clients.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "trustydata-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_version": PROTOCOL_VERSION,
        "sessions": state.sessions.len(),
    }))
}
