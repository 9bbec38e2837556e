//! Route configuration.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};

use super::state::AppState;
use super::websocket;

/// Build the gateway router.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/healthz", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
}

async fn service_info() -> Json<JsonValue> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_router_creation() {
        let state = Arc::new(AppState::new(EngineConfig::default()));
        let _router = api_routes(state);
    }
}
