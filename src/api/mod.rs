//! The web-facing gateway.
//!
//! A small axum application: a service-info route, a health check, and the
//! WebSocket execution endpoint that drives the engine. The transport layer
//! is deliberately thin; all semantics live in the engine and its
//! collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! use opsgate::api::{ApiConfig, ApiServer};
//! use opsgate::config::EngineConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ApiServer::new(ApiConfig::default(), EngineConfig::default());
//!     server.run().await.unwrap();
//! }
//! ```

pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;
pub use types::{ErrorReply, ExecRequest, MultiExecRequest, WsRequest};

use crate::config::EngineConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,
    /// Whether to enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    pub fn with_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }
}

/// The gateway server.
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, engine_config: EngineConfig) -> Self {
        let state = Arc::new(AppState::new(engine_config));
        Self { config, state }
    }

    /// Server over pre-built state.
    pub fn with_state(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes and layers.
    pub fn router(&self) -> Router {
        let mut app = routes::api_routes(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the process exits.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let addr = self.config.bind_address;
        let router = self.router();

        info!("starting gateway on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router).await
    }
}
