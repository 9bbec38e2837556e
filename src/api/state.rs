//! Shared application state.

use crate::config::EngineConfig;
use crate::executor::ExecutionEngine;

/// State shared by every handler: the engine and its configuration.
///
/// Deliberately small: inventories, collectors, and runtimes are built
/// fresh per request, never held here.
pub struct AppState {
    engine: ExecutionEngine,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: ExecutionEngine::new(config),
        }
    }

    /// Use a pre-built engine (tests swap in canned transports this way).
    pub fn with_engine(engine: ExecutionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }
}
