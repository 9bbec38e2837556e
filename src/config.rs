//! Engine configuration.
//!
//! Per-instance settings for the execution engine, fixed at construction
//! and never mutated during a run. There is no persistent session: every
//! invocation builds its own inventory, collector, and runtime on top of
//! these defaults.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default per-connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Configuration for one [`ExecutionEngine`](crate::executor::ExecutionEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dry-run mode: resolve and validate but make no changes
    pub check: bool,

    /// Maximum number of in-flight per-host executions
    pub forks: usize,

    /// Login user applied when a host record does not carry one
    pub remote_user: String,

    /// Private key file tried when a host record does not carry one
    pub private_key_file: Option<String>,

    /// Extra variables exported into each module's environment
    pub extra_vars: IndexMap<String, JsonValue>,

    /// Per-connection attempt timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check: false,
            forks: default_forks(),
            remote_user: "root".to_string(),
            private_key_file: None,
            extra_vars: IndexMap::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Twice the available processing units, with a floor of two.
pub fn default_forks() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

impl EngineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency width.
    pub fn with_forks(mut self, forks: usize) -> Self {
        self.forks = forks.max(1);
        self
    }

    /// Set the default remote user.
    pub fn with_remote_user(mut self, user: impl Into<String>) -> Self {
        self.remote_user = user.into();
        self
    }

    /// Set the fallback private key file.
    pub fn with_private_key_file(mut self, path: impl Into<String>) -> Self {
        self.private_key_file = Some(path.into());
        self
    }

    /// Enable check mode.
    pub fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Add an extra variable.
    pub fn with_extra_var(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extra_vars.insert(key.into(), value);
        self
    }
}
