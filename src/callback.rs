//! Per-run outcome collection.
//!
//! The [`ResultCollector`] is the sink the execution engine routes every
//! per-host outcome into. One collector is constructed per request and
//! passed explicitly into the engine call; collectors are never reused or
//! shared across requests, so concurrent requests cannot leak results into
//! each other. Within a run, appends arrive concurrently from the per-host
//! workers and serialize through an internal mutex.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Classification of one per-host, per-task outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Task completed successfully
    Ok,
    /// Task ran but reported failure
    Failed,
    /// Host could not be contacted
    Unreachable,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Ok => write!(f, "ok"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// One (host, task) outcome, produced exactly once by the engine's callback
/// protocol and immutable after creation.
///
/// The serialized shape is the gateway's wire contract:
/// `{host, task_name, result, success, msg}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Host the task ran against
    pub host: String,

    /// Task name
    pub task_name: String,

    /// Raw result payload from the module
    pub result: JsonValue,

    /// Whether the task succeeded
    pub success: bool,

    /// Status bucket this record belongs to
    #[serde(rename = "msg")]
    pub status: OutcomeStatus,
}

impl OutcomeRecord {
    fn new(
        host: impl Into<String>,
        task_name: impl Into<String>,
        result: JsonValue,
        status: OutcomeStatus,
    ) -> Self {
        Self {
            host: host.into(),
            task_name: task_name.into(),
            result,
            success: status == OutcomeStatus::Ok,
            status,
        }
    }
}

/// The aggregated outcomes of one run.
///
/// Three arrival-ordered buckets plus a single optional global error, set
/// only when the host pattern matched zero hosts. Never merged across
/// requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// Successful outcomes
    pub ok: Vec<OutcomeRecord>,

    /// Failed outcomes
    pub failed: Vec<OutcomeRecord>,

    /// Unreachable outcomes
    pub unreachable: Vec<OutcomeRecord>,

    /// Global "no hosts matched" condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultSet {
    /// Whether the run produced no outcomes and no global error.
    pub fn is_empty(&self) -> bool {
        self.ok.is_empty()
            && self.failed.is_empty()
            && self.unreachable.is_empty()
            && self.error.is_none()
    }

    /// Total number of per-host outcomes across all buckets.
    pub fn len(&self) -> usize {
        self.ok.len() + self.failed.len() + self.unreachable.len()
    }

    /// The first available outcome, preferring ok > failed > unreachable.
    pub fn first_outcome(&self) -> Option<&OutcomeRecord> {
        self.ok
            .first()
            .or_else(|| self.failed.first())
            .or_else(|| self.unreachable.first())
    }
}

/// Message recorded when a pattern resolves to zero hosts.
pub const NO_HOSTS_MATCHED: &str = "skipping: no hosts matched";

/// Thread-safe outcome sink for one run.
#[derive(Debug, Default)]
pub struct ResultCollector {
    inner: Mutex<ResultSet>,
}

impl ResultCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful outcome.
    pub fn record_ok(&self, host: &str, task_name: &str, result: JsonValue) {
        let record = OutcomeRecord::new(host, task_name, result, OutcomeStatus::Ok);
        self.inner.lock().ok.push(record);
    }

    /// Record a failed outcome.
    pub fn record_failed(&self, host: &str, task_name: &str, result: JsonValue) {
        let record = OutcomeRecord::new(host, task_name, result, OutcomeStatus::Failed);
        self.inner.lock().failed.push(record);
    }

    /// Record an unreachable outcome.
    pub fn record_unreachable(&self, host: &str, task_name: &str, result: JsonValue) {
        let record = OutcomeRecord::new(host, task_name, result, OutcomeStatus::Unreachable);
        self.inner.lock().unreachable.push(record);
    }

    /// Record the global "no hosts matched" condition. Implies zero per-host
    /// outcomes for the run.
    pub fn record_no_hosts_matched(&self) {
        self.inner.lock().error = Some(NO_HOSTS_MATCHED.to_string());
    }

    /// A snapshot of the current state. Safe to call before execution fully
    /// completes; the caller gets a consistent copy either way.
    pub fn snapshot(&self) -> ResultSet {
        self.inner.lock().clone()
    }

    /// The first available outcome serialized to JSON, falling back to the
    /// global error string. Returns `None` on a completely empty run.
    pub fn first_result_json(&self) -> Option<String> {
        let set = self.inner.lock();
        if let Some(record) = set.first_outcome() {
            return serde_json::to_string(record).ok();
        }
        set.error
            .as_ref()
            .map(|e| serde_json::json!({ "error": e }).to_string())
    }
}
