//! opsgate: a remote command/playbook execution gateway.
//!
//! A web-facing service that accepts a target host description plus a
//! command or playbook, connects over SSH, runs the work through a small
//! module catalog, and returns structured per-host outcomes (ok / failed /
//! unreachable) over a WebSocket.
//!
//! The orchestration core:
//!
//! - [`inventory`]: host records and group topology, built fresh per request
//! - [`callback`]: the result collector and its three outcome buckets
//! - [`safety`]: the deny-list filter guarding user-supplied text
//! - [`executor`]: the engine (fan-out, forks limit, guaranteed teardown)
//! - [`modules`]: the module catalog invoked by name
//! - [`connection`]: the transport boundary (SSH, local, test doubles)
//! - [`facts`]: the facts-probe summarizer
//! - [`api`]: the axum WebSocket gateway

pub mod api;
pub mod callback;
pub mod config;
pub mod connection;
pub mod executor;
pub mod facts;
pub mod inventory;
pub mod modules;
pub mod safety;

pub use callback::{OutcomeRecord, OutcomeStatus, ResultCollector, ResultSet};
pub use config::EngineConfig;
pub use executor::{ExecutionEngine, RejectionNotice};
pub use inventory::{HostDescriptor, HostRecord, Inventory};
pub use safety::{DenyListFilter, SafetyFilter};
