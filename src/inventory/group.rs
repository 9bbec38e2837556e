//! Group definition for the opsgate inventory.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A named grouping of hosts.
///
/// Membership is by host name; the owning [`Inventory`](super::Inventory)
/// maps names back to records. Insertion order is preserved so pattern
/// resolution stays deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Group name
    pub name: String,

    /// Host names belonging to this group
    #[serde(default)]
    pub hosts: IndexSet<String>,
}

impl Group {
    /// Create a new empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hosts: IndexSet::new(),
        }
    }

    /// Create the special "all" group.
    pub fn all() -> Self {
        Self::new("all")
    }

    /// Create the special "ungrouped" group.
    pub fn ungrouped() -> Self {
        Self::new("ungrouped")
    }

    /// Add a host to this group.
    pub fn add_host(&mut self, host: impl Into<String>) {
        self.hosts.insert(host.into());
    }

    /// Check if a host belongs to this group.
    pub fn has_host(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    /// Number of member hosts.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} hosts)", self.name, self.hosts.len())
    }
}
