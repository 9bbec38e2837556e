//! Inventory management for opsgate.
//!
//! An inventory is built fresh for every incoming request from a flat list
//! of [`HostDescriptor`]s and discarded once the request's work completes;
//! there is no cross-request host cache. It owns every [`HostRecord`] plus a
//! group-name to member-set mapping, and resolves host patterns to concrete
//! host subsets.

pub mod group;
pub mod host;

pub use group::Group;
pub use host::{BecomeSpec, HostDescriptor, HostRecord, DEFAULT_SSH_PORT};

use indexmap::IndexMap;
use thiserror::Error;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("duplicate host: {0}")]
    DuplicateHost(String),

    #[error("host has no resolvable address")]
    MissingAddress,
}

/// Result type for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// The in-memory inventory for one request.
#[derive(Debug, Clone)]
pub struct Inventory {
    /// All records indexed by name, insertion order preserved
    hosts: IndexMap<String, HostRecord>,

    /// All groups indexed by name
    groups: IndexMap<String, Group>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Create a new empty inventory with the default groups.
    ///
    /// "all" and "ungrouped" always exist, even in an empty inventory.
    pub fn new() -> Self {
        let mut inventory = Self {
            hosts: IndexMap::new(),
            groups: IndexMap::new(),
        };

        inventory.groups.insert("all".to_string(), Group::all());
        inventory
            .groups
            .insert("ungrouped".to_string(), Group::ungrouped());

        inventory
    }

    /// Build an inventory from a sequence of descriptors.
    ///
    /// Every host joins "all"; a host with no declared groups joins
    /// "ungrouped"; named groups are auto-created on first sight. Two
    /// descriptors resolving to the same name are rejected outright rather
    /// than silently overwriting each other.
    pub fn build(descriptors: &[HostDescriptor]) -> InventoryResult<Self> {
        let mut inventory = Self::new();
        for descriptor in descriptors {
            inventory.add_descriptor(descriptor)?;
        }
        Ok(inventory)
    }

    /// Add a single descriptor to this inventory.
    pub fn add_descriptor(&mut self, descriptor: &HostDescriptor) -> InventoryResult<()> {
        if descriptor.ip.is_empty() {
            return Err(InventoryError::MissingAddress);
        }

        let record = HostRecord::from_descriptor(descriptor);
        let name = record.name.clone();

        if self.hosts.contains_key(&name) {
            return Err(InventoryError::DuplicateHost(name));
        }

        if let Some(all) = self.groups.get_mut("all") {
            all.add_host(name.clone());
        }

        if descriptor.groups.is_empty() {
            if let Some(ungrouped) = self.groups.get_mut("ungrouped") {
                ungrouped.add_host(name.clone());
            }
        } else {
            for group_name in &descriptor.groups {
                let group = self
                    .groups
                    .entry(group_name.clone())
                    .or_insert_with(|| Group::new(group_name));
                group.add_host(name.clone());
            }
        }

        self.hosts.insert(name, record);
        Ok(())
    }

    /// Get a host by name.
    pub fn get_host(&self, name: &str) -> Option<&HostRecord> {
        self.hosts.get(name)
    }

    /// Get a group by name.
    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// All hosts in insertion order.
    pub fn hosts(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.values()
    }

    /// All groups.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Number of hosts.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of groups, the two defaults included.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Resolve a host pattern to a deterministic, duplicate-free subset.
    ///
    /// "all" returns every host; a group name returns that group's members;
    /// a host name returns the single matching host. An undefined group or
    /// host yields an empty set; "no hosts matched" is a recoverable,
    /// reportable condition, not a hard failure.
    pub fn resolve_hosts(&self, pattern: &str) -> Vec<&HostRecord> {
        let pattern = pattern.trim();

        if pattern.is_empty() {
            return Vec::new();
        }

        if pattern == "all" {
            return self.hosts.values().collect();
        }

        if let Some(group) = self.groups.get(pattern) {
            return group
                .hosts
                .iter()
                .filter_map(|name| self.hosts.get(name))
                .collect();
        }

        if let Some(host) = self.hosts.get(pattern) {
            return vec![host];
        }

        Vec::new()
    }
}
