//! Host definitions for the opsgate inventory.
//!
//! This module provides the externally supplied [`HostDescriptor`] and the
//! normalized [`HostRecord`] the execution engine consumes. A record carries
//! the full variable set required to open a connection and, if requested,
//! escalate privileges on the target.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default SSH port used when a descriptor omits one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connection plugin selection, fixed process-wide. Per-host negotiation is
/// deliberately not supported: every target is reached over the same
/// transport.
pub const CONNECTION_TYPE: &str = "ssh";

/// Variables a descriptor's extra vars are never allowed to shadow.
/// Everything else set during normalization is last-writer-wins; that
/// overridability is a documented property, not something to harden against.
const CONNECTION_CRITICAL_VARS: &[&str] = &["ansible_host", "ansible_port"];

/// Privilege escalation settings supplied with a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BecomeSpec {
    /// Escalation method (sudo, su, doas, ...)
    #[serde(default = "default_become_method")]
    pub method: String,

    /// User to become
    #[serde(default = "default_become_user")]
    pub user: String,

    /// Escalation password
    #[serde(default)]
    pub pass: String,
}

fn default_become_method() -> String {
    "sudo".to_string()
}

fn default_become_user() -> String {
    "root".to_string()
}

impl Default for BecomeSpec {
    fn default() -> Self {
        Self {
            method: default_become_method(),
            user: default_become_user(),
            pass: String::new(),
        }
    }
}

/// An externally supplied description of one target host.
///
/// Descriptors arrive with a request (typically as JSON over the WebSocket
/// boundary) and are consumed exactly once, at inventory-build time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDescriptor {
    /// Display name; the record name falls back to `ip` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Address to connect to
    pub ip: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Login password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Private key file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Privilege escalation settings; absent means escalation is disabled
    #[serde(default, rename = "become", skip_serializing_if = "Option::is_none")]
    pub become_spec: Option<BecomeSpec>,

    /// Group names this host belongs to
    #[serde(default)]
    pub groups: Vec<String>,

    /// Arbitrary extra variables, merged last into the record
    #[serde(default)]
    pub vars: IndexMap<String, JsonValue>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl HostDescriptor {
    /// Create a minimal descriptor for the given address.
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: DEFAULT_SSH_PORT,
            ..Default::default()
        }
    }

    /// The name the resulting record will carry.
    pub fn record_name(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.ip)
    }
}

/// A normalized host as held by the inventory.
///
/// Created once per descriptor at build time and never mutated afterwards;
/// the inventory owns every record exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    /// Host name (hostname, falling back to ip)
    pub name: String,

    /// Connection port
    pub port: u16,

    /// Full variable mapping the engine consumes
    vars: IndexMap<String, JsonValue>,
}

impl HostRecord {
    /// Normalize a descriptor into a record.
    pub fn from_descriptor(desc: &HostDescriptor) -> Self {
        let mut record = Self {
            name: desc.record_name().to_string(),
            port: desc.port,
            vars: IndexMap::new(),
        };

        record.set_required_vars(desc);
        record.merge_extra_vars(&desc.vars);
        record
    }

    /// Connection-protocol selection, address, credentials and escalation
    /// flags. The engine relies on every key set here being present.
    fn set_required_vars(&mut self, desc: &HostDescriptor) {
        self.set_var("ansible_connection", JsonValue::from(CONNECTION_TYPE));

        // Host key verification is disabled by policy: target fleets are
        // assumed pre-vetted, so the transport accepts whatever key the
        // server presents. This is an intentional weakening.
        self.set_var("ansible_ssh_host_key_checking", JsonValue::from(false));

        self.set_var("ansible_host", JsonValue::from(desc.ip.clone()));
        self.set_var("ansible_port", JsonValue::from(desc.port));

        if let Some(user) = &desc.username {
            self.set_var("ansible_user", JsonValue::from(user.clone()));
        }
        if let Some(password) = &desc.password {
            self.set_var("ansible_ssh_pass", JsonValue::from(password.clone()));
        }
        if let Some(key) = &desc.private_key {
            self.set_var(
                "ansible_ssh_private_key_file",
                JsonValue::from(key.clone()),
            );
        }

        // Escalation is explicitly disabled when absent, never left default.
        match &desc.become_spec {
            Some(spec) => {
                self.set_var("ansible_become", JsonValue::from(true));
                self.set_var("ansible_become_method", JsonValue::from(spec.method.clone()));
                self.set_var("ansible_become_user", JsonValue::from(spec.user.clone()));
                self.set_var("ansible_become_pass", JsonValue::from(spec.pass.clone()));
            }
            None => {
                self.set_var("ansible_become", JsonValue::from(false));
            }
        }
    }

    /// Merge descriptor extras last. Extras may shadow anything except the
    /// connection-critical address and port.
    fn merge_extra_vars(&mut self, extras: &IndexMap<String, JsonValue>) {
        for (key, value) in extras {
            if CONNECTION_CRITICAL_VARS.contains(&key.as_str()) {
                continue;
            }
            self.vars.insert(key.clone(), value.clone());
        }
    }

    fn set_var(&mut self, key: &str, value: JsonValue) {
        self.vars.insert(key.to_string(), value);
    }

    /// Get a variable from this record.
    pub fn get_var(&self, key: &str) -> Option<&JsonValue> {
        self.vars.get(key)
    }

    /// The full variable mapping.
    pub fn vars(&self) -> &IndexMap<String, JsonValue> {
        &self.vars
    }

    /// The address to connect to. Always present by construction.
    pub fn address(&self) -> &str {
        self.get_var("ansible_host")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.name)
    }

    /// Login user, if one was supplied.
    pub fn user(&self) -> Option<&str> {
        self.get_var("ansible_user").and_then(|v| v.as_str())
    }

    /// Login password, if one was supplied.
    pub fn password(&self) -> Option<&str> {
        self.get_var("ansible_ssh_pass").and_then(|v| v.as_str())
    }

    /// Private key file path, if one was supplied.
    pub fn private_key_file(&self) -> Option<&str> {
        self.get_var("ansible_ssh_private_key_file")
            .and_then(|v| v.as_str())
    }

    /// Whether privilege escalation is requested for this host.
    pub fn become_enabled(&self) -> bool {
        self.get_var("ansible_become")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Escalation method (meaningful only when escalation is enabled).
    pub fn become_method(&self) -> &str {
        self.get_var("ansible_become_method")
            .and_then(|v| v.as_str())
            .unwrap_or("sudo")
    }

    /// User to escalate to.
    pub fn become_user(&self) -> &str {
        self.get_var("ansible_become_user")
            .and_then(|v| v.as_str())
            .unwrap_or("root")
    }

    /// Escalation password.
    pub fn become_password(&self) -> Option<&str> {
        self.get_var("ansible_become_pass").and_then(|v| v.as_str())
    }
}

impl PartialEq for HostRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for HostRecord {}

impl std::hash::Hash for HostRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for HostRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if self.address() != self.name {
            write!(f, " ({})", self.address())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> HostDescriptor {
        HostDescriptor {
            hostname: Some("git".to_string()),
            ip: "192.168.5.2".to_string(),
            port: 22,
            username: Some("root".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_name_falls_back_to_ip() {
        let mut desc = descriptor();
        desc.hostname = None;
        let record = HostRecord::from_descriptor(&desc);
        assert_eq!(record.name, "192.168.5.2");
    }

    #[test]
    fn test_required_vars() {
        let record = HostRecord::from_descriptor(&descriptor());
        assert_eq!(record.address(), "192.168.5.2");
        assert_eq!(record.port, 22);
        assert_eq!(record.user(), Some("root"));
        assert_eq!(record.password(), Some("secret"));
        assert_eq!(
            record.get_var("ansible_connection"),
            Some(&json!(CONNECTION_TYPE))
        );
        assert_eq!(
            record.get_var("ansible_ssh_host_key_checking"),
            Some(&json!(false))
        );
    }

    #[test]
    fn test_become_absent_is_explicitly_disabled() {
        let record = HostRecord::from_descriptor(&descriptor());
        assert!(!record.become_enabled());
        assert_eq!(record.get_var("ansible_become"), Some(&json!(false)));
    }

    #[test]
    fn test_become_defaults() {
        let mut desc = descriptor();
        desc.become_spec = Some(BecomeSpec::default());
        let record = HostRecord::from_descriptor(&desc);
        assert!(record.become_enabled());
        assert_eq!(record.become_method(), "sudo");
        assert_eq!(record.become_user(), "root");
        assert_eq!(record.become_password(), Some(""));
    }

    #[test]
    fn test_extra_vars_merge_last_but_cannot_shadow_address() {
        let mut desc = descriptor();
        desc.vars.insert("ansible_user".to_string(), json!("alice"));
        desc.vars
            .insert("ansible_host".to_string(), json!("10.0.0.99"));
        desc.vars.insert("love".to_string(), json!("yes"));

        let record = HostRecord::from_descriptor(&desc);
        // Non-critical keys are last-writer-wins.
        assert_eq!(record.user(), Some("alice"));
        assert_eq!(record.get_var("love"), Some(&json!("yes")));
        // Address and port are connection-critical.
        assert_eq!(record.address(), "192.168.5.2");
    }

    #[test]
    fn test_descriptor_deserialization_defaults() {
        let desc: HostDescriptor =
            serde_json::from_value(json!({"ip": "10.1.1.1"})).unwrap();
        assert_eq!(desc.port, DEFAULT_SSH_PORT);
        assert!(desc.groups.is_empty());
        assert!(desc.become_spec.is_none());
    }
}
