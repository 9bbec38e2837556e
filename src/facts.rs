//! Facts summarizer.
//!
//! Reshapes the `ok` bucket of a facts-probe run into normalized host-info
//! records: CPU, memory, disks, filesystems and network interfaces. Any
//! field absent in a host's raw payload surfaces as the string `"unknown"`,
//! never as zero or null, so callers can tell "absent" from "measured zero".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::callback::ResultSet;

/// The absent-field sentinel.
pub const UNKNOWN: &str = "unknown";

/// Block devices counted toward total disk capacity, by two-letter prefix.
const DISK_PREFIXES: &[&str] = &["sd", "hd", "ss", "vd"];

/// Interfaces worth reporting: the usual wired/bonded/infiniband names plus
/// loopback by exact name.
static INTERFACE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(eth|bond|bind|eno|ens|em|ib)\d").unwrap());

/// Summary for one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    /// Inventory name the run was recorded under.
    pub host: String,
    /// Hostname the target itself reported.
    pub hostname: String,
    pub cpu_model: String,
    pub cpu_count: JsonValue,
    pub vcpu_count: JsonValue,
    pub kernel: String,
    pub system: String,
    pub server_model: String,
    pub ram_gb: JsonValue,
    pub swap_gb: JsonValue,
    pub disk_total_gb: JsonValue,
    pub filesystems: Vec<FilesystemInfo>,
    pub interfaces: Vec<InterfaceInfo>,
}

/// One mounted filesystem.
#[derive(Debug, Clone, Serialize)]
pub struct FilesystemInfo {
    pub device: String,
    pub fstype: String,
    pub mount: String,
    pub size_total: JsonValue,
    pub size_available: JsonValue,
}

/// One recognized network interface.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub mac: String,
    pub ipv4: JsonValue,
    pub ipv4_secondaries: Vec<JsonValue>,
    pub ipv6: Vec<JsonValue>,
    #[serde(rename = "type")]
    pub kind: String,
    pub mtu: JsonValue,
    pub active: JsonValue,
    pub speed: JsonValue,
}

/// Summarize every ok outcome of a facts-probe run.
pub fn summarize(results: &ResultSet) -> Vec<HostInfo> {
    results
        .ok
        .iter()
        .map(|record| {
            let facts = record
                .result
                .get("ansible_facts")
                .cloned()
                .unwrap_or(JsonValue::Null);
            summarize_host(&record.host, &facts)
        })
        .collect()
}

/// Reshape one host's raw facts payload.
pub fn summarize_host(host: &str, facts: &JsonValue) -> HostInfo {
    let cpu_model = facts
        .get("ansible_processor")
        .and_then(|v| v.as_array())
        .and_then(|list| list.last())
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let system = match (
        str_fact(facts, "ansible_distribution"),
        str_fact(facts, "ansible_distribution_version"),
        str_fact(facts, "ansible_architecture"),
    ) {
        (d, v, a) if d == UNKNOWN && v == UNKNOWN && a == UNKNOWN => UNKNOWN.to_string(),
        (d, v, a) => format!("{} {} {}", d, v, a),
    };

    HostInfo {
        host: host.to_string(),
        hostname: str_fact(facts, "ansible_hostname"),
        cpu_model,
        cpu_count: value_fact(facts, "ansible_processor_count"),
        vcpu_count: value_fact(facts, "ansible_processor_vcpus"),
        kernel: str_fact(facts, "ansible_kernel"),
        system,
        server_model: str_fact(facts, "ansible_product_name"),
        ram_gb: mb_to_gb(facts.get("ansible_memtotal_mb")),
        swap_gb: mb_to_gb(facts.get("ansible_swaptotal_mb")),
        disk_total_gb: disk_total(facts.get("ansible_devices")),
        filesystems: filesystems(facts.get("ansible_mounts")),
        interfaces: interfaces(facts),
    }
}

/// String field with the unknown sentinel.
fn str_fact(facts: &JsonValue, key: &str) -> String {
    facts
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Pass-through field: present values keep their JSON type, absent fields
/// become the string sentinel so they are never coerced numerically.
fn value_fact(facts: &JsonValue, key: &str) -> JsonValue {
    facts
        .get(key)
        .cloned()
        .unwrap_or_else(|| JsonValue::String(UNKNOWN.to_string()))
}

/// MB to GB, rounded.
fn mb_to_gb(value: Option<&JsonValue>) -> JsonValue {
    match value.and_then(|v| v.as_f64()) {
        Some(mb) => json!((mb / 1024.0).round() as u64),
        None => JsonValue::String(UNKNOWN.to_string()),
    }
}

/// Sum the capacity of recognized block devices. Sizes arrive as strings
/// like "40.00 GB" or "1.00 TB"; a T suffix means 1024x G.
fn disk_total(devices: Option<&JsonValue>) -> JsonValue {
    let Some(devices) = devices.and_then(|v| v.as_object()) else {
        return JsonValue::String(UNKNOWN.to_string());
    };

    let mut total_gb = 0.0f64;
    for (name, device) in devices {
        if name.len() < 2 || !DISK_PREFIXES.contains(&&name[..2]) {
            continue;
        }
        let Some(size) = device.get("size").and_then(|v| v.as_str()) else {
            continue;
        };
        let mut parts = size.split_whitespace();
        let Some(number) = parts.next().and_then(|n| n.parse::<f64>().ok()) else {
            continue;
        };
        let unit = parts.next().unwrap_or("GB");
        let gb = if unit.starts_with('T') {
            number * 1024.0
        } else {
            number
        };
        total_gb += gb;
    }

    json!(total_gb)
}

fn filesystems(mounts: Option<&JsonValue>) -> Vec<FilesystemInfo> {
    let Some(mounts) = mounts.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    mounts
        .iter()
        .map(|m| FilesystemInfo {
            device: m
                .get("device")
                .and_then(|v| v.as_str())
                .unwrap_or(UNKNOWN)
                .to_string(),
            fstype: m
                .get("fstype")
                .and_then(|v| v.as_str())
                .unwrap_or(UNKNOWN)
                .to_string(),
            mount: m
                .get("mount")
                .and_then(|v| v.as_str())
                .unwrap_or(UNKNOWN)
                .to_string(),
            size_total: m
                .get("size_total")
                .cloned()
                .unwrap_or_else(|| JsonValue::String(UNKNOWN.to_string())),
            size_available: m
                .get("size_available")
                .cloned()
                .unwrap_or_else(|| JsonValue::String(UNKNOWN.to_string())),
        })
        .collect()
}

fn interfaces(facts: &JsonValue) -> Vec<InterfaceInfo> {
    let Some(names) = facts.get("ansible_interfaces").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    names
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|name| *name == "lo" || INTERFACE_NAME.is_match(name))
        .map(|name| {
            let iface = facts
                .get(format!("ansible_{}", name))
                .cloned()
                .unwrap_or(JsonValue::Null);

            InterfaceInfo {
                name: name.to_string(),
                mac: str_fact(&iface, "macaddress"),
                ipv4: iface
                    .get("ipv4")
                    .and_then(|v| v.get("address"))
                    .cloned()
                    .unwrap_or_else(|| JsonValue::String(UNKNOWN.to_string())),
                ipv4_secondaries: addresses(iface.get("ipv4_secondaries")),
                ipv6: addresses(iface.get("ipv6")),
                kind: str_fact(&iface, "type"),
                mtu: value_fact(&iface, "mtu"),
                active: value_fact(&iface, "active"),
                speed: value_fact(&iface, "speed"),
            }
        })
        .collect()
}

fn addresses(list: Option<&JsonValue>) -> Vec<JsonValue> {
    list.and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("address").cloned())
                .collect()
        })
        .unwrap_or_default()
}
