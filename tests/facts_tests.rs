//! Facts summarizer integration tests: setup-run outcomes recorded through
//! the collector, reshaped into host-info records.

use pretty_assertions::assert_eq;
use serde_json::json;

use opsgate::facts::{summarize, UNKNOWN};
use opsgate::ResultCollector;

fn setup_payload() -> serde_json::Value {
    json!({
        "ansible_facts": {
            "ansible_hostname": "web1.internal",
            "ansible_processor": ["0", "AuthenticAMD", "AMD EPYC 7402P"],
            "ansible_processor_count": 1,
            "ansible_processor_vcpus": 4,
            "ansible_kernel": "6.1.0-18-amd64",
            "ansible_distribution": "Debian",
            "ansible_distribution_version": "12",
            "ansible_architecture": "x86_64",
            "ansible_memtotal_mb": 3931,
            "ansible_swaptotal_mb": 0,
            "ansible_devices": {
                "sda": { "size": "100.00 GB" }
            },
            "ansible_mounts": [
                {
                    "device": "/dev/sda1",
                    "fstype": "ext4",
                    "mount": "/",
                    "size_total": 105226698752u64,
                    "size_available": 80530636800u64
                }
            ],
            "ansible_interfaces": ["eth0", "veth12ab"],
            "ansible_eth0": {
                "macaddress": "52:54:00:11:22:33",
                "mtu": 1500,
                "active": true,
                "type": "ether",
                "ipv4": { "address": "10.0.0.7" }
            }
        },
        "changed": false
    })
}

#[test]
fn test_summarize_collected_setup_run() {
    let collector = ResultCollector::new();
    collector.record_ok("web1", "setup", setup_payload());

    let infos = summarize(&collector.snapshot());
    assert_eq!(infos.len(), 1);

    let info = &infos[0];
    assert_eq!(info.host, "web1");
    assert_eq!(info.hostname, "web1.internal");
    assert_eq!(info.cpu_model, "AMD EPYC 7402P");
    assert_eq!(info.system, "Debian 12 x86_64");
    assert_eq!(info.ram_gb, json!(4));
    assert_eq!(info.swap_gb, json!(0));
    assert_eq!(info.disk_total_gb, json!(100.0));
    assert_eq!(info.filesystems.len(), 1);
    assert_eq!(info.filesystems[0].mount, "/");
    assert_eq!(info.filesystems[0].fstype, "ext4");
    assert_eq!(info.filesystems[0].size_available, json!(80530636800u64));

    // veth interfaces are dropped, eth0 survives
    assert_eq!(info.interfaces.len(), 1);
    assert_eq!(info.interfaces[0].name, "eth0");
    assert_eq!(info.interfaces[0].ipv4, json!("10.0.0.7"));
}

#[test]
fn test_failed_and_unreachable_hosts_are_not_summarized() {
    let collector = ResultCollector::new();
    collector.record_ok("web1", "setup", setup_payload());
    collector.record_failed("web2", "setup", json!({"msg": "facts probe failed", "rc": 1}));
    collector.record_unreachable("web3", "setup", json!({"msg": "timeout", "unreachable": true}));

    let infos = summarize(&collector.snapshot());
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].host, "web1");
}

#[test]
fn test_outcome_without_facts_yields_unknown_fields() {
    let collector = ResultCollector::new();
    collector.record_ok("web1", "shell", json!({"stdout": "hi", "rc": 0}));

    let infos = summarize(&collector.snapshot());
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].cpu_model, UNKNOWN);
    assert_eq!(infos[0].system, UNKNOWN);
    assert_eq!(infos[0].ram_gb, json!(UNKNOWN));
    assert!(infos[0].filesystems.is_empty());
}
