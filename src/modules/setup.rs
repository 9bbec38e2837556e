//! `setup` module: gather facts from the target.
//!
//! One shell script runs on the target and emits marked sections; the
//! gateway parses the output into an `ansible_facts`-shaped JSON object.
//! Keys follow the Ansible naming so downstream summarizers can consume
//! the payload unchanged.

use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

use super::{ModuleError, ModuleOutput, ModuleResult};
use crate::connection::{Connection, ExecuteOptions};

/// Marker prefix separating sections in the script output.
const SECTION_MARKER: &str = "===";

/// The probe script. Every section is best-effort; a missing file just
/// leaves its section empty.
const FACTS_SCRIPT: &str = r#"
echo '===hostname'; uname -n
echo '===kernel'; uname -r
echo '===machine'; uname -m
echo '===os-release'; cat /etc/os-release 2>/dev/null
echo '===cpuinfo'; cat /proc/cpuinfo 2>/dev/null
echo '===meminfo'; cat /proc/meminfo 2>/dev/null
echo '===product'; cat /sys/class/dmi/id/product_name 2>/dev/null
echo '===devices'; for d in /sys/block/*; do [ -e "$d" ] && echo "$(basename "$d") $(cat "$d/size" 2>/dev/null)"; done
echo '===mounts'; df -P -T -k 2>/dev/null | tail -n +2
echo '===interfaces'; for i in /sys/class/net/*; do [ -e "$i" ] && echo "$(basename "$i")|$(cat "$i/address" 2>/dev/null)|$(cat "$i/mtu" 2>/dev/null)|$(cat "$i/operstate" 2>/dev/null)|$(cat "$i/speed" 2>/dev/null)"; done
echo '===addrs'; ip -o addr 2>/dev/null
"#;

/// Run the probe script and shape its output into facts.
pub async fn gather_facts(
    conn: &Arc<dyn Connection>,
    options: ExecuteOptions,
) -> ModuleResult<ModuleOutput> {
    let result = conn
        .execute(FACTS_SCRIPT, Some(options))
        .await
        .map_err(|e| ModuleError::ExecutionFailed(e.to_string()))?;

    if !result.success {
        return Ok(ModuleOutput {
            result: json!({
                "msg": "fact gathering failed",
                "stderr": result.stderr.trim_end(),
                "rc": result.exit_code,
            }),
            failed: true,
        });
    }

    let facts = parse_facts(&result.stdout);
    Ok(ModuleOutput {
        result: json!({
            "ansible_facts": facts,
            "changed": false,
        }),
        failed: false,
    })
}

/// Split the script output into named sections.
fn split_sections(output: &str) -> Vec<(String, Vec<String>)> {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();

    for line in output.lines() {
        if let Some(name) = line.strip_prefix(SECTION_MARKER) {
            sections.push((name.trim().to_string(), Vec::new()));
        } else if let Some((_, lines)) = sections.last_mut() {
            lines.push(line.to_string());
        }
    }

    sections
}

/// Assemble the ansible_facts object from the raw sections.
pub(crate) fn parse_facts(output: &str) -> JsonValue {
    let mut facts = Map::new();

    let sections = split_sections(output);
    let section = |name: &str| -> Vec<String> {
        sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, lines)| lines.clone())
            .unwrap_or_default()
    };

    if let Some(hostname) = section("hostname").first() {
        facts.insert("ansible_hostname".into(), json!(hostname.trim()));
    }
    if let Some(kernel) = section("kernel").first() {
        facts.insert("ansible_kernel".into(), json!(kernel.trim()));
    }
    if let Some(machine) = section("machine").first() {
        facts.insert("ansible_architecture".into(), json!(machine.trim()));
    }

    let (dist, version) = parse_os_release(&section("os-release"));
    if let Some(dist) = dist {
        facts.insert("ansible_distribution".into(), json!(dist));
    }
    if let Some(version) = version {
        facts.insert("ansible_distribution_version".into(), json!(version));
    }

    let (models, sockets, vcpus) = parse_cpuinfo(&section("cpuinfo"));
    facts.insert("ansible_processor".into(), json!(models));
    facts.insert("ansible_processor_count".into(), json!(sockets));
    facts.insert("ansible_processor_vcpus".into(), json!(vcpus));

    let (mem_mb, swap_mb) = parse_meminfo(&section("meminfo"));
    facts.insert("ansible_memtotal_mb".into(), json!(mem_mb));
    facts.insert("ansible_swaptotal_mb".into(), json!(swap_mb));

    let product = section("product").join(" ");
    let product = product.trim();
    if !product.is_empty() {
        facts.insert("ansible_product_name".into(), json!(product));
    }

    facts.insert("ansible_devices".into(), parse_devices(&section("devices")));
    facts.insert("ansible_mounts".into(), parse_mounts(&section("mounts")));

    let (names, per_interface) = parse_interfaces(&section("interfaces"), &section("addrs"));
    facts.insert("ansible_interfaces".into(), json!(names));
    for (name, value) in per_interface {
        facts.insert(format!("ansible_{}", name), value);
    }

    JsonValue::Object(facts)
}

fn parse_os_release(lines: &[String]) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut version = None;
    for line in lines {
        if let Some(v) = line.strip_prefix("NAME=") {
            name = Some(v.trim_matches('"').to_string());
        } else if let Some(v) = line.strip_prefix("VERSION_ID=") {
            version = Some(v.trim_matches('"').to_string());
        }
    }
    (name, version)
}

/// Returns (model list, socket count, vcpu count). The model list follows
/// the Ansible convention of the model name appearing last.
fn parse_cpuinfo(lines: &[String]) -> (Vec<String>, u64, u64) {
    let mut models = Vec::new();
    let mut physical_ids = Vec::new();
    let mut vcpus = 0u64;

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "processor" => vcpus += 1,
            "model name" => models.push(value.to_string()),
            "physical id" => {
                if !physical_ids.contains(&value.to_string()) {
                    physical_ids.push(value.to_string());
                }
            }
            _ => {}
        }
    }

    let sockets = if physical_ids.is_empty() {
        u64::from(vcpus > 0)
    } else {
        physical_ids.len() as u64
    };

    (models, sockets, vcpus)
}

/// Returns (memtotal_mb, swaptotal_mb).
fn parse_meminfo(lines: &[String]) -> (u64, u64) {
    let mut mem_kb = 0u64;
    let mut swap_kb = 0u64;

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let kb = value
            .trim()
            .trim_end_matches(" kB")
            .trim()
            .parse::<u64>()
            .unwrap_or(0);
        match key.trim() {
            "MemTotal" => mem_kb = kb,
            "SwapTotal" => swap_kb = kb,
            _ => {}
        }
    }

    (mem_kb / 1024, swap_kb / 1024)
}

/// `/sys/block` sizes are 512-byte sectors; render them the way Ansible
/// does, as "N.NN GB" / "N.NN TB" strings.
fn parse_devices(lines: &[String]) -> JsonValue {
    let mut devices = Map::new();

    for line in lines {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else { continue };
        let sectors: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let gb = (sectors as f64) * 512.0 / 1024.0 / 1024.0 / 1024.0;
        let size = if gb >= 1024.0 {
            format!("{:.2} TB", gb / 1024.0)
        } else {
            format!("{:.2} GB", gb)
        };
        devices.insert(name.to_string(), json!({ "size": size }));
    }

    JsonValue::Object(devices)
}

/// `df -P -T -k` body lines into mount entries. Columns are
/// device, fstype, size, used, available, capacity, mount point.
fn parse_mounts(lines: &[String]) -> JsonValue {
    let mut mounts = Vec::new();

    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 7 {
            continue;
        }
        let size_kb: u64 = parts[2].parse().unwrap_or(0);
        let avail_kb: u64 = parts[4].parse().unwrap_or(0);
        mounts.push(json!({
            "device": parts[0],
            "fstype": parts[1],
            "mount": parts[6],
            "size_total": size_kb * 1024,
            "size_available": avail_kb * 1024,
        }));
    }

    JsonValue::Array(mounts)
}

/// Interface lines are `name|mac|mtu|operstate|speed`; addresses come from
/// `ip -o addr` output.
fn parse_interfaces(
    lines: &[String],
    addr_lines: &[String],
) -> (Vec<String>, Vec<(String, JsonValue)>) {
    let mut names = Vec::new();
    let mut per_interface = Vec::new();

    for line in lines {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.is_empty() || parts[0].is_empty() {
            continue;
        }
        let name = parts[0].to_string();
        let mac = parts.get(1).copied().unwrap_or("");
        let mtu: u64 = parts
            .get(2)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let operstate = parts.get(3).copied().unwrap_or("").trim();
        let speed = parts.get(4).and_then(|s| s.trim().parse::<i64>().ok());

        let (ipv4, ipv4_secondaries, ipv6) = addresses_for(&name, addr_lines);

        let mut iface = Map::new();
        iface.insert("device".into(), json!(name));
        iface.insert("macaddress".into(), json!(mac.trim()));
        iface.insert("mtu".into(), json!(mtu));
        iface.insert("active".into(), json!(operstate == "up" || name == "lo"));
        iface.insert(
            "type".into(),
            json!(if name == "lo" { "loopback" } else { "ether" }),
        );
        if let Some(speed) = speed {
            iface.insert("speed".into(), json!(speed));
        }
        if let Some(first) = ipv4.first() {
            iface.insert("ipv4".into(), json!({ "address": first }));
        }
        if !ipv4_secondaries.is_empty() {
            let entries: Vec<JsonValue> = ipv4_secondaries
                .iter()
                .map(|a| json!({ "address": a }))
                .collect();
            iface.insert("ipv4_secondaries".into(), json!(entries));
        }
        if !ipv6.is_empty() {
            let entries: Vec<JsonValue> =
                ipv6.iter().map(|a| json!({ "address": a })).collect();
            iface.insert("ipv6".into(), json!(entries));
        }

        per_interface.push((name.clone(), JsonValue::Object(iface)));
        names.push(name);
    }

    (names, per_interface)
}

/// Pull v4 and v6 addresses for one device out of `ip -o addr` output.
/// The first v4 address is primary, the rest are secondaries.
fn addresses_for(device: &str, addr_lines: &[String]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();

    for line in addr_lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        // index device family address/prefix ...
        if parts.len() < 4 || parts[1] != device {
            continue;
        }
        let address = parts[3].split('/').next().unwrap_or("").to_string();
        match parts[2] {
            "inet" => v4.push(address),
            "inet6" => v6.push(address),
            _ => {}
        }
    }

    let secondaries = if v4.len() > 1 {
        v4[1..].to_vec()
    } else {
        Vec::new()
    };
    (v4, secondaries, v6)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
===hostname\n\
web01\n\
===kernel\n\
5.15.0-91-generic\n\
===machine\n\
x86_64\n\
===os-release\n\
NAME=\"Ubuntu\"\n\
VERSION_ID=\"22.04\"\n\
===cpuinfo\n\
processor\t: 0\n\
physical id\t: 0\n\
model name\t: Intel(R) Xeon(R) CPU E5-2680\n\
processor\t: 1\n\
physical id\t: 0\n\
model name\t: Intel(R) Xeon(R) CPU E5-2680\n\
===meminfo\n\
MemTotal:        8167548 kB\n\
SwapTotal:       2097148 kB\n\
===product\n\
VMware Virtual Platform\n\
===devices\n\
sda 83886080\n\
===mounts\n\
/dev/sda1 ext4 41152736 8123456 30912944 21% /\n\
===interfaces\n\
lo|00:00:00:00:00:00|65536|unknown|\n\
eth0|52:54:00:aa:bb:cc|1500|up|1000\n\
===addrs\n\
1: lo    inet 127.0.0.1/8 scope host lo\n\
2: eth0    inet 192.168.5.2/24 brd 192.168.5.255 scope global eth0\n\
2: eth0    inet6 fe80::5054:ff:feaa:bbcc/64 scope link\n\
";

    #[test]
    fn test_parse_facts_core_fields() {
        let facts = parse_facts(SAMPLE);
        assert_eq!(facts["ansible_hostname"], "web01");
        assert_eq!(facts["ansible_kernel"], "5.15.0-91-generic");
        assert_eq!(facts["ansible_distribution"], "Ubuntu");
        assert_eq!(facts["ansible_distribution_version"], "22.04");
        assert_eq!(facts["ansible_processor_count"], 1);
        assert_eq!(facts["ansible_processor_vcpus"], 2);
        assert_eq!(facts["ansible_memtotal_mb"], 7976);
        assert_eq!(facts["ansible_swaptotal_mb"], 2047);
        assert_eq!(facts["ansible_product_name"], "VMware Virtual Platform");
    }

    #[test]
    fn test_parse_facts_devices_and_mounts() {
        let facts = parse_facts(SAMPLE);
        assert_eq!(facts["ansible_devices"]["sda"]["size"], "40.00 GB");
        let mount = &facts["ansible_mounts"][0];
        assert_eq!(mount["mount"], "/");
        assert_eq!(mount["fstype"], "ext4");
        assert_eq!(mount["size_total"], 41152736u64 * 1024);
        assert_eq!(mount["size_available"], 30912944u64 * 1024);
    }

    #[test]
    fn test_parse_facts_interfaces() {
        let facts = parse_facts(SAMPLE);
        let names: Vec<&str> = facts["ansible_interfaces"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["lo", "eth0"]);
        assert_eq!(facts["ansible_eth0"]["ipv4"]["address"], "192.168.5.2");
        assert_eq!(facts["ansible_eth0"]["active"], true);
        assert_eq!(facts["ansible_lo"]["type"], "loopback");
    }

    #[test]
    fn test_missing_product_name_is_omitted() {
        let facts = parse_facts("===hostname\nh\n===product\n\n");
        assert!(facts.get("ansible_product_name").is_none());
    }
}
