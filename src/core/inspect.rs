//! Post-run verification of the hardened artifacts.
//!
//! Read-only: every check inspects the target root and reports PASS/WARN/FAIL.

use crate::constants;
use crate::core::paths::HostPaths;
use crate::core::render;
use crate::core::sshd;
use crate::models::compose::{BindMount, ComposeFile};
use crate::models::host_config::HostConfig;
use crate::util::fs as host_fs;
use crate::util::privilege;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Warn,
    Fail,
}

impl Status {
    pub fn tag(&self) -> &'static str {
        match self {
            Status::Pass => "[PASS]",
            Status::Warn => "[WARN]",
            Status::Fail => "[FAIL]",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: String,
    pub status: Status,
    pub detail: String,
}

impl Check {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, Status::Pass, detail)
    }

    pub fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, Status::Warn, detail)
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, Status::Fail, detail)
    }

    fn new(name: impl Into<String>, status: Status, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

/// Run every artifact check.
pub fn verify_all(config: &HostConfig, paths: &HostPaths) -> Vec<Check> {
    let mut checks = Vec::new();
    checks.extend(verify_sshd(config, paths));
    checks.push(verify_sysctl(config, paths));
    checks.push(verify_daemon_json(paths));
    checks.extend(verify_directories(config, paths));
    checks.extend(verify_manifest(config, paths));
    checks
}

pub fn verify_sshd(config: &HostConfig, paths: &HostPaths) -> Vec<Check> {
    let content = match fs::read_to_string(&paths.sshd_config) {
        Ok(c) => c,
        Err(e) => {
            return vec![Check::fail(
                "sshd_config",
                format!("cannot read {}: {}", paths.sshd_config.display(), e),
            )]
        }
    };

    let mut checks = Vec::new();
    for directive in sshd::hardening_directives(config.host.ssh_port) {
        let values = sshd::active_values(&content, &directive.key);
        let name = format!("sshd {}", directive.key);
        let check = match values.as_slice() {
            [value] if value.eq_ignore_ascii_case(&directive.value) => {
                Check::pass(name, format!("{} {}", directive.key, value))
            }
            [value] => Check::fail(
                name,
                format!("{} is '{}' (expected '{}')", directive.key, value, directive.value),
            ),
            [] => Check::fail(name, format!("{} not set", directive.key)),
            many => Check::fail(
                name,
                format!("{} active lines for {} (expected exactly one)", many.len(), directive.key),
            ),
        };
        checks.push(check);

        for (file, value) in dropin_overrides(&paths.sshd_dropin_dir, &directive.key) {
            if !value.eq_ignore_ascii_case(&directive.value) {
                checks.push(Check::warn(
                    format!("sshd {} override", directive.key),
                    format!("{} sets {} {}; drop-ins included first take precedence", file, directive.key, value),
                ));
            }
        }
    }
    checks
}

fn dropin_overrides(dir: &Path, key: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    let mut files: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("conf"))
        .collect();
    files.sort();
    for file in files {
        if let Ok(content) = fs::read_to_string(&file) {
            for value in sshd::active_values(&content, key) {
                found.push((file.display().to_string(), value));
            }
        }
    }
    found
}

pub fn verify_sysctl(config: &HostConfig, paths: &HostPaths) -> Check {
    let path = paths.sysctl_dropin(&config.host.service_name);
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => return Check::fail("sysctl drop-in", format!("cannot read {}: {}", path.display(), e)),
    };

    let mut found: Vec<(String, String)> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        match line.split_once('=') {
            Some((k, v)) => found.push((k.trim().to_string(), v.trim().to_string())),
            None => return Check::fail("sysctl drop-in", format!("malformed line '{}'", line)),
        }
    }

    let expected: Vec<(String, String)> = constants::SYSCTL_SETTINGS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut found_sorted = found.clone();
    found_sorted.sort();
    let mut expected_sorted = expected.clone();
    expected_sorted.sort();

    if found_sorted == expected_sorted {
        Check::pass("sysctl drop-in", format!("{} settings in {}", found.len(), path.display()))
    } else {
        let missing: Vec<String> = expected
            .iter()
            .filter(|e| !found.contains(e))
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        Check::fail(
            "sysctl drop-in",
            format!(
                "{} settings found (expected {}); missing or different: {}",
                found.len(),
                expected.len(),
                if missing.is_empty() { "-".to_string() } else { missing.join(", ") }
            ),
        )
    }
}

pub fn verify_daemon_json(paths: &HostPaths) -> Check {
    let name = "daemon.json";
    let content = match fs::read_to_string(&paths.daemon_json) {
        Ok(c) => c,
        Err(e) => return Check::fail(name, format!("cannot read {}: {}", paths.daemon_json.display(), e)),
    };
    let actual: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => return Check::fail(name, format!("invalid JSON: {}", e)),
    };
    let expected: serde_json::Value = match render::daemon_json()
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
    {
        Some(v) => v,
        None => return Check::fail(name, "cannot render expected daemon.json"),
    };
    if actual == expected {
        Check::pass(name, "icc=false userns-remap=default no-new-privileges=true live-restore=true")
    } else {
        Check::fail(name, format!("content {} (expected {})", actual, expected))
    }
}

pub fn verify_directories(config: &HostConfig, paths: &HostPaths) -> Vec<Check> {
    let service = &config.host.service_name;
    let gid = match privilege::lookup_group(&config.runtime.group) {
        Ok(Some(gid)) => Some(gid.as_raw()),
        Ok(None) => None,
        Err(e) => {
            return vec![Check::fail("service directories", format!("{:#}", e))];
        }
    };

    [paths.service_dir(service), paths.data_dir(service), paths.logs_dir(service)]
        .iter()
        .map(|dir| {
            let name = format!("directory {}", dir.display());
            if !dir.is_dir() {
                return Check::fail(name, "missing");
            }
            let mode = host_fs::mode_of(dir).unwrap_or(0);
            if mode != constants::SERVICE_DIR_MODE {
                return Check::fail(
                    name,
                    format!("mode {:04o} (expected {:04o})", mode, constants::SERVICE_DIR_MODE),
                );
            }
            let Some(gid) = gid else {
                return Check::fail(name, format!("group '{}' does not exist", config.runtime.group));
            };
            match host_fs::owner_of(dir) {
                Some((_, actual)) if actual == gid => {
                    Check::pass(name, format!("{:04o} group {}", mode, config.runtime.group))
                }
                Some((_, actual)) => Check::fail(
                    name,
                    format!("group {} (expected {} = {})", actual, config.runtime.group, gid),
                ),
                None => Check::fail(name, "cannot stat"),
            }
        })
        .collect()
}

pub fn verify_manifest(config: &HostConfig, paths: &HostPaths) -> Vec<Check> {
    let path = paths.manifest(&config.host.service_name);
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => return vec![Check::fail("manifest", format!("cannot read {}: {}", path.display(), e))],
    };
    let parsed: ComposeFile = match serde_yaml::from_str(&content) {
        Ok(m) => m,
        Err(e) => return vec![Check::fail("manifest", format!("does not parse: {}", e))],
    };

    let mut checks = Vec::new();
    let expected = render::compose_model(config);
    let name = "manifest services";
    if parsed.services.len() != 1 {
        checks.push(Check::fail(name, format!("{} services (expected 1)", parsed.services.len())));
        return checks;
    }
    let Some(service) = parsed.services.get(&config.host.service_name) else {
        checks.push(Check::fail(
            name,
            format!("service '{}' not defined", config.host.service_name),
        ));
        return checks;
    };
    checks.push(Check::pass(name, format!("one service '{}'", config.host.service_name)));

    let mounts: Vec<BindMount> = service.volumes.iter().filter_map(|v| BindMount::parse(v)).collect();
    let rw_sources: BTreeMap<&str, bool> = mounts
        .iter()
        .map(|m| (m.source.as_str(), m.is_read_write()))
        .collect();
    let mounts_ok = service.volumes.len() == 2
        && mounts.len() == 2
        && rw_sources.get("./data") == Some(&true)
        && rw_sources.get("./logs") == Some(&true);
    checks.push(if mounts_ok {
        Check::pass("manifest volumes", "./data and ./logs, read-write")
    } else {
        Check::fail("manifest volumes", format!("{:?}", service.volumes))
    });

    let security_ok = expected
        .services
        .get(&config.host.service_name)
        .is_some_and(|wanted| {
            service.read_only
                && service.cap_drop == ["ALL"]
                && service.security_opt == wanted.security_opt
                && service.user == wanted.user
        });
    checks.push(if security_ok {
        Check::pass("manifest security", format!("user {} read_only cap_drop=ALL no-new-privileges", service.user))
    } else {
        Check::fail("manifest security", "user/read_only/cap_drop/security_opt differ from hardened values")
    });

    let rendered = render::compose_manifest(config).unwrap_or_default();
    // the typed model ignores keys it does not know; compare whole documents too
    let same_document = serde_yaml::from_str::<serde_yaml::Value>(&content).ok()
        == serde_yaml::from_str::<serde_yaml::Value>(&rendered).ok();
    checks.push(if content == rendered {
        Check::pass("manifest content", "matches generated manifest byte-for-byte")
    } else if same_document {
        Check::warn("manifest content", "equivalent but not byte-identical (edited by hand?)")
    } else if parsed == expected {
        Check::fail("manifest content", "has keys the generated manifest does not set")
    } else {
        Check::fail("manifest content", "differs from generated manifest (image, limits, or logging)")
    });

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::fs::write_atomic;
    use tempfile::TempDir;

    fn setup() -> (TempDir, HostPaths, HostConfig) {
        let dir = TempDir::new().unwrap();
        let paths = HostPaths::from_root(dir.path().to_path_buf());
        (dir, paths, HostConfig::default())
    }

    #[test]
    fn test_sshd_hardened_passes() {
        let (_dir, paths, config) = setup();
        write_atomic(
            &paths.sshd_config,
            b"Port 2222\nPermitRootLogin no\nPasswordAuthentication no\n",
            0o644,
        )
        .unwrap();
        let checks = verify_sshd(&config, &paths);
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|c| c.status == Status::Pass), "{:?}", checks);
    }

    #[test]
    fn test_sshd_duplicate_fails_and_dropin_warns() {
        let (_dir, paths, config) = setup();
        write_atomic(
            &paths.sshd_config,
            b"Port 2222\nPort 22\nPermitRootLogin no\nPasswordAuthentication no\n",
            0o644,
        )
        .unwrap();
        write_atomic(
            &paths.sshd_dropin_dir.join("50-cloud-init.conf"),
            b"PasswordAuthentication yes\n",
            0o644,
        )
        .unwrap();
        let checks = verify_sshd(&config, &paths);
        assert!(checks.iter().any(|c| c.name == "sshd Port" && c.status == Status::Fail));
        assert!(checks
            .iter()
            .any(|c| c.name == "sshd PasswordAuthentication override" && c.status == Status::Warn));
    }

    #[test]
    fn test_sysctl_exact_set() {
        let (_dir, paths, config) = setup();
        let path = paths.sysctl_dropin(&config.host.service_name);
        write_atomic(&path, render::sysctl_dropin().as_bytes(), 0o644).unwrap();
        assert_eq!(verify_sysctl(&config, &paths).status, Status::Pass);

        let extra = format!("{}net.ipv4.ip_forward = 1\n", render::sysctl_dropin());
        write_atomic(&path, extra.as_bytes(), 0o644).unwrap();
        assert_eq!(verify_sysctl(&config, &paths).status, Status::Fail);
    }

    #[test]
    fn test_daemon_json_compares_values() {
        let (_dir, paths, _config) = setup();
        write_atomic(&paths.daemon_json, render::daemon_json().unwrap().as_bytes(), 0o644).unwrap();
        assert_eq!(verify_daemon_json(&paths).status, Status::Pass);

        write_atomic(&paths.daemon_json, br#"{"icc": true}"#, 0o644).unwrap();
        assert_eq!(verify_daemon_json(&paths).status, Status::Fail);

        write_atomic(&paths.daemon_json, b"{not json", 0o644).unwrap();
        assert_eq!(verify_daemon_json(&paths).status, Status::Fail);
    }

    #[test]
    fn test_manifest_generated_passes() {
        let (_dir, paths, config) = setup();
        let path = paths.manifest(&config.host.service_name);
        write_atomic(&path, render::compose_manifest(&config).unwrap().as_bytes(), 0o640).unwrap();
        let checks = verify_manifest(&config, &paths);
        assert!(checks.iter().all(|c| c.status == Status::Pass), "{:?}", checks);
    }

    #[test]
    fn test_manifest_read_only_mount_fails() {
        let (_dir, paths, config) = setup();
        let path = paths.manifest(&config.host.service_name);
        let text = render::compose_manifest(&config)
            .unwrap()
            .replace("./logs:/app/logs:rw", "./logs:/app/logs:ro");
        write_atomic(&path, text.as_bytes(), 0o640).unwrap();
        let checks = verify_manifest(&config, &paths);
        assert!(checks
            .iter()
            .any(|c| c.name == "manifest volumes" && c.status == Status::Fail));
    }

    #[test]
    fn test_manifest_with_extra_keys_still_parses() {
        let (_dir, paths, config) = setup();
        let path = paths.manifest(&config.host.service_name);
        let text = render::compose_manifest(&config)
            .unwrap()
            .replace("    restart:", "    environment:\n      DEBUG: \"1\"\n    ports:\n    - 8080:8080\n    restart:");
        write_atomic(&path, text.as_bytes(), 0o640).unwrap();

        let checks = verify_manifest(&config, &paths);
        let status = |name: &str| checks.iter().find(|c| c.name == name).map(|c| c.status);
        assert_eq!(status("manifest services"), Some(Status::Pass), "{:?}", checks);
        assert_eq!(status("manifest volumes"), Some(Status::Pass));
        assert_eq!(status("manifest security"), Some(Status::Pass));
        assert_eq!(status("manifest content"), Some(Status::Fail));
    }

    #[test]
    fn test_manifest_reformatted_warns() {
        let (_dir, paths, config) = setup();
        let path = paths.manifest(&config.host.service_name);
        let text = format!("# tweaked\n{}", render::compose_manifest(&config).unwrap());
        write_atomic(&path, text.as_bytes(), 0o640).unwrap();

        let checks = verify_manifest(&config, &paths);
        let content = checks.iter().find(|c| c.name == "manifest content").unwrap();
        assert_eq!(content.status, Status::Warn);
    }

    #[test]
    fn test_missing_directories_fail() {
        let (_dir, paths, config) = setup();
        let checks = verify_directories(&config, &paths);
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|c| c.status == Status::Fail));
    }
}
