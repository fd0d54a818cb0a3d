//! Read-only readiness checks run by `doctor` before a provisioning run.

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::core::inspect::Check;
use crate::core::paths::HostPaths;
use crate::models::host_config::HostConfig;
use crate::util::privilege;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Distribution families `apply` knows how to drive.
const SUPPORTED_IDS: &[&str] = &["debian", "ubuntu"];

pub fn run_all(config: &HostConfig, paths: &HostPaths) -> Vec<Check> {
    let mut checks = vec![check_os_release(&paths.os_release), check_root()];
    checks.extend(
        constants::REQUIRED_TOOLS
            .iter()
            .map(|tool| check_tool(tool, env::var_os("PATH").unwrap_or_default())),
    );
    checks.push(check_sshd_config(paths));
    checks.push(check_runtime_group(config));
    checks.push(check_lock(paths));
    checks
}

/// Parse `KEY=value` lines of an os-release file, unquoting values.
pub fn parse_os_release(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn check_os_release(path: &Path) -> Check {
    let name = "distribution";
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return Check::fail(name, format!("cannot read {}: {}", path.display(), e)),
    };
    let fields = parse_os_release(&content);
    let id = fields.get("ID").cloned().unwrap_or_default();
    let like = fields.get("ID_LIKE").cloned().unwrap_or_default();
    let pretty = fields.get("PRETTY_NAME").cloned().unwrap_or_else(|| id.clone());

    let supported = SUPPORTED_IDS.contains(&id.as_str())
        || like.split_whitespace().any(|l| SUPPORTED_IDS.contains(&l));
    if supported {
        Check::pass(name, pretty)
    } else {
        Check::fail(name, format!("'{}' is not Debian/Ubuntu-family; apt-get steps will fail", pretty))
    }
}

fn check_root() -> Check {
    if privilege::is_root() {
        Check::pass("privileges", "running as root")
    } else {
        Check::warn("privileges", "not root; apply, init and rollback require root")
    }
}

fn check_tool(tool: &str, search_path: std::ffi::OsString) -> Check {
    let name = format!("tool {}", tool);
    match find_on_path(tool, &search_path) {
        Some(found) => Check::pass(name, found.display().to_string()),
        None => Check::fail(name, "not found on PATH"),
    }
}

fn find_on_path(name: &str, search_path: &std::ffi::OsStr) -> Option<PathBuf> {
    env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable_file(candidate))
}

fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && (meta.permissions().mode() & 0o111) != 0,
        Err(_) => false,
    }
}

fn check_sshd_config(paths: &HostPaths) -> Check {
    if paths.sshd_config.is_file() {
        Check::pass("sshd_config", paths.sshd_config.display().to_string())
    } else {
        Check::fail(
            "sshd_config",
            format!("{} missing (is openssh-server installed?)", paths.sshd_config.display()),
        )
    }
}

fn check_runtime_group(config: &HostConfig) -> Check {
    let name = format!("group {}", config.runtime.group);
    match privilege::lookup_group(&config.runtime.group) {
        Ok(Some(gid)) => Check::pass(name, format!("gid {}", gid)),
        // The runtime package usually creates it during `runtime-install`.
        Ok(None) => Check::warn(name, "does not exist yet; the directories step needs it"),
        Err(e) => Check::fail(name, format!("{:#}", e)),
    }
}

fn check_lock(paths: &HostPaths) -> Check {
    if !paths.lock.exists() {
        return Check::pass("run lock", "free");
    }
    match FileLock::try_exclusive(&paths.lock) {
        Ok(Some(_)) => Check::pass("run lock", "free"),
        Ok(None) => Check::warn("run lock", format!("held by another run: {}", paths.lock.display())),
        Err(e) => Check::warn("run lock", format!("cannot probe: {:#}", e)),
    }
}
