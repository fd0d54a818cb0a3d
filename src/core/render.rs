//! Generators for the static artifacts (pure functions).

use crate::constants;
use crate::core::paths::HostPaths;
use crate::models::compose::{ComposeFile, ComposeLogging, ComposeService};
use crate::models::daemon::DaemonConfig;
use crate::models::host_config::HostConfig;
use anyhow::{Context, Result};
use std::collections::BTreeMap;

/// Sysctl drop-in with the fixed kernel tunables.
pub fn sysctl_dropin() -> String {
    let mut out = format!("# Managed by {}\n", constants::MANAGED_BY);
    for (key, value) in constants::SYSCTL_SETTINGS {
        out.push_str(&format!("{} = {}\n", key, value));
    }
    out
}

pub fn daemon_json() -> Result<String> {
    let mut out = serde_json::to_string_pretty(&DaemonConfig::hardened())
        .context("serialize daemon.json")?;
    out.push('\n');
    Ok(out)
}

/// The single-service compose model for `config`.
pub fn compose_model(config: &HostConfig) -> ComposeFile {
    let manifest = &config.manifest;
    let service = ComposeService {
        image: manifest.image.clone(),
        container_name: config.host.service_name.clone(),
        restart: "unless-stopped".to_string(),
        user: manifest.user.clone(),
        read_only: true,
        cap_drop: vec!["ALL".to_string()],
        security_opt: vec!["no-new-privileges:true".to_string()],
        pids_limit: manifest.pids_limit,
        mem_limit: manifest.mem_limit.clone(),
        cpus: manifest.cpus,
        volumes: vec![
            "./data:/app/data:rw".to_string(),
            "./logs:/app/logs:rw".to_string(),
        ],
        logging: ComposeLogging {
            driver: "json-file".to_string(),
            options: BTreeMap::from([
                ("max-file".to_string(), manifest.log_max_file.to_string()),
                ("max-size".to_string(), manifest.log_max_size.clone()),
            ]),
        },
    };
    ComposeFile {
        services: BTreeMap::from([(config.host.service_name.clone(), service)]),
    }
}

pub fn compose_manifest(config: &HostConfig) -> Result<String> {
    let body = serde_yaml::to_string(&compose_model(config)).context("serialize manifest")?;
    Ok(format!(
        "# Managed by {}. Review the image reference before starting.\n{}",
        constants::MANAGED_BY,
        body
    ))
}

/// Closing reminder block printed after a successful run.
pub fn summary(config: &HostConfig, paths: &HostPaths) -> String {
    let service = &config.host.service_name;
    let service_dir = paths.service_dir(service);
    let mut out = String::new();
    out.push_str("Hardening complete.\n");
    out.push_str(&format!(
        "  - SSH now listens on port {}; password and root logins are disabled.\n",
        config.host.ssh_port
    ));
    out.push_str("  - Open a NEW session to confirm key-based access before closing this one.\n");
    out.push_str(&format!(
        "  - Firewall allows inbound {}/tcp only.\n",
        config.host.ssh_port
    ));
    out.push_str(&format!(
        "  - Review the image in {} before starting the service.\n",
        paths.manifest(service).display()
    ));
    out.push_str(&format!(
        "  - Start it with: cd {} && docker compose up -d\n",
        service_dir.display()
    ));
    out.push_str("  - Previous file versions are kept for `hardenctl rollback <artifact>`;\n");
    out.push_str("    keep a host snapshot for anything else.\n");
    out
}
