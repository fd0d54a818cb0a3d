//! Host configuration file model (`hardenctl.toml`).

use crate::constants;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub directories: DirectoriesSection,
    #[serde(default)]
    pub manifest: ManifestSection,
    #[serde(default)]
    pub audit: AuditSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSection {
    /// Name of the containerized service; used for `/opt/<name>` and the sysctl drop-in.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// SSH listening port; also the only inbound port allowed by the firewall.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            ssh_port: default_ssh_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default = "default_runtime_package")]
    pub package: String,
    #[serde(default = "default_runtime_service")]
    pub service: String,
    /// Group created by the runtime package; owns the service directories.
    #[serde(default = "default_runtime_group")]
    pub group: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            package: default_runtime_package(),
            service: default_runtime_service(),
            group: default_runtime_group(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoriesSection {
    #[serde(default = "default_directory_owner")]
    pub owner: String,
}

impl Default for DirectoriesSection {
    fn default() -> Self {
        Self {
            owner: default_directory_owner(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSection {
    #[serde(default = "default_image")]
    pub image: String,
    /// Numeric `uid:gid`; root is rejected.
    #[serde(default = "default_container_user")]
    pub user: String,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: u32,
    #[serde(default = "default_mem_limit")]
    pub mem_limit: String,
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    #[serde(default = "default_log_max_size")]
    pub log_max_size: String,
    #[serde(default = "default_log_max_file")]
    pub log_max_file: u32,
}

impl Default for ManifestSection {
    fn default() -> Self {
        Self {
            image: default_image(),
            user: default_container_user(),
            pids_limit: default_pids_limit(),
            mem_limit: default_mem_limit(),
            cpus: default_cpus(),
            log_max_size: default_log_max_size(),
            log_max_file: default_log_max_file(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSection {
    /// Forward audit entries to journald.
    #[serde(default)]
    pub journald: bool,
}

impl HostConfig {
    /// Reject values that would produce unsafe paths or a privileged container.
    pub fn validate(&self) -> Result<()> {
        validate_service_name(&self.host.service_name)?;
        if self.host.ssh_port == 0 {
            bail!("host.ssh_port must be between 1 and 65535");
        }
        for (field, value) in [
            ("runtime.package", &self.runtime.package),
            ("runtime.service", &self.runtime.service),
            ("runtime.group", &self.runtime.group),
            ("directories.owner", &self.directories.owner),
            ("manifest.image", &self.manifest.image),
        ] {
            if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
                bail!("{} must be a non-empty value without whitespace", field);
            }
        }
        validate_container_user(&self.manifest.user)?;
        if self.manifest.pids_limit == 0 {
            bail!("manifest.pids_limit must be greater than 0");
        }
        if !self.manifest.cpus.is_finite() || self.manifest.cpus <= 0.0 {
            bail!("manifest.cpus must be a finite number greater than 0");
        }
        if self.manifest.log_max_file == 0 {
            bail!("manifest.log_max_file must be greater than 0");
        }
        Ok(())
    }
}

fn validate_service_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if !valid_first || !valid_rest || name.contains("..") {
        bail!(
            "invalid host.service_name '{}': must match [a-z0-9][a-z0-9._-]*",
            name
        );
    }
    Ok(())
}

fn validate_container_user(user: &str) -> Result<()> {
    let parsed = user
        .split_once(':')
        .and_then(|(uid, gid)| Some((uid.parse::<u32>().ok()?, gid.parse::<u32>().ok()?)));
    match parsed {
        Some((0, _)) | Some((_, 0)) => {
            bail!("manifest.user '{}' must not map to root", user)
        }
        Some(_) => Ok(()),
        None => bail!("manifest.user '{}' must be numeric uid:gid", user),
    }
}

fn default_service_name() -> String {
    constants::DEFAULT_SERVICE_NAME.to_string()
}

fn default_ssh_port() -> u16 {
    constants::DEFAULT_SSH_PORT
}

fn default_runtime_package() -> String {
    constants::DEFAULT_RUNTIME_PACKAGE.to_string()
}

fn default_runtime_service() -> String {
    constants::DEFAULT_RUNTIME_SERVICE.to_string()
}

fn default_runtime_group() -> String {
    constants::DEFAULT_RUNTIME_GROUP.to_string()
}

fn default_directory_owner() -> String {
    constants::DEFAULT_DIRECTORY_OWNER.to_string()
}

fn default_image() -> String {
    constants::DEFAULT_IMAGE.to_string()
}

fn default_container_user() -> String {
    constants::DEFAULT_CONTAINER_USER.to_string()
}

fn default_pids_limit() -> u32 {
    constants::DEFAULT_PIDS_LIMIT
}

fn default_mem_limit() -> String {
    constants::DEFAULT_MEM_LIMIT.to_string()
}

fn default_cpus() -> f64 {
    constants::DEFAULT_CPUS
}

fn default_log_max_size() -> String {
    constants::DEFAULT_LOG_MAX_SIZE.to_string()
}

fn default_log_max_file() -> u32 {
    constants::DEFAULT_LOG_MAX_FILE
}
