//! Managed path resolution under a target root.

use crate::constants;
use crate::util::path::{is_within, reroot};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct HostPaths {
    /// Filesystem prefix every managed path lives under (`/` on a live host).
    pub root: PathBuf,
    pub config: PathBuf,
    pub state_dir: PathBuf,
    pub lock: PathBuf,
    pub audit_log: PathBuf,
    pub backups: PathBuf,
    /// Per-step markers for restarts/reloads a failed run left owing.
    pub pending: PathBuf,
    pub sshd_config: PathBuf,
    pub sshd_dropin_dir: PathBuf,
    pub sysctl_dir: PathBuf,
    pub daemon_json: PathBuf,
    pub os_release: PathBuf,
}

impl HostPaths {
    /// Resolve paths from the `--root` / `--config` arguments.
    ///
    /// An explicit config path is used as given; otherwise it lives under the root.
    pub fn resolve(root_arg: Option<PathBuf>, config_arg: Option<PathBuf>) -> Result<Self> {
        let root = root_arg.unwrap_or_else(|| PathBuf::from("/"));
        if !root.is_dir() {
            bail!("target root is not a directory: {}", root.display());
        }
        let mut paths = Self::from_root(root);
        if let Some(config) = config_arg {
            paths.config = config;
        }
        Ok(paths)
    }

    /// Create paths from a root directory.
    pub fn from_root(root: PathBuf) -> Self {
        let at = |p: &str| reroot(&root, Path::new(p));
        let state_dir = at(constants::STATE_DIR);
        Self {
            config: at(constants::DEFAULT_CONFIG_PATH),
            lock: state_dir.join("hardenctl.lock"),
            audit_log: state_dir.join("audit.log"),
            backups: state_dir.join("backups"),
            pending: state_dir.join("pending"),
            sshd_config: at(constants::SSHD_CONFIG_PATH),
            sshd_dropin_dir: at(constants::SSHD_DROPIN_DIR),
            sysctl_dir: at(constants::SYSCTL_DIR),
            daemon_json: at(constants::DAEMON_JSON_PATH),
            os_release: at(constants::OS_RELEASE_PATH),
            state_dir,
            root,
        }
    }

    /// Whether the target is the live host rather than a mounted image.
    pub fn is_host_root(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Whether `path` stays under the target root.
    pub fn contains(&self, path: &Path) -> bool {
        is_within(path, &self.root)
    }

    /// `/etc/sysctl.d/99-<service>.conf`
    pub fn sysctl_dropin(&self, service: &str) -> PathBuf {
        self.sysctl_dir.join(format!("99-{}.conf", service))
    }

    /// `/opt/<service>`
    pub fn service_dir(&self, service: &str) -> PathBuf {
        reroot(&self.root, Path::new(constants::SERVICE_BASE_DIR)).join(service)
    }

    pub fn data_dir(&self, service: &str) -> PathBuf {
        self.service_dir(service).join("data")
    }

    pub fn logs_dir(&self, service: &str) -> PathBuf {
        self.service_dir(service).join("logs")
    }

    /// `/opt/<service>/docker-compose.yml`
    pub fn manifest(&self, service: &str) -> PathBuf {
        self.service_dir(service).join("docker-compose.yml")
    }
}

impl std::fmt::Display for HostPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host@{}", self.root.display())
    }
}
