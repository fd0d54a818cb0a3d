//! Desired-state descriptors applied by the reconciler.

use crate::constants;
use crate::core::paths::HostPaths;
use crate::core::sshd::Directive;
use crate::models::host_config::HostConfig;
use crate::util::command::CommandSpec;
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File artifacts that are backed up before replacement and can be rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Artifact {
    /// SSH daemon configuration
    Ssh,
    /// Kernel sysctl drop-in
    Sysctl,
    /// Container runtime daemon.json
    Daemon,
    /// Orchestration manifest
    Manifest,
}

impl Artifact {
    pub fn name(&self) -> &'static str {
        match self {
            Artifact::Ssh => "ssh",
            Artifact::Sysctl => "sysctl",
            Artifact::Daemon => "daemon",
            Artifact::Manifest => "manifest",
        }
    }

    pub fn target(&self, paths: &HostPaths, config: &HostConfig) -> PathBuf {
        match self {
            Artifact::Ssh => paths.sshd_config.clone(),
            Artifact::Sysctl => paths.sysctl_dropin(&config.host.service_name),
            Artifact::Daemon => paths.daemon_json.clone(),
            Artifact::Manifest => paths.manifest(&config.host.service_name),
        }
    }

    /// Mode used when the artifact is (re)created.
    pub fn default_mode(&self) -> u32 {
        match self {
            Artifact::Ssh => constants::SSHD_CONFIG_MODE,
            Artifact::Sysctl => constants::SYSCTL_DROPIN_MODE,
            Artifact::Daemon => constants::DAEMON_JSON_MODE,
            Artifact::Manifest => constants::MANIFEST_MODE,
        }
    }

    /// Command an operator runs after restoring this artifact.
    pub fn reload_hint(&self, config: &HostConfig) -> String {
        match self {
            Artifact::Ssh => "sshd -t && systemctl restart ssh".to_string(),
            Artifact::Sysctl => "sysctl --system".to_string(),
            Artifact::Daemon => format!("systemctl restart {}", config.runtime.service),
            Artifact::Manifest => "docker compose up -d".to_string(),
        }
    }
}

/// When an [`Action::Exec`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// Every run (convergent commands such as `apt-get update`).
    Always,
    /// Only when an earlier action of the same step changed something.
    OnChange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSpec {
    pub artifact: Option<Artifact>,
    pub path: PathBuf,
    pub content: String,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirSpec {
    pub path: PathBuf,
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Exec { command: CommandSpec, trigger: Trigger },
    /// A Debian package that must be installed.
    Package { name: String },
    /// A systemd unit that must be enabled and running.
    Service { name: String },
    File(FileSpec),
    SshDirectives {
        path: PathBuf,
        directives: Vec<Directive>,
    },
    Directory(DirSpec),
}

impl Action {
    pub fn always(command: CommandSpec) -> Self {
        Action::Exec {
            command,
            trigger: Trigger::Always,
        }
    }

    pub fn on_change(command: CommandSpec) -> Self {
        Action::Exec {
            command,
            trigger: Trigger::OnChange,
        }
    }

    /// Filesystem path the action writes, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Action::File(spec) => Some(&spec.path),
            Action::SshDirectives { path, .. } => Some(path),
            Action::Directory(spec) => Some(&spec.path),
            Action::Exec { .. } | Action::Package { .. } | Action::Service { .. } => None,
        }
    }

    /// One-line description used in plans and logs.
    pub fn describe(&self) -> String {
        match self {
            Action::Exec {
                command,
                trigger: Trigger::Always,
            } => format!("run `{}`", command),
            Action::Exec {
                command,
                trigger: Trigger::OnChange,
            } => format!("run `{}` (on change)", command),
            Action::Package { name } => format!("package {} installed", name),
            Action::Service { name } => format!("service {} enabled and running", name),
            Action::File(spec) => format!("file {} ({:04o})", spec.path.display(), spec.mode),
            Action::SshDirectives { path, directives } => {
                let keys: Vec<&str> = directives.iter().map(|d| d.key.as_str()).collect();
                format!("directives {} in {}", keys.join(", "), path.display())
            }
            Action::Directory(spec) => format!(
                "directory {} ({:04o} {}:{})",
                spec.path.display(),
                spec.mode,
                spec.owner,
                spec.group
            ),
        }
    }
}
