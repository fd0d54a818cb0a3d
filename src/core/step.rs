//! The nine provisioning steps and their fixed order.

use crate::constants;
use crate::core::action::{Action, Artifact, DirSpec, FileSpec};
use crate::core::paths::HostPaths;
use crate::core::render;
use crate::core::sshd;
use crate::models::host_config::HostConfig;
use crate::util::command::CommandSpec;
use anyhow::{bail, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    /// Refresh and upgrade OS packages
    Update,
    /// Harden the SSH daemon
    Ssh,
    /// Default-deny firewall
    Firewall,
    /// Kernel sysctl hardening
    Kernel,
    /// Install the container runtime
    RuntimeInstall,
    /// Harden the container runtime daemon
    RuntimeHardening,
    /// Service directory tree
    Directories,
    /// Orchestration manifest
    Manifest,
    /// Closing reminders
    Summary,
}

impl StepId {
    pub const ALL: [StepId; 9] = [
        StepId::Update,
        StepId::Ssh,
        StepId::Firewall,
        StepId::Kernel,
        StepId::RuntimeInstall,
        StepId::RuntimeHardening,
        StepId::Directories,
        StepId::Manifest,
        StepId::Summary,
    ];

    /// 1-based position in the run.
    pub fn number(&self) -> usize {
        StepId::ALL.iter().position(|s| s == self).unwrap_or(0) + 1
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepId::Update => "update",
            StepId::Ssh => "ssh",
            StepId::Firewall => "firewall",
            StepId::Kernel => "kernel",
            StepId::RuntimeInstall => "runtime-install",
            StepId::RuntimeHardening => "runtime-hardening",
            StepId::Directories => "directories",
            StepId::Manifest => "manifest",
            StepId::Summary => "summary",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StepId::Update => "Updating system packages",
            StepId::Ssh => "Hardening SSH",
            StepId::Firewall => "Configuring firewall",
            StepId::Kernel => "Applying kernel hardening",
            StepId::RuntimeInstall => "Installing container runtime",
            StepId::RuntimeHardening => "Hardening container runtime",
            StepId::Directories => "Provisioning service directories",
            StepId::Manifest => "Writing orchestration manifest",
            StepId::Summary => "Done",
        }
    }

    /// The fixed progress line, e.g. `[2/9] Hardening SSH`.
    pub fn progress_line(&self) -> String {
        format!("[{}/{}] {}", self.number(), StepId::ALL.len(), self.title())
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub actions: Vec<Action>,
    /// Text printed after the step's actions succeed.
    pub notice: Option<String>,
}

impl Step {
    fn new(id: StepId, actions: Vec<Action>) -> Self {
        Self {
            id,
            actions,
            notice: None,
        }
    }
}

/// Build the ordered step list for `config` on `paths`.
pub fn build(config: &HostConfig, paths: &HostPaths) -> Result<Vec<Step>> {
    let host = &config.host;
    let runtime = &config.runtime;
    let port_rule = format!("{}/tcp", host.ssh_port);
    let dir = |path| {
        Action::Directory(DirSpec {
            path,
            mode: constants::SERVICE_DIR_MODE,
            owner: config.directories.owner.clone(),
            group: runtime.group.clone(),
        })
    };

    let mut summary = Step::new(StepId::Summary, Vec::new());
    summary.notice = Some(render::summary(config, paths));

    let steps = vec![
        Step::new(
            StepId::Update,
            vec![
                Action::always(CommandSpec::apt_get(["update"])),
                Action::always(CommandSpec::apt_get(["-y", "upgrade"])),
            ],
        ),
        Step::new(
            StepId::Ssh,
            vec![
                Action::SshDirectives {
                    path: paths.sshd_config.clone(),
                    directives: sshd::hardening_directives(host.ssh_port),
                },
                Action::on_change(CommandSpec::new(
                    "sshd",
                    ["-t".to_string(), "-f".to_string(), paths.sshd_config.display().to_string()],
                )),
                Action::on_change(CommandSpec::systemctl(["restart", constants::SSH_SERVICE])),
            ],
        ),
        Step::new(
            StepId::Firewall,
            vec![
                Action::Package {
                    name: constants::FIREWALL_PACKAGE.to_string(),
                },
                Action::always(CommandSpec::new("ufw", ["default", "deny", "incoming"])),
                Action::always(CommandSpec::new("ufw", ["default", "allow", "outgoing"])),
                Action::always(CommandSpec::new("ufw", ["allow", port_rule.as_str()])),
                Action::always(CommandSpec::new("ufw", ["--force", "enable"])),
            ],
        ),
        Step::new(
            StepId::Kernel,
            vec![
                Action::File(FileSpec {
                    artifact: Some(Artifact::Sysctl),
                    path: paths.sysctl_dropin(&host.service_name),
                    content: render::sysctl_dropin(),
                    mode: constants::SYSCTL_DROPIN_MODE,
                }),
                Action::on_change(CommandSpec::new("sysctl", ["--system"])),
            ],
        ),
        Step::new(
            StepId::RuntimeInstall,
            vec![
                Action::Package {
                    name: runtime.package.clone(),
                },
                Action::Service {
                    name: runtime.service.clone(),
                },
            ],
        ),
        Step::new(
            StepId::RuntimeHardening,
            vec![
                Action::File(FileSpec {
                    artifact: Some(Artifact::Daemon),
                    path: paths.daemon_json.clone(),
                    content: render::daemon_json()?,
                    mode: constants::DAEMON_JSON_MODE,
                }),
                Action::on_change(CommandSpec::systemctl(["restart", runtime.service.as_str()])),
            ],
        ),
        Step::new(
            StepId::Directories,
            vec![
                dir(paths.service_dir(&host.service_name)),
                dir(paths.data_dir(&host.service_name)),
                dir(paths.logs_dir(&host.service_name)),
            ],
        ),
        Step::new(
            StepId::Manifest,
            vec![Action::File(FileSpec {
                artifact: Some(Artifact::Manifest),
                path: paths.manifest(&host.service_name),
                content: render::compose_manifest(config)?,
                mode: constants::MANIFEST_MODE,
            })],
        ),
        summary,
    ];

    for step in &steps {
        for action in &step.actions {
            if let Some(path) = action.path() {
                if !paths.contains(path) {
                    bail!("{} escapes target root {}", path.display(), paths.root.display());
                }
            }
        }
    }
    Ok(steps)
}

/// Steps from `from` (inclusive) onward; all steps when `from` is `None`.
pub fn starting_at(steps: Vec<Step>, from: Option<StepId>) -> Vec<Step> {
    match from {
        Some(first) => steps.into_iter().filter(|s| s.id >= first).collect(),
        None => steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::Trigger;
    use std::path::PathBuf;

    fn steps() -> Vec<Step> {
        build(&HostConfig::default(), &HostPaths::from_root(PathBuf::from("/"))).unwrap()
    }

    #[test]
    fn test_nine_steps_in_order() {
        let ids: Vec<StepId> = steps().iter().map(|s| s.id).collect();
        assert_eq!(ids, StepId::ALL.to_vec());
    }

    #[test]
    fn test_progress_lines() {
        assert_eq!(StepId::Update.progress_line(), "[1/9] Updating system packages");
        assert_eq!(StepId::Summary.progress_line(), "[9/9] Done");
    }

    #[test]
    fn test_firewall_allows_ssh_port_only() {
        let steps = steps();
        let firewall = &steps[2];
        let allows: Vec<String> = firewall
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::Exec { command, .. } if command.args.first().map(String::as_str) == Some("allow") => {
                    Some(command.to_string())
                }
                _ => None,
            })
            .collect();
        assert_eq!(allows, vec!["ufw allow 2222/tcp"]);
    }

    #[test]
    fn test_restarts_are_on_change() {
        for step in steps() {
            for action in &step.actions {
                if let Action::Exec { command, trigger } = action {
                    if command.args.first().map(String::as_str) == Some("restart") {
                        assert_eq!(*trigger, Trigger::OnChange, "{}", command);
                    }
                }
            }
        }
    }

    #[test]
    fn test_starting_at_skips_earlier_steps() {
        let ids: Vec<StepId> = starting_at(steps(), Some(StepId::Directories))
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![StepId::Directories, StepId::Manifest, StepId::Summary]);
    }

    #[test]
    fn test_summary_has_notice() {
        let steps = steps();
        assert!(steps.last().unwrap().notice.is_some());
        assert!(steps.last().unwrap().actions.is_empty());
    }

    #[test]
    fn test_service_dir_outside_root_rejected() {
        let mut config = HostConfig::default();
        config.host.service_name = "../../../../srv".to_string();
        let err = build(&config, &HostPaths::from_root(PathBuf::from("/mnt/img"))).unwrap_err();
        assert!(err.to_string().contains("escapes target root"));
    }
}
