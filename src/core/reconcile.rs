//! Reconciliation engine: compare desired state to the host, then plan or apply.
//!
//! Every action is probed before it mutates anything, so a second run over an
//! already-converged host changes nothing (only `Trigger::Always` commands run).

use crate::constants;
use crate::core::action::{Action, Artifact, DirSpec, FileSpec, Trigger};
use crate::core::backup;
use crate::core::diff::line_diff;
use crate::core::sshd::{self, Directive};
use crate::core::step::{Step, StepId};
use crate::util::command::{CommandRunner, CommandSpec};
use crate::util::fs as host_fs;
use crate::util::privilege;
use anyhow::{bail, Context, Result};
use nix::unistd::{Gid, Uid};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Planned effect of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Change {
    Unchanged,
    Create,
    Update,
    /// A command that will run.
    Run,
    /// An on-change command with nothing to react to.
    Skip,
    /// A precondition is unmet; apply will fail unless an earlier step fixes it.
    Blocked,
}

impl Change {
    pub fn label(&self) -> &'static str {
        match self {
            Change::Unchanged => "unchanged",
            Change::Create => "create",
            Change::Update => "update",
            Change::Run => "run",
            Change::Skip => "skip",
            Change::Blocked => "blocked",
        }
    }

    fn mutates_state(&self) -> bool {
        matches!(self, Change::Create | Change::Update)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionPlan {
    pub description: String,
    pub change: Change,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl ActionPlan {
    fn new(action: &Action, change: Change) -> Self {
        Self {
            description: action.describe(),
            change,
            note: None,
            diff: None,
        }
    }

    fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn diff(mut self, diff: String) -> Self {
        if !diff.is_empty() {
            self.diff = Some(diff);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepPlan {
    pub step: StepId,
    pub title: &'static str,
    pub actions: Vec<ActionPlan>,
}

impl StepPlan {
    /// Number of actions that would change or run something.
    pub fn pending(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| !matches!(a.change, Change::Unchanged | Change::Skip))
            .count()
    }
}

/// Result of applying one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Unchanged,
    Changed,
    Ran,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: StepId,
    pub outcomes: Vec<Outcome>,
}

impl StepReport {
    pub fn changed(&self) -> usize {
        self.count(Outcome::Changed)
    }

    pub fn ran(&self) -> usize {
        self.count(Outcome::Ran)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| **o == outcome).count()
    }
}

pub struct Reconciler<'a> {
    runner: &'a dyn CommandRunner,
    backups: PathBuf,
    /// One marker per step whose on-change commands still owe a run.
    pending: PathBuf,
}

impl<'a> Reconciler<'a> {
    pub fn new(runner: &'a dyn CommandRunner, backups: &Path, pending: &Path) -> Self {
        Self {
            runner,
            backups: backups.to_path_buf(),
            pending: pending.to_path_buf(),
        }
    }

    pub fn pending_marker(&self, step: StepId) -> PathBuf {
        self.pending.join(step.name())
    }

    /// Dry-run a step: probe every action without mutating the host.
    pub fn plan(&self, step: &Step) -> Result<StepPlan> {
        let resumed = self.pending_marker(step.id).exists();
        let mut actions: Vec<ActionPlan> = Vec::with_capacity(step.actions.len());
        for action in &step.actions {
            let changed = actions.iter().any(|a| a.change.mutates_state());
            let mut planned = self
                .plan_action(action, resumed || changed)
                .with_context(|| format!("plan {}", action.describe()))?;
            if resumed && !changed && is_on_change(action) {
                planned = planned.note("left pending by an earlier failed run");
            }
            actions.push(planned);
        }
        Ok(StepPlan {
            step: step.id,
            title: step.id.title(),
            actions,
        })
    }

    /// Apply a step, stopping at the first failing action.
    ///
    /// When the step has on-change commands, a pending marker is written before
    /// the first mutation and removed only once the whole step succeeded, so a
    /// later run still issues the restart or reload a failed run left owing.
    pub fn apply(&self, step: &Step) -> Result<StepReport> {
        let marker = self.pending_marker(step.id);
        let has_hooks = step.actions.iter().any(is_on_change);
        let mut marked = marker.exists();
        if marked {
            tracing::info!(step = step.id.name(), "resuming on-change commands from an earlier failed run");
        }

        let mut outcomes: Vec<Outcome> = Vec::with_capacity(step.actions.len());
        for action in &step.actions {
            if has_hooks && !marked && !matches!(action, Action::Exec { .. }) {
                let planned = self.plan_action(action, false)?;
                if planned.change.mutates_state() {
                    self.mark_pending(&marker)?;
                    marked = true;
                }
            }
            let triggered = marked || outcomes.contains(&Outcome::Changed);
            let outcome = self.apply_action(action, triggered)?;
            tracing::info!(
                step = step.id.name(),
                action = %action.describe(),
                outcome = ?outcome,
                "action applied"
            );
            outcomes.push(outcome);
        }
        if marked {
            clear_pending(&marker)?;
        }
        Ok(StepReport {
            step: step.id,
            outcomes,
        })
    }

    fn mark_pending(&self, marker: &Path) -> Result<()> {
        host_fs::ensure_dir(&self.pending, constants::STATE_DIR_MODE)?;
        let stamp = format!("{}\n", chrono::Utc::now().to_rfc3339());
        host_fs::write_atomic(marker, stamp.as_bytes(), constants::BACKUP_FILE_MODE)
            .with_context(|| format!("write pending marker {}", marker.display()))
    }

    fn plan_action(&self, action: &Action, triggered: bool) -> Result<ActionPlan> {
        let planned = match action {
            Action::Exec {
                trigger: Trigger::Always,
                ..
            } => ActionPlan::new(action, Change::Run),
            Action::Exec {
                trigger: Trigger::OnChange,
                ..
            } => {
                if triggered {
                    ActionPlan::new(action, Change::Run)
                } else {
                    ActionPlan::new(action, Change::Skip).note("nothing changed")
                }
            }
            Action::Package { name } => {
                if self.package_installed(name)? {
                    ActionPlan::new(action, Change::Unchanged)
                } else {
                    ActionPlan::new(action, Change::Create).note(format!("apt-get install -y {}", name))
                }
            }
            Action::Service { name } => {
                if self.service_running(name)? {
                    ActionPlan::new(action, Change::Unchanged)
                } else {
                    ActionPlan::new(action, Change::Update)
                        .note(format!("systemctl enable --now {}", name))
                }
            }
            Action::File(spec) => self.plan_file(action, spec)?,
            Action::SshDirectives { path, directives } => {
                match read_optional(path)? {
                    None => ActionPlan::new(action, Change::Blocked)
                        .note(format!("{} not found; is openssh-server installed?", path.display())),
                    Some(current) => {
                        let edit = sshd::apply_directives(&current, directives);
                        if edit.changed {
                            ActionPlan::new(action, Change::Update)
                                .diff(line_diff(&path.display().to_string(), &current, &edit.content))
                        } else {
                            ActionPlan::new(action, Change::Unchanged).note("already hardened")
                        }
                    }
                }
            }
            Action::Directory(spec) => self.plan_directory(action, spec)?,
        };
        Ok(planned)
    }

    fn plan_file(&self, action: &Action, spec: &FileSpec) -> Result<ActionPlan> {
        let label = spec.path.display().to_string();
        let planned = match read_bytes_optional(&spec.path)? {
            None => ActionPlan::new(action, Change::Create).diff(line_diff(&label, "", &spec.content)),
            Some(current) if current != spec.content.as_bytes() => {
                let current = String::from_utf8_lossy(&current);
                let mut planned = ActionPlan::new(action, Change::Update)
                    .diff(line_diff(&label, &current, &spec.content));
                if let Some(artifact) = spec.artifact {
                    planned = planned.note(format!(
                        "previous version kept at {}",
                        backup::backup_path(&self.backups, artifact).display()
                    ));
                }
                planned
            }
            Some(_) => match host_fs::mode_of(&spec.path) {
                Some(mode) if mode != spec.mode => ActionPlan::new(action, Change::Update)
                    .note(format!("mode {:04o} -> {:04o}", mode, spec.mode)),
                _ => ActionPlan::new(action, Change::Unchanged),
            },
        };
        Ok(planned)
    }

    fn plan_directory(&self, action: &Action, spec: &DirSpec) -> Result<ActionPlan> {
        let (uid, gid) = match resolve_owner(spec)? {
            Ok(ids) => ids,
            Err(reason) => return Ok(ActionPlan::new(action, Change::Blocked).note(reason)),
        };
        if !spec.path.is_dir() {
            return Ok(ActionPlan::new(action, Change::Create));
        }
        let drift = directory_drift(spec, uid, gid);
        if drift.is_empty() {
            Ok(ActionPlan::new(action, Change::Unchanged))
        } else {
            Ok(ActionPlan::new(action, Change::Update).note(drift.join(", ")))
        }
    }

    fn apply_action(&self, action: &Action, triggered: bool) -> Result<Outcome> {
        match action {
            Action::Exec { command, trigger } => {
                if *trigger == Trigger::OnChange && !triggered {
                    return Ok(Outcome::Skipped);
                }
                self.runner.run(command)?;
                Ok(Outcome::Ran)
            }
            Action::Package { name } => {
                if self.package_installed(name)? {
                    return Ok(Outcome::Unchanged);
                }
                self.runner
                    .run(&CommandSpec::apt_get(["install", "-y", name.as_str()]))?;
                Ok(Outcome::Changed)
            }
            Action::Service { name } => {
                if self.service_running(name)? {
                    return Ok(Outcome::Unchanged);
                }
                self.runner
                    .run(&CommandSpec::systemctl(["enable", "--now", name.as_str()]))?;
                Ok(Outcome::Changed)
            }
            Action::File(spec) => self.apply_file(spec),
            Action::SshDirectives { path, directives } => self.apply_sshd(path, directives),
            Action::Directory(spec) => self.apply_directory(spec),
        }
    }

    fn apply_file(&self, spec: &FileSpec) -> Result<Outcome> {
        let current = read_bytes_optional(&spec.path)?;
        if current.as_deref() == Some(spec.content.as_bytes()) {
            if host_fs::mode_of(&spec.path) == Some(spec.mode) {
                return Ok(Outcome::Unchanged);
            }
            host_fs::set_permissions(&spec.path, spec.mode)?;
            return Ok(Outcome::Changed);
        }
        if let (Some(previous), Some(artifact)) = (&current, spec.artifact) {
            backup::save(&self.backups, artifact, previous)?;
        }
        host_fs::write_atomic(&spec.path, spec.content.as_bytes(), spec.mode)?;
        Ok(Outcome::Changed)
    }

    fn apply_sshd(&self, path: &Path, directives: &[Directive]) -> Result<Outcome> {
        let current = match read_optional(path)? {
            Some(current) => current,
            None => bail!("{} not found; is openssh-server installed?", path.display()),
        };
        let edit = sshd::apply_directives(&current, directives);
        if !edit.changed {
            tracing::info!(path = %path.display(), "sshd_config already hardened");
            return Ok(Outcome::Unchanged);
        }
        backup::save(&self.backups, Artifact::Ssh, current.as_bytes())?;
        let mode = host_fs::mode_of(path).unwrap_or(constants::SSHD_CONFIG_MODE);
        host_fs::write_atomic(path, edit.content.as_bytes(), mode)?;
        Ok(Outcome::Changed)
    }

    fn apply_directory(&self, spec: &DirSpec) -> Result<Outcome> {
        let (uid, gid) = match resolve_owner(spec)? {
            Ok(ids) => ids,
            Err(reason) => bail!("cannot provision {}: {}", spec.path.display(), reason),
        };
        if spec.path.is_dir() && directory_drift(spec, uid, gid).is_empty() {
            return Ok(Outcome::Unchanged);
        }
        host_fs::ensure_dir(&spec.path, spec.mode)?;
        if host_fs::owner_of(&spec.path) != Some((uid.as_raw(), gid.as_raw())) {
            host_fs::set_owner(&spec.path, uid, gid)?;
        }
        Ok(Outcome::Changed)
    }

    fn package_installed(&self, name: &str) -> Result<bool> {
        let output = self.runner.output(&CommandSpec::new(
            "dpkg-query",
            ["-W", "--showformat=${Status}", name],
        ))?;
        Ok(output.success() && output.stdout.contains("install ok installed"))
    }

    fn service_running(&self, name: &str) -> Result<bool> {
        let enabled = self
            .runner
            .output(&CommandSpec::systemctl(["is-enabled", "--quiet", name]))?
            .success();
        let active = self
            .runner
            .output(&CommandSpec::systemctl(["is-active", "--quiet", name]))?
            .success();
        Ok(enabled && active)
    }
}

/// Resolve owner and group; the inner `Err` explains a missing account.
fn resolve_owner(spec: &DirSpec) -> Result<std::result::Result<(Uid, Gid), String>> {
    let uid = match privilege::lookup_user(&spec.owner)? {
        Some(uid) => uid,
        None => return Ok(Err(format!("user '{}' does not exist", spec.owner))),
    };
    let gid = match privilege::lookup_group(&spec.group)? {
        Some(gid) => gid,
        None => {
            return Ok(Err(format!(
                "group '{}' does not exist (it is created by the container runtime package)",
                spec.group
            )))
        }
    };
    Ok(Ok((uid, gid)))
}

fn directory_drift(spec: &DirSpec, uid: Uid, gid: Gid) -> Vec<String> {
    let mut drift = Vec::new();
    if let Some(mode) = host_fs::mode_of(&spec.path) {
        if mode != spec.mode {
            drift.push(format!("mode {:04o} -> {:04o}", mode, spec.mode));
        }
    }
    if let Some((cur_uid, cur_gid)) = host_fs::owner_of(&spec.path) {
        if cur_uid != uid.as_raw() {
            drift.push(format!("owner {} -> {}", cur_uid, spec.owner));
        }
        if cur_gid != gid.as_raw() {
            drift.push(format!("group {} -> {}", cur_gid, spec.group));
        }
    }
    drift
}

fn is_on_change(action: &Action) -> bool {
    matches!(
        action,
        Action::Exec {
            trigger: Trigger::OnChange,
            ..
        }
    )
}

fn clear_pending(marker: &Path) -> Result<()> {
    match fs::remove_file(marker) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove pending marker {}", marker.display())),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

/// Raw contents; managed files are replaced whatever their encoding.
fn read_bytes_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}
