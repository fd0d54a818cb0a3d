//! CLI routing and command dispatch.

use crate::core::audit_log::{self, AuditRecord};
use crate::core::config_file;
use crate::core::inspect::{Check, Status};
use crate::core::paths::HostPaths;
use crate::models::host_config::HostConfig;
use crate::util::command::{CommandError, CommandRunner, SystemRunner};
use crate::util::journald;
use crate::util::privilege;
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod apply;
pub mod audit;
pub mod doctor;
pub mod init;
pub mod plan;
pub mod rollback;
pub mod verify;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub paths: HostPaths,
    pub config: HostConfig,
    /// Set when the config file could not be loaded (only tolerated by `doctor`).
    pub config_warning: Option<String>,
    pub non_interactive: bool,
    pub runner: Box<dyn CommandRunner>,
}

impl CliContext {
    /// Context with the given config and the real system runner.
    pub fn new(paths: HostPaths, config: HostConfig) -> Self {
        Self {
            paths,
            config,
            config_warning: None,
            non_interactive: false,
            runner: Box::new(SystemRunner),
        }
    }

    /// Append an audit entry, and optionally forward it to journald.
    pub fn audit(&self, record: AuditRecord) {
        // audit failures should be visible but never abort a run
        let entry = match audit_log::append(&self.paths, record) {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("warning: audit log failed: {:#}", e);
                return;
            }
        };

        if self.config.audit.journald {
            let line = serde_json::json!({
                "action": entry.action,
                "target": entry.target,
                "actor": entry.actor,
                "success": entry.result.success,
                "host": self.paths.to_string(),
            });
            journald::forward_line("hardenctl", &line.to_string());
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "hardenctl",
    version,
    about = "Baseline hardening for Debian/Ubuntu hosts running a containerized service"
)]
pub struct Cli {
    /// Filesystem prefix for every managed path
    #[arg(long, global = true, value_name = "PATH", env = "HARDENCTL_ROOT")]
    pub root: Option<PathBuf>,

    /// Config file (default: <root>/etc/hardenctl/hardenctl.toml)
    #[arg(long, global = true, value_name = "PATH", env = "HARDENCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "HARDENCTL_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Increase diagnostic logging on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let paths = HostPaths::resolve(self.root, self.config)?;
        tracing::debug!(target_root = %paths.root.display(), config = %paths.config.display(), "resolved paths");

        // doctor reports a broken config instead of refusing to run
        let mut config_warning: Option<String> = None;
        let config = match config_file::load(&paths.config) {
            Ok(config) => config,
            Err(e) if matches!(self.command, Commands::Doctor(_)) => {
                config_warning = Some(format!("{:#}", e));
                HostConfig::default()
            }
            Err(e) => return Err(e),
        };

        let ctx = CliContext {
            config_warning,
            non_interactive: self.non_interactive,
            ..CliContext::new(paths, config)
        };

        // Enforce root for mutating commands
        if self.command.requires_root() {
            privilege::require_root(self.command.name())?;
        }

        match self.command {
            Commands::Apply(args) => apply::run(&ctx, args),
            Commands::Plan(args) => plan::run(&ctx, args),
            Commands::Verify(args) => verify::run(&ctx, args),
            Commands::Doctor(args) => doctor::run(&ctx, args),
            Commands::Init(args) => init::run(&ctx, args),
            Commands::Audit { command } => audit::run(&ctx, command),
            Commands::Rollback(args) => rollback::run(&ctx, args),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the hardening steps in order
    Apply(apply::ApplyArgs),
    /// Dry-run preview of every step (safe, read-only)
    Plan(plan::PlanArgs),
    /// Check the hardened state of the host (safe, read-only)
    Verify(verify::VerifyArgs),
    /// Diagnose readiness for `apply` (safe, read-only)
    Doctor(doctor::DoctorArgs),
    /// Write the default config file and create the state directory
    Init(init::InitArgs),
    /// View the audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
    /// Restore the previous version of a managed file
    Rollback(rollback::RollbackArgs),
}

impl Commands {
    /// Whether this command requires root privileges.
    pub fn requires_root(&self) -> bool {
        matches!(
            self,
            Commands::Apply(_) | Commands::Init(_) | Commands::Rollback(_)
        )
    }

    /// Command name for error messages.
    pub fn name(&self) -> &str {
        match self {
            Commands::Apply(_) => "apply",
            Commands::Plan(_) => "plan",
            Commands::Verify(_) => "verify",
            Commands::Doctor(_) => "doctor",
            Commands::Init(_) => "init",
            Commands::Audit { .. } => "audit",
            Commands::Rollback(_) => "rollback",
        }
    }
}

/// Report format for read-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print check results with a summary line; returns the number of failures.
pub fn print_checks(title: &str, checks: &[Check], format: OutputFormat) -> Result<usize> {
    let count = |status| checks.iter().filter(|c| c.status == status).count();
    let (pass, warn, fail) = (count(Status::Pass), count(Status::Warn), count(Status::Fail));

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "checks": checks,
                "pass": pass,
                "warn": warn,
                "fail": fail,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for check in checks {
                println!("  {} {}: {}", check.status.tag(), check.name, check.detail);
            }
            println!();
            println!("{} summary: {} pass, {} warn, {} fail", title, pass, warn, fail);
        }
    }
    Ok(fail)
}

/// Process exit status for a failed run.
///
/// A failing system command propagates its own exit status; anything else is 1.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CommandError>())
        .map(|e| u8::try_from(e.exit_code()).ok().filter(|c| *c != 0).unwrap_or(1))
        .unwrap_or(1)
}
