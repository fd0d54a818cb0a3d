//! `apply`: run the hardening steps against the target root.

use crate::cli::CliContext;
use crate::core::audit_log::AuditRecord;
use crate::core::file_lock::FileLock;
use crate::core::provision;
use crate::core::reconcile::{Reconciler, StepReport};
use crate::core::step::{self, StepId};
use crate::util::privilege;
use anyhow::{bail, Result};
use clap::Args;
use dialoguer::Confirm;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Resume at this step, skipping the ones before it
    #[arg(long, value_enum, value_name = "STEP")]
    pub from: Option<StepId>,
    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(ctx: &CliContext, args: ApplyArgs) -> Result<()> {
    if !args.yes {
        if ctx.non_interactive {
            bail!("refusing to modify {} without --yes in non-interactive mode", ctx.paths);
        }
        let prompt = format!(
            "Harden {} for service '{}' (SSH moves to port {})?",
            ctx.paths, ctx.config.host.service_name, ctx.config.host.ssh_port
        );
        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(ctx, args.from, &mut out)?;
    Ok(())
}

/// Run the steps under the host lock, writing progress to `out`.
///
/// Each finished or failed step is recorded in the audit trail.
pub fn execute<W: Write>(ctx: &CliContext, from: Option<StepId>, out: &mut W) -> Result<Vec<StepReport>> {
    let _lock = FileLock::acquire_run_lock(&ctx.paths.lock)?;

    let steps = step::starting_at(step::build(&ctx.config, &ctx.paths)?, from);
    let reconciler = Reconciler::new(ctx.runner.as_ref(), &ctx.paths.backups, &ctx.paths.pending);
    let actor = privilege::detect_actor();
    if !ctx.paths.is_host_root() {
        eprintln!(
            "warning: files go under {}, but packages, services and the firewall are managed on this host",
            ctx.paths.root.display()
        );
    }
    tracing::info!(target_root = %ctx.paths.root.display(), steps = steps.len(), actor = %actor, "apply");

    provision::apply_all(&reconciler, &steps, out, |step, result| {
        let record = match result {
            Ok(report) => AuditRecord::success("apply", &actor, step.id.name(), Some(report.changed())),
            Err(e) => AuditRecord::failure("apply", &actor, step.id.name(), format!("{:#}", e)),
        };
        ctx.audit(record);
    })
}
