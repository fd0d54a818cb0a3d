//! Sequential, fail-fast execution of the provisioning steps.

use crate::core::reconcile::{Reconciler, StepPlan, StepReport};
use crate::core::step::Step;
use anyhow::{Context, Result};
use std::io::Write;

/// Apply `steps` in order, printing each progress line to `out`.
///
/// `on_step` sees every step result, including the failing one, before the
/// run aborts. Steps after a failure are never started.
pub fn apply_all<W, F>(
    reconciler: &Reconciler<'_>,
    steps: &[Step],
    out: &mut W,
    mut on_step: F,
) -> Result<Vec<StepReport>>
where
    W: Write,
    F: FnMut(&Step, &Result<StepReport>),
{
    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        writeln!(out, "{}", step.id.progress_line()).context("write progress")?;
        out.flush().ok();

        let result = reconciler
            .apply(step)
            .with_context(|| format!("step '{}' failed", step.id.name()));
        on_step(step, &result);
        let report = result?;

        if let Some(notice) = &step.notice {
            write!(out, "{}", notice).context("write notice")?;
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Plan every step without touching the host.
pub fn plan_all(reconciler: &Reconciler<'_>, steps: &[Step]) -> Result<Vec<StepPlan>> {
    steps.iter().map(|step| reconciler.plan(step)).collect()
}
