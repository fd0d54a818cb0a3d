//! Dry-run preview of `apply`.

use crate::cli::{CliContext, OutputFormat};
use crate::core::provision;
use crate::core::reconcile::{Change, Reconciler, StepPlan};
use crate::core::step::{self, StepId};
use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, Table};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Plan from this step onward
    #[arg(long, value_enum, value_name = "STEP")]
    pub from: Option<StepId>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn run(ctx: &CliContext, args: PlanArgs) -> Result<()> {
    let steps = step::starting_at(step::build(&ctx.config, &ctx.paths)?, args.from);
    let reconciler = Reconciler::new(ctx.runner.as_ref(), &ctx.paths.backups, &ctx.paths.pending);
    let plans = provision::plan_all(&reconciler, &steps)?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&plans).context("serialize plan")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_text(ctx, &plans),
    }
    Ok(())
}

fn print_text(ctx: &CliContext, plans: &[StepPlan]) {
    println!("Plan: {}", ctx.paths);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Step").add_attribute(Attribute::Bold),
        Cell::new("Action").add_attribute(Attribute::Bold),
        Cell::new("Change").add_attribute(Attribute::Bold),
    ]);
    for plan in plans {
        for action in &plan.actions {
            let mut description = action.description.clone();
            if let Some(note) = &action.note {
                description.push_str(&format!("\n({})", note));
            }
            table.add_row(vec![
                Cell::new(plan.step.name()),
                Cell::new(description),
                Cell::new(action.change.label()).fg(change_color(action.change)),
            ]);
        }
    }
    println!("{}", table);

    for plan in plans {
        for action in &plan.actions {
            if let Some(diff) = &action.diff {
                println!();
                print!("{}", diff);
            }
        }
    }

    let pending: usize = plans.iter().map(StepPlan::pending).sum();
    let blocked = plans
        .iter()
        .flat_map(|p| &p.actions)
        .filter(|a| a.change == Change::Blocked)
        .count();
    println!();
    println!("Plan summary: {} pending, {} blocked", pending, blocked);
}

fn change_color(change: Change) -> Color {
    match change {
        Change::Unchanged | Change::Skip => Color::Reset,
        Change::Create | Change::Update => Color::Green,
        Change::Run => Color::Cyan,
        Change::Blocked => Color::Red,
    }
}
