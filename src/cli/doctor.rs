//! Diagnostics for readiness to run `apply`.

use crate::cli::{print_checks, CliContext, OutputFormat};
use crate::core::inspect::Check;
use crate::core::preflight;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn run(ctx: &CliContext, args: DoctorArgs) -> Result<()> {
    let paths = &ctx.paths;
    if args.format == OutputFormat::Text {
        println!("Doctor: {}", paths);
    }

    let mut checks = Vec::new();
    match &ctx.config_warning {
        Some(w) => checks.push(Check::warn("config", format!("{}; using defaults", w))),
        None if paths.config.exists() => checks.push(Check::pass("config", paths.config.display().to_string())),
        None => checks.push(Check::pass("config", "no config file; using defaults")),
    }
    checks.extend(preflight::run_all(&ctx.config, paths));

    let failed = print_checks("Doctor", &checks, args.format)?;
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
