//! Post-apply verification of the hardened host.

use crate::cli::{print_checks, CliContext, OutputFormat};
use crate::core::inspect;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn run(ctx: &CliContext, args: VerifyArgs) -> Result<()> {
    if args.format == OutputFormat::Text {
        println!("Verify: {}", ctx.paths);
    }
    let checks = inspect::verify_all(&ctx.config, &ctx.paths);
    let failed = print_checks("Verify", &checks, args.format)?;
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
