use crate::cli::CliContext;
use crate::constants;
use crate::core::config_file;
use crate::models::host_config::HostConfig;
use crate::util::fs as host_fs;
use anyhow::{bail, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file with the defaults
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &CliContext, args: InitArgs) -> Result<()> {
    let paths = &ctx.paths;
    host_fs::ensure_dir(&paths.state_dir, constants::STATE_DIR_MODE)?;

    if paths.config.exists() && !args.force {
        bail!(
            "config already exists: {} (use --force to overwrite)",
            paths.config.display()
        );
    }
    config_file::save(&paths.config, &HostConfig::default())?;

    println!("config written to {}", paths.config.display());
    println!("state directory: {}", paths.state_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths::HostPaths;
    use tempfile::TempDir;

    fn ctx(dir: &TempDir) -> CliContext {
        CliContext::new(HostPaths::from_root(dir.path().to_path_buf()), HostConfig::default())
    }

    #[test]
    fn test_init_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        run(&ctx, InitArgs { force: false }).unwrap();
        assert!(ctx.paths.state_dir.is_dir());
        assert_eq!(config_file::load(&ctx.paths.config).unwrap(), HostConfig::default());
        assert_eq!(host_fs::mode_of(&ctx.paths.config), Some(constants::CONFIG_FILE_MODE));
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        run(&ctx, InitArgs { force: false }).unwrap();
        let err = run(&ctx, InitArgs { force: false }).unwrap_err();
        assert!(err.to_string().contains("--force"));
        run(&ctx, InitArgs { force: true }).unwrap();
    }
}
