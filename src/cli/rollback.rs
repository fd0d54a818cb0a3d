//! Restore the previous version of a managed file from its backup.

use crate::cli::CliContext;
use crate::core::action::Artifact;
use crate::core::audit_log::AuditRecord;
use crate::core::backup;
use crate::core::file_lock::FileLock;
use crate::util::privilege;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// File to restore
    #[arg(value_enum)]
    pub artifact: Artifact,
}

pub fn run(ctx: &CliContext, args: RollbackArgs) -> Result<()> {
    let _lock = FileLock::acquire_run_lock(&ctx.paths.lock)?;
    let artifact = args.artifact;
    let target = artifact.target(&ctx.paths, &ctx.config);
    let actor = privilege::detect_actor();

    let result = backup::restore(&ctx.paths.backups, artifact, &target, artifact.default_mode());
    let record = match &result {
        Ok(()) => AuditRecord::success("rollback", &actor, artifact.name(), None),
        Err(e) => AuditRecord::failure("rollback", &actor, artifact.name(), format!("{:#}", e)),
    };
    ctx.audit(record);
    result?;

    println!("restored {} from backup", target.display());
    println!("to activate it, run: {}", artifact.reload_hint(&ctx.config));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit_log;
    use crate::core::paths::HostPaths;
    use crate::models::host_config::HostConfig;
    use crate::util::fs::write_atomic;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_rollback_restores_and_audits() {
        let dir = TempDir::new().unwrap();
        let ctx = CliContext::new(HostPaths::from_root(dir.path().to_path_buf()), HostConfig::default());
        write_atomic(&ctx.paths.daemon_json, b"{\"icc\": false}\n", 0o644).unwrap();
        backup::save(&ctx.paths.backups, Artifact::Daemon, b"{}\n").unwrap();

        run(&ctx, RollbackArgs { artifact: Artifact::Daemon }).unwrap();

        assert_eq!(fs::read_to_string(&ctx.paths.daemon_json).unwrap(), "{}\n");
        let entries = audit_log::read_log(&ctx.paths, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "rollback");
        assert!(entries[0].result.success);
    }

    #[test]
    fn test_rollback_without_backup_fails_and_audits() {
        let dir = TempDir::new().unwrap();
        let ctx = CliContext::new(HostPaths::from_root(dir.path().to_path_buf()), HostConfig::default());

        let err = run(&ctx, RollbackArgs { artifact: Artifact::Ssh }).unwrap_err();
        assert!(err.to_string().contains("no backup found"));
        let entries = audit_log::read_log(&ctx.paths, None).unwrap();
        assert!(!entries[0].result.success);
    }
}
