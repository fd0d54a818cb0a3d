//! Previous-version backups of file artifacts.

use crate::constants;
use crate::core::action::Artifact;
use crate::util::fs as host_fs;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn backup_path(backups: &Path, artifact: Artifact) -> PathBuf {
    backups.join(format!("{}.prev", artifact.name()))
}

/// Keep `content` as the previous version of `artifact`, replacing any older backup.
pub fn save(backups: &Path, artifact: Artifact, content: &[u8]) -> Result<PathBuf> {
    host_fs::ensure_dir(backups, constants::STATE_DIR_MODE)?;
    let path = backup_path(backups, artifact);
    host_fs::write_atomic(&path, content, constants::BACKUP_FILE_MODE)
        .with_context(|| format!("back up {}", artifact.name()))?;
    tracing::debug!(artifact = artifact.name(), path = %path.display(), "saved backup");
    Ok(path)
}

/// Put the previous version back at `target` and drop the backup.
pub fn restore(backups: &Path, artifact: Artifact, target: &Path, default_mode: u32) -> Result<()> {
    let path = backup_path(backups, artifact);
    if !path.is_file() {
        bail!(
            "no backup found for '{}' at {}; nothing to roll back",
            artifact.name(),
            path.display()
        );
    }
    let content = fs::read(&path).with_context(|| format!("read backup {}", path.display()))?;
    let mode = host_fs::mode_of(target).unwrap_or(default_mode);
    host_fs::write_atomic(target, &content, mode)
        .with_context(|| format!("restore {}", target.display()))?;
    fs::remove_file(&path).with_context(|| format!("remove backup {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_restore() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        let target = dir.path().join("daemon.json");
        fs::write(&target, "new").unwrap();

        let saved = save(&backups, Artifact::Daemon, b"old").unwrap();
        assert_eq!(host_fs::mode_of(&saved), Some(constants::BACKUP_FILE_MODE));

        restore(&backups, Artifact::Daemon, &target, 0o644).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert!(!saved.exists());
    }

    #[test]
    fn test_restore_without_backup_fails() {
        let dir = TempDir::new().unwrap();
        let err = restore(dir.path(), Artifact::Ssh, &dir.path().join("x"), 0o644).unwrap_err();
        assert!(err.to_string().contains("no backup found"));
    }

    #[test]
    fn test_save_overwrites_older_backup() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), Artifact::Manifest, b"v1").unwrap();
        let path = save(dir.path(), Artifact::Manifest, b"v2").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "v2");
    }
}
