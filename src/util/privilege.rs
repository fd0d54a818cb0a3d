//! Privilege checks and account lookups.

use anyhow::{bail, Context, Result};
use nix::unistd::{Gid, Group, Uid, User};

/// Check if the current process is running as root (euid 0).
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Require root for a given action, or bail with an error.
pub fn require_root(action: &str) -> Result<()> {
    if !is_root() {
        bail!("'{}' requires root privileges. Run with sudo.", action);
    }
    Ok(())
}

/// Resolve a group name to its gid. `Ok(None)` when the group does not exist.
pub fn lookup_group(name: &str) -> Result<Option<Gid>> {
    let group = Group::from_name(name).with_context(|| format!("look up group '{}'", name))?;
    Ok(group.map(|g| g.gid))
}

/// Resolve a user name to its uid. `Ok(None)` when the user does not exist.
pub fn lookup_user(name: &str) -> Result<Option<Uid>> {
    let user = User::from_name(name).with_context(|| format!("look up user '{}'", name))?;
    Ok(user.map(|u| u.uid))
}

/// Name of the invoking user, preferring the sudo caller.
pub fn detect_actor() -> String {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return format!("{}(sudo)", user);
        }
    }
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_root_returns_bool() {
        let _ = is_root();
    }

    #[test]
    fn test_lookup_root_group() {
        assert_eq!(lookup_group("root").unwrap(), Some(Gid::from_raw(0)));
    }

    #[test]
    fn test_lookup_root_user() {
        assert_eq!(lookup_user("root").unwrap(), Some(Uid::from_raw(0)));
    }

    #[test]
    fn test_lookup_missing_group() {
        assert_eq!(lookup_group("hardenctl-no-such-group").unwrap(), None);
    }
}
