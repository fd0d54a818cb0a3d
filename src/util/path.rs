//! Path normalization and target-root mapping without filesystem access.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving `.` and `..` components without filesystem access.
///
/// `..` never climbs above the root component of an absolute path.
pub fn normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !matches!(components.last(), Some(Component::RootDir) | None) {
                    components.pop();
                }
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Check if `path` is contained within `root` after normalization.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let normalized = normalize(path);
    let root_normalized = normalize(root);
    normalized.starts_with(&root_normalized)
}

/// Map an absolute host path (e.g. `/etc/ssh/sshd_config`) under a target root.
pub fn reroot(root: &Path, host_path: &Path) -> PathBuf {
    let normalized = normalize(host_path);
    let relative = normalized.strip_prefix("/").unwrap_or(&normalized);
    if relative.as_os_str().is_empty() {
        return root.to_path_buf();
    }
    root.join(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_simple() {
        assert_eq!(normalize(Path::new("/a/b/c")), PathBuf::from("/a/b/c"));
    }

    #[test]
    fn test_normalize_dotdot() {
        assert_eq!(normalize(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn test_normalize_dot() {
        assert_eq!(normalize(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_normalize_does_not_escape_root() {
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_is_within_false_traversal() {
        assert!(!is_within(
            Path::new("/opt/secureapp/../../etc/passwd"),
            Path::new("/opt/secureapp")
        ));
    }

    #[test]
    fn test_reroot_host_root_is_identity() {
        assert_eq!(
            reroot(Path::new("/"), Path::new("/etc/ssh/sshd_config")),
            PathBuf::from("/etc/ssh/sshd_config")
        );
    }

    #[test]
    fn test_reroot_under_prefix() {
        assert_eq!(
            reroot(Path::new("/mnt/target"), Path::new("/etc/docker/daemon.json")),
            PathBuf::from("/mnt/target/etc/docker/daemon.json")
        );
    }

    #[test]
    fn test_reroot_stays_within_prefix() {
        let mapped = reroot(Path::new("/mnt/target"), Path::new("/../../etc/shadow"));
        assert!(is_within(&mapped, Path::new("/mnt/target")));
    }
}
