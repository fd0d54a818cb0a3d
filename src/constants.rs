//! Centralized constants for managed paths, permissions, and hardening values.

/// Default name of the containerized service.
pub const DEFAULT_SERVICE_NAME: &str = "secureapp";

/// Default SSH listening port after hardening.
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Default config file location (relative to the target root).
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hardenctl/hardenctl.toml";

/// State directory holding the lock, audit log, and backups.
pub const STATE_DIR: &str = "/var/lib/hardenctl";

/// SSH daemon configuration.
pub const SSHD_CONFIG_PATH: &str = "/etc/ssh/sshd_config";

/// SSH daemon drop-in directory (checked for conflicting directives).
pub const SSHD_DROPIN_DIR: &str = "/etc/ssh/sshd_config.d";

/// Directory for sysctl drop-ins.
pub const SYSCTL_DIR: &str = "/etc/sysctl.d";

/// Container runtime daemon configuration.
pub const DAEMON_JSON_PATH: &str = "/etc/docker/daemon.json";

/// Parent of per-service directories.
pub const SERVICE_BASE_DIR: &str = "/opt";

/// Distribution identification file.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Systemd unit name of the SSH daemon on Debian/Ubuntu.
pub const SSH_SERVICE: &str = "ssh";

/// Firewall front-end package and binary.
pub const FIREWALL_PACKAGE: &str = "ufw";

/// Default container runtime package.
pub const DEFAULT_RUNTIME_PACKAGE: &str = "docker.io";

/// Default container runtime systemd unit.
pub const DEFAULT_RUNTIME_SERVICE: &str = "docker";

/// Default group owning the service directories.
pub const DEFAULT_RUNTIME_GROUP: &str = "docker";

/// Default owner of the service directories.
pub const DEFAULT_DIRECTORY_OWNER: &str = "root";

/// Default container image.
pub const DEFAULT_IMAGE: &str = "secureapp:latest";

/// Default numeric `uid:gid` the container runs as.
pub const DEFAULT_CONTAINER_USER: &str = "1000:1000";

/// Default container process limit.
pub const DEFAULT_PIDS_LIMIT: u32 = 100;

/// Default container memory limit.
pub const DEFAULT_MEM_LIMIT: &str = "512m";

/// Default container CPU quota.
pub const DEFAULT_CPUS: f64 = 0.5;

/// Default json-file log rotation size.
pub const DEFAULT_LOG_MAX_SIZE: &str = "10m";

/// Default json-file log rotation count.
pub const DEFAULT_LOG_MAX_FILE: u32 = 3;

/// Permission mode for the service directory tree.
pub const SERVICE_DIR_MODE: u32 = 0o750;

/// Permission mode for a newly created sshd_config.
pub const SSHD_CONFIG_MODE: u32 = 0o644;

/// Permission mode for the sysctl drop-in.
pub const SYSCTL_DROPIN_MODE: u32 = 0o644;

/// Permission mode for daemon.json.
pub const DAEMON_JSON_MODE: u32 = 0o644;

/// Permission mode for the orchestration manifest.
pub const MANIFEST_MODE: u32 = 0o640;

/// Permission mode for the state directory.
pub const STATE_DIR_MODE: u32 = 0o700;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// Permission mode for artifact backups.
pub const BACKUP_FILE_MODE: u32 = 0o600;

/// Permission mode for the config file.
pub const CONFIG_FILE_MODE: u32 = 0o640;

/// Kernel tunables written to the sysctl drop-in, in file order.
pub const SYSCTL_SETTINGS: &[(&str, &str)] = &[
    ("net.ipv4.conf.all.rp_filter", "1"),
    ("net.ipv4.conf.default.rp_filter", "1"),
    ("net.ipv4.icmp_echo_ignore_broadcasts", "1"),
    ("net.ipv4.conf.all.accept_source_route", "0"),
    ("net.ipv4.conf.all.send_redirects", "0"),
    ("net.ipv4.tcp_syncookies", "1"),
    ("kernel.randomize_va_space", "2"),
];

/// Tools that must be on PATH before `apply`.
pub const REQUIRED_TOOLS: &[&str] = &["apt-get", "dpkg-query", "systemctl", "sysctl", "sshd"];

/// Marker written into generated files and commented-out directives.
pub const MANAGED_BY: &str = "hardenctl";
