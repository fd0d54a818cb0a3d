//! End-to-end `apply` against a scratch root with a scripted command runner.

use anyhow::Result;
use hardenctl::cli::{apply, CliContext};
use hardenctl::core::audit_log;
use hardenctl::core::inspect::{self, Status};
use hardenctl::core::paths::HostPaths;
use hardenctl::core::sshd;
use hardenctl::core::step::StepId;
use hardenctl::models::compose::ComposeFile;
use hardenctl::models::host_config::HostConfig;
use hardenctl::util::command::{CommandOutput, CommandRunner, CommandSpec};
use hardenctl::util::fs as host_fs;
use nix::unistd::{getegid, geteuid, Group, User};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

const DEBIAN_SSHD_CONFIG: &str = "\
Include /etc/ssh/sshd_config.d/*.conf

#Port 22
#AddressFamily any
#ListenAddress 0.0.0.0

#PermitRootLogin prohibit-password
#StrictModes yes

#PasswordAuthentication yes
#PermitEmptyPasswords no

KbdInteractiveAuthentication no
UsePAM yes
X11Forwarding yes
PrintMotd no

AcceptEnv LANG LC_*
Subsystem sftp /usr/lib/openssh/sftp-server
";

/// Fake host: packages appear once installed, services once enabled.
#[derive(Default)]
struct HostState {
    calls: Vec<String>,
    installed: BTreeSet<String>,
    running: BTreeSet<String>,
    /// Command line that exits with the given code.
    failing: Option<(String, i32)>,
}

#[derive(Clone, Default)]
struct FakeRunner {
    state: Rc<RefCell<HostState>>,
}

impl FakeRunner {
    fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }
}

impl CommandRunner for FakeRunner {
    fn output(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let line = command.to_string();
        let mut state = self.state.borrow_mut();
        state.calls.push(line.clone());

        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        let ok = |stdout: &str| CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        };
        let fail = |code: i32| CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
        };

        if let Some((failing, code)) = &state.failing {
            if *failing == line {
                return Ok(fail(*code));
            }
        }

        let output = match (command.program.as_str(), args.as_slice()) {
            ("dpkg-query", [.., name]) => {
                if state.installed.contains(*name) {
                    ok("install ok installed")
                } else {
                    fail(1)
                }
            }
            ("apt-get", ["install", "-y", name]) => {
                state.installed.insert(name.to_string());
                ok("")
            }
            ("systemctl", ["is-enabled" | "is-active", "--quiet", name]) => {
                if state.running.contains(*name) {
                    ok("")
                } else {
                    fail(3)
                }
            }
            ("systemctl", ["enable", "--now", name]) => {
                state.running.insert(name.to_string());
                ok("")
            }
            _ => ok(""),
        };
        Ok(output)
    }
}

struct Harness {
    _dir: TempDir,
    ctx: CliContext,
    runner: FakeRunner,
}

/// Scratch root with a stock sshd_config, owned by the invoking user.
///
/// `None` when the current uid/gid has no passwd/group entry to name.
fn harness() -> Option<Harness> {
    let user = User::from_uid(geteuid()).ok().flatten()?;
    let group = Group::from_gid(getegid()).ok().flatten()?;

    let dir = TempDir::new().unwrap();
    let paths = HostPaths::from_root(dir.path().to_path_buf());
    host_fs::write_atomic(&paths.sshd_config, DEBIAN_SSHD_CONFIG.as_bytes(), 0o644).unwrap();

    let mut config = HostConfig::default();
    config.directories.owner = user.name;
    config.runtime.group = group.name;

    let runner = FakeRunner::default();
    let mut ctx = CliContext::new(paths, config);
    ctx.runner = Box::new(runner.clone());
    Some(Harness {
        _dir: dir,
        ctx,
        runner,
    })
}

fn run_apply(h: &Harness, from: Option<StepId>) -> (Result<()>, String) {
    let mut out = Vec::new();
    let result = apply::execute(&h.ctx, from, &mut out).map(|_| ());
    (result, String::from_utf8(out).unwrap())
}

fn artifacts(h: &Harness) -> Vec<(String, String)> {
    let paths = &h.ctx.paths;
    let service = &h.ctx.config.host.service_name;
    [
        paths.sshd_config.clone(),
        paths.sysctl_dropin(service),
        paths.daemon_json.clone(),
        paths.manifest(service),
    ]
    .iter()
    .map(|p| (p.display().to_string(), fs::read_to_string(p).unwrap()))
    .collect()
}

#[test]
fn test_apply_hardens_fresh_host() {
    let Some(h) = harness() else { return };
    let (result, out) = run_apply(&h, None);
    result.unwrap();

    let progress: Vec<&str> = out.lines().filter(|l| l.starts_with('[')).collect();
    let expected: Vec<String> = StepId::ALL.iter().map(|s| s.progress_line()).collect();
    assert_eq!(progress, expected);
    assert!(out.contains("Hardening complete."));

    // every check verify would run passes
    let checks = inspect::verify_all(&h.ctx.config, &h.ctx.paths);
    let failures: Vec<_> = checks.iter().filter(|c| c.status == Status::Fail).collect();
    assert!(failures.is_empty(), "failed checks: {:?}", failures);

    let sshd_config = fs::read_to_string(&h.ctx.paths.sshd_config).unwrap();
    assert_eq!(sshd::active_values(&sshd_config, "Port"), vec!["2222"]);
    assert_eq!(sshd::active_values(&sshd_config, "PermitRootLogin"), vec!["no"]);
    assert_eq!(sshd::active_values(&sshd_config, "PasswordAuthentication"), vec!["no"]);

    let manifest = fs::read_to_string(h.ctx.paths.manifest("secureapp")).unwrap();
    let parsed: ComposeFile = serde_yaml::from_str(&manifest).unwrap();
    assert_eq!(parsed.services.len(), 1);

    let calls = h.runner.calls();
    for expected in [
        "apt-get update",
        "apt-get -y upgrade",
        "apt-get install -y ufw",
        "ufw default deny incoming",
        "ufw default allow outgoing",
        "ufw allow 2222/tcp",
        "ufw --force enable",
        "sysctl --system",
        "apt-get install -y docker.io",
        "systemctl enable --now docker",
        "systemctl restart docker",
        "systemctl restart ssh",
    ] {
        assert!(calls.iter().any(|c| c == expected), "missing call: {}", expected);
    }
    let pos = |needle: &str| calls.iter().position(|c| c == needle).unwrap();
    assert!(pos("apt-get update") < pos("systemctl restart ssh"));
    assert!(pos("systemctl restart ssh") < pos("ufw --force enable"));
}

#[test]
fn test_second_run_is_idempotent() {
    let Some(h) = harness() else { return };
    run_apply(&h, None).0.unwrap();
    let first = artifacts(&h);
    h.runner.clear();

    let (result, out) = run_apply(&h, None);
    result.unwrap();
    assert_eq!(artifacts(&h), first);
    assert_eq!(out.lines().filter(|l| l.starts_with('[')).count(), 9);

    // only the convergent commands run again; nothing is restarted or installed
    let calls = h.runner.calls();
    for skipped in [
        "systemctl restart ssh",
        "sysctl --system",
        "systemctl restart docker",
        "apt-get install -y ufw",
        "apt-get install -y docker.io",
    ] {
        assert!(!calls.iter().any(|c| c == skipped), "unexpected call: {}", skipped);
    }
    assert!(calls.iter().any(|c| c == "ufw --force enable"));

    let entries = audit_log::read_log(&h.ctx.paths, None).unwrap();
    assert_eq!(entries.len(), 18);
    assert!(entries[9..].iter().all(|e| e.changed == Some(0)));
    let chain = audit_log::verify_chain(&h.ctx.paths).unwrap();
    assert!(chain.iter().all(|c| c.status == Status::Pass), "{:?}", chain);
}

#[test]
fn test_failed_command_stops_run_with_exit_code() {
    let Some(h) = harness() else { return };
    h.runner.state.borrow_mut().failing = Some(("ufw --force enable".to_string(), 4));

    let (result, out) = run_apply(&h, None);
    let err = result.unwrap_err();
    assert_eq!(hardenctl::cli::exit_code(&err), 4);
    assert!(format!("{:#}", err).contains("step 'firewall' failed"));

    assert!(out.contains("[3/9] Configuring firewall"));
    assert!(!out.contains("[4/9]"));
    assert!(!h.ctx.paths.sysctl_dropin("secureapp").exists());

    let entries = audit_log::read_log(&h.ctx.paths, None).unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.target, "firewall");
    assert!(!last.result.success);
}

#[test]
fn test_missing_group_stops_before_manifest() {
    let Some(mut h) = harness() else { return };
    h.ctx.config.runtime.group = "hardenctl-no-such-group".to_string();

    let (result, out) = run_apply(&h, None);
    let err = result.unwrap_err();
    assert_eq!(hardenctl::cli::exit_code(&err), 1);
    assert!(format!("{:#}", err).contains("does not exist"));

    assert!(out.contains("[7/9] Provisioning service directories"));
    assert!(!out.contains("[8/9]"));
    assert!(!h.ctx.paths.manifest("secureapp").exists());
}

#[test]
fn test_resume_from_step() {
    let Some(h) = harness() else { return };
    let (result, out) = run_apply(&h, Some(StepId::Kernel));
    result.unwrap();

    assert!(out.starts_with("[4/9] Applying kernel hardening"));
    let calls = h.runner.calls();
    assert!(!calls.iter().any(|c| c == "apt-get update"));
    // untouched because the ssh step was skipped
    assert_eq!(
        fs::read_to_string(&h.ctx.paths.sshd_config).unwrap(),
        DEBIAN_SSHD_CONFIG
    );
}

#[test]
fn test_changed_artifact_is_backed_up_and_rewritten() {
    let Some(h) = harness() else { return };
    host_fs::write_atomic(&h.ctx.paths.daemon_json, b"{\"icc\": true}\n", 0o644).unwrap();

    run_apply(&h, None).0.unwrap();

    let backup = h.ctx.paths.backups.join("daemon.prev");
    assert_eq!(fs::read_to_string(&backup).unwrap(), "{\"icc\": true}\n");
    let daemon: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&h.ctx.paths.daemon_json).unwrap()).unwrap();
    assert_eq!(daemon["icc"], serde_json::Value::Bool(false));
    assert_eq!(daemon.as_object().unwrap().len(), 4);
}

#[test]
fn test_failed_restart_is_reissued_on_resume() {
    let Some(h) = harness() else { return };
    h.runner.state.borrow_mut().failing = Some(("systemctl restart docker".to_string(), 1));
    let (result, out) = run_apply(&h, None);
    assert!(result.is_err());
    assert!(!out.contains("[7/9]"));

    h.runner.state.borrow_mut().failing = None;
    h.runner.clear();
    let (result, _) = run_apply(&h, Some(StepId::RuntimeHardening));
    result.unwrap();

    let calls = h.runner.calls();
    assert!(calls.iter().any(|c| c == "systemctl restart docker"), "{:?}", calls);
    assert!(!h.ctx.paths.pending.join("runtime-hardening").exists());

    // owed once, not forever
    h.runner.clear();
    run_apply(&h, Some(StepId::RuntimeHardening)).0.unwrap();
    assert!(!h.runner.calls().iter().any(|c| c == "systemctl restart docker"));
}

#[test]
fn test_failed_sshd_validation_is_retried_on_resume() {
    let Some(h) = harness() else { return };
    let validate = format!("sshd -t -f {}", h.ctx.paths.sshd_config.display());
    h.runner.state.borrow_mut().failing = Some((validate.clone(), 255));
    let (result, _) = run_apply(&h, None);
    assert_eq!(hardenctl::cli::exit_code(&result.unwrap_err()), 255);
    assert!(h.ctx.paths.pending.join("ssh").exists());

    h.runner.state.borrow_mut().failing = None;
    h.runner.clear();
    run_apply(&h, Some(StepId::Ssh)).0.unwrap();

    let calls = h.runner.calls();
    let pos = |needle: &str| calls.iter().position(|c| c == needle);
    let validated = pos(&validate).expect("sshd -t not re-run");
    let restarted = pos("systemctl restart ssh").expect("ssh not restarted");
    assert!(validated < restarted);
    assert!(!h.ctx.paths.pending.join("ssh").exists());
}

#[test]
fn test_non_utf8_manifest_is_overwritten() {
    let Some(h) = harness() else { return };
    let manifest = h.ctx.paths.manifest("secureapp");
    host_fs::write_atomic(&manifest, &[0xff, 0xfe, 0x00, b'x'], 0o640).unwrap();

    let (result, out) = run_apply(&h, None);
    result.unwrap();
    assert!(out.contains("[9/9] Done"));

    let parsed: ComposeFile = serde_yaml::from_str(&fs::read_to_string(&manifest).unwrap()).unwrap();
    assert!(parsed.services.contains_key("secureapp"));
    assert_eq!(
        fs::read(h.ctx.paths.backups.join("manifest.prev")).unwrap(),
        vec![0xff, 0xfe, 0x00, b'x']
    );
}
