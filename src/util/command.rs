//! External command execution.
//!
//! Every system utility (`apt-get`, `systemctl`, `ufw`, `sysctl`, ...) goes
//! through [`CommandRunner`] so the reconciliation engine can be driven by a
//! scripted runner in tests.

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::io::ErrorKind;
use std::process::Command;

/// Exit status reported when the program could not be found (shell convention).
const EXIT_NOT_FOUND: i32 = 127;

/// A fully specified invocation of a system utility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// `apt-get` with a non-interactive frontend.
    pub fn apt_get<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("apt-get", args).with_env("DEBIAN_FRONTEND", "noninteractive")
    }

    pub fn systemctl<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("systemctl", args)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A command exited non-zero (or could not be started).
#[derive(Debug, thiserror::Error)]
#[error("command `{command}` failed ({status}){detail}")]
pub struct CommandError {
    pub command: String,
    pub code: Option<i32>,
    status: String,
    detail: String,
}

impl CommandError {
    pub fn new(command: &CommandSpec, output: &CommandOutput) -> Self {
        let status = match output.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let combined = format!("{}{}", output.stdout, output.stderr);
        let trimmed = combined.trim();
        let detail = if trimmed.is_empty() {
            String::new()
        } else {
            format!(": {}", trimmed)
        };
        Self {
            command: command.to_string(),
            code: output.code,
            status,
            detail,
        }
    }

    /// Process exit code to propagate for this failure (never 0).
    pub fn exit_code(&self) -> i32 {
        match self.code {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }
}

pub trait CommandRunner {
    /// Run a command to completion and capture its output.
    fn output(&self, command: &CommandSpec) -> Result<CommandOutput>;

    /// Run a command and fail with [`CommandError`] on a non-zero exit.
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let output = self.output(command)?;
        if output.success() {
            return Ok(output);
        }
        Err(CommandError::new(command, &output).into())
    }
}

/// Runs commands on the local host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, command: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!(command = %command, "exec");
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(CommandOutput {
                    code: Some(EXIT_NOT_FOUND),
                    stdout: String::new(),
                    stderr: format!("{}: command not found", command.program),
                });
            }
            Err(e) => return Err(anyhow::Error::new(e).context(format!("run {}", command))),
        };
        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(command = %command, code = ?result.code, "exit");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_args() {
        let cmd = CommandSpec::new("ufw", ["allow", "2222/tcp"]);
        assert_eq!(cmd.to_string(), "ufw allow 2222/tcp");
    }

    #[test]
    fn test_apt_get_is_noninteractive() {
        let cmd = CommandSpec::apt_get(["update"]);
        assert_eq!(
            cmd.env,
            vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]
        );
    }

    #[test]
    fn test_error_includes_output_and_code() {
        let cmd = CommandSpec::new("apt-get", ["update"]);
        let output = CommandOutput {
            code: Some(100),
            stdout: String::new(),
            stderr: "E: Could not get lock\n".to_string(),
        };
        let err = CommandError::new(&cmd, &output);
        assert_eq!(err.exit_code(), 100);
        let msg = err.to_string();
        assert!(msg.contains("apt-get update"));
        assert!(msg.contains("exit code 100"));
        assert!(msg.contains("Could not get lock"));
    }

    #[test]
    fn test_signal_maps_to_exit_one() {
        let cmd = CommandSpec::new("sysctl", ["--system"]);
        let err = CommandError::new(&cmd, &CommandOutput::default());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_system_runner_missing_program() {
        let cmd = CommandSpec::new("hardenctl-definitely-missing-binary", Vec::<String>::new());
        let err = SystemRunner.run(&cmd).unwrap_err();
        let cmd_err = err.downcast_ref::<CommandError>().unwrap();
        assert_eq!(cmd_err.exit_code(), 127);
    }

    #[test]
    fn test_system_runner_success() {
        let cmd = CommandSpec::new("true", Vec::<String>::new());
        assert!(SystemRunner.run(&cmd).is_ok());
    }
}
