//! External command execution.
//!
//! Every host mutation that goes through a system tool (package manager,
//! firewall, certificate client, mail-server control) is described as a
//! [`CommandSpec`] and handed to a [`CommandRunner`]. The real runner spawns
//! the process; tests swap in a recorder.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{ProvisionError, Result};

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    /// Inherit the terminal's stdin so the command can prompt the operator.
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Build the `std::process::Command` this spec describes.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        if self.interactive {
            cmd.stdin(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runs external commands; a non-zero exit is an error.
pub trait CommandRunner {
    fn run(&mut self, cmd: &CommandSpec) -> Result<()>;
}

/// Spawns real processes, inheriting stdout/stderr so the operator sees
/// tool output as it happens.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, cmd: &CommandSpec) -> Result<()> {
        debug!(command = %cmd, interactive = cmd.interactive, "spawning");
        let status = cmd
            .to_command()
            .status()
            .map_err(|err| ProvisionError::ExternalCommand {
                command: cmd.to_string(),
                status: format!("spawn error: {err}"),
            })?;

        if !status.success() {
            return Err(ProvisionError::ExternalCommand {
                command: cmd.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Check whether `tool` resolves on `PATH`.
pub fn command_exists(tool: &str) -> bool {
    which::which(tool).is_ok()
}

/// Fail with [`ProvisionError::MissingArtifact`] unless `path` exists.
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ProvisionError::MissingArtifact {
            path: path.to_path_buf(),
        })
    }
}
