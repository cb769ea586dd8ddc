//! Command invocation surface: run one juju command, get its stdout back or
//! a [`MmaError::CommandFailed`] carrying the captured error text.

#![allow(missing_docs)]

use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::errors::{MmaError, Result};

/// One fully resolved juju invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// `JUJU_DATA` for the acting identity.
    pub juju_home: PathBuf,
    /// Subcommand followed by its arguments.
    pub args: Vec<String>,
    /// Text fed to the process's stdin (interactive prompts).
    pub stdin: Option<String>,
}

impl Invocation {
    #[must_use]
    pub fn new(juju_home: &Path, command: &str) -> Self {
        Self {
            juju_home: juju_home.to_path_buf(),
            args: vec![command.to_string()],
            stdin: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Subcommand name.
    #[must_use]
    pub fn command(&self) -> &str {
        self.args.first().map_or("", String::as_str)
    }

    /// Printable command line.
    #[must_use]
    pub fn display(&self) -> String {
        format!("juju {}", self.args.join(" "))
    }
}

/// Executes juju invocations. The harness never talks to a controller any
/// other way.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<String>;
}

/// [`CommandRunner`] backed by the real juju client binary.
#[derive(Debug, Clone)]
pub struct CliRunner {
    juju_bin: PathBuf,
    feature_flags: Vec<String>,
}

impl CliRunner {
    #[must_use]
    pub fn new(juju_bin: impl Into<PathBuf>, feature_flags: Vec<String>) -> Self {
        Self {
            juju_bin: juju_bin.into(),
            feature_flags,
        }
    }
}

impl CommandRunner for CliRunner {
    fn run(&self, invocation: &Invocation) -> Result<String> {
        let mut command = Command::new(&self.juju_bin);
        command
            .args(&invocation.args)
            .env("JUJU_DATA", &invocation.juju_home)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if !self.feature_flags.is_empty() {
            command.env("JUJU_DEV_FEATURE_FLAGS", self.feature_flags.join(","));
        }

        let mut child = command
            .spawn()
            .map_err(|source| MmaError::io(&self.juju_bin, source))?;
        if let Some(input) = &invocation.stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            // A child that exits without reading its prompt closes the pipe
            // early; its exit status and stderr still decide the result.
            match pipe.write_all(input.as_bytes()) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
                Err(source) => {
                    drop(pipe);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MmaError::io(&self.juju_bin, source));
                }
            }
        }
        let output = child
            .wait_with_output()
            .map_err(|source| MmaError::io(&self.juju_bin, source))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(MmaError::CommandFailed {
                command: invocation.display(),
                exit_code: output.status.code().unwrap_or(-1),
                stdout,
                stderr: stderr.trim().to_string(),
            })
        }
    }
}
