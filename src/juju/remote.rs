//! Remote shell channel to controller machines.

#![allow(missing_docs)]

use std::process::Command;

use crate::core::config::RemoteConfig;
use crate::core::errors::{MmaError, Result};

/// Action on a named service on a remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Stop,
    Start,
}

impl ServiceAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
        }
    }
}

/// Runs one shell command on a remote host.
pub trait RemoteShell: Send + Sync {
    fn run(&self, host: &str, command: &str) -> Result<String>;

    /// `sudo service <name> <action>` on `host`.
    fn service(&self, host: &str, service: &str, action: ServiceAction) -> Result<String> {
        self.run(host, &format!("sudo service {service} {}", action.as_str()))
    }
}

/// [`RemoteShell`] over the local `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshRemote {
    config: RemoteConfig,
}

impl SshRemote {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    fn ssh_args(&self, host: &str, command: &str) -> Vec<String> {
        let mut args = self.config.ssh_options.clone();
        args.push(format!("{}@{host}", self.config.ssh_user));
        args.push(command.to_string());
        args
    }
}

impl RemoteShell for SshRemote {
    fn run(&self, host: &str, command: &str) -> Result<String> {
        let output = Command::new(&self.config.ssh_bin)
            .args(self.ssh_args(host, command))
            .output()
            .map_err(|source| MmaError::io(&self.config.ssh_bin, source))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(MmaError::Remote {
                host: host.to_string(),
                details: format!(
                    "`{command}` failed (exit {}): {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}
