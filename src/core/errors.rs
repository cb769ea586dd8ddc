//! MMA-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MmaError>;

/// Stderr marker the juju client prints while a model is mid-removal.
pub const TRANSIENT_REMOVAL_MARKER: &str = "cannot get model details";

/// Marker the juju client prints when a migrate request lacks rights.
pub const PERMISSION_DENIED_MARKER: &str = "permission denied";

/// Top-level error type for the model migration assessor.
#[derive(Debug, Error)]
pub enum MmaError {
    #[error("[MMA-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MMA-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MMA-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[MMA-2001] command `{command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("[MMA-2002] unexpected output from {context}: {details}")]
    OutputParse {
        context: &'static str,
        details: String,
    },

    #[error("[MMA-2003] soft deadline of {deadline_secs}s exceeded before `{command}`")]
    SoftDeadline { command: String, deadline_secs: u64 },

    #[error("[MMA-3001] {subject} not satisfied after {timeout_secs} seconds: {details}")]
    CheckTimeout {
        subject: String,
        timeout_secs: u64,
        details: String,
    },

    #[error("[MMA-3002] authorization rejected for `{command}`: {output}")]
    AuthorizationRejected { command: String, output: String },

    #[error("[MMA-3003] assertion failed: {details}")]
    Assertion { details: String },

    #[error("[MMA-3004] migration attempt for {model} cannot move from {from} to {to}")]
    InvalidTransition {
        model: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("[MMA-4001] probe of {url} failed: {details}")]
    Probe { url: String, details: String },

    #[error("[MMA-4002] remote command on {host} failed: {details}")]
    Remote { host: String, details: String },

    #[error("[MMA-9001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MMA-9002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MMA-9900] runtime failure: {details}")]
    Runtime { details: String },
}

impl MmaError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MMA-1001",
            Self::MissingConfig { .. } => "MMA-1002",
            Self::ConfigParse { .. } => "MMA-1003",
            Self::CommandFailed { .. } => "MMA-2001",
            Self::OutputParse { .. } => "MMA-2002",
            Self::SoftDeadline { .. } => "MMA-2003",
            Self::CheckTimeout { .. } => "MMA-3001",
            Self::AuthorizationRejected { .. } => "MMA-3002",
            Self::Assertion { .. } => "MMA-3003",
            Self::InvalidTransition { .. } => "MMA-3004",
            Self::Probe { .. } => "MMA-4001",
            Self::Remote { .. } => "MMA-4002",
            Self::Io { .. } => "MMA-9001",
            Self::Serialization { .. } => "MMA-9002",
            Self::Runtime { .. } => "MMA-9900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Scenario-level failures are never retried by the runner; this only
    /// informs callers that poll for eventual state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::Probe { .. } | Self::Io { .. }
        )
    }

    /// A fetch failure that only means the model is being torn down.
    #[must_use]
    pub fn is_transient_removal(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => stderr.contains(TRANSIENT_REMOVAL_MARKER),
            _ => false,
        }
    }

    /// A command refused for lack of rights.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::AuthorizationRejected { .. } => true,
            other => other
                .captured_output()
                .is_some_and(|out| out.contains(PERMISSION_DENIED_MARKER)),
        }
    }

    /// Reclassify a permission-denied command failure as
    /// [`MmaError::AuthorizationRejected`]; anything else passes through.
    #[must_use]
    pub fn into_authorization(self) -> Self {
        match self {
            Self::CommandFailed {
                command,
                stdout,
                stderr,
                ..
            } if stdout.contains(PERMISSION_DENIED_MARKER)
                || stderr.contains(PERMISSION_DENIED_MARKER) =>
            {
                let output = if stdout.is_empty() {
                    stderr
                } else {
                    format!("{stdout}\n{stderr}")
                };
                Self::AuthorizationRejected { command, output }
            }
            other => other,
        }
    }

    /// Combined captured output of a failed command (stdout then stderr).
    #[must_use]
    pub fn captured_output(&self) -> Option<String> {
        match self {
            Self::CommandFailed { stdout, stderr, .. } => {
                if stdout.is_empty() {
                    Some(stderr.clone())
                } else {
                    Some(format!("{stdout}\n{stderr}"))
                }
            }
            _ => None,
        }
    }

    /// Convenience constructor for assertion failures.
    #[must_use]
    pub fn assertion(details: impl Into<String>) -> Self {
        Self::Assertion {
            details: details.into(),
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for MmaError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for MmaError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Serialization {
            context: "serde_yaml",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MmaError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(feature = "probe")]
impl From<reqwest::Error> for MmaError {
    fn from(value: reqwest::Error) -> Self {
        Self::Probe {
            url: value
                .url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            details: value.to_string(),
        }
    }
}
