//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MmaError, Result};

/// Full harness configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub controllers: ControllersConfig,
    pub timeouts: TimeoutsConfig,
    pub remote: RemoteConfig,
    pub probe: ProbeConfig,
    pub fixtures: FixturesConfig,
    pub paths: PathsConfig,
}

/// The two already-bootstrapped controllers under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllersConfig {
    /// Controller that hosts the models before migration.
    pub source: String,
    /// Controller models are migrated to.
    pub destination: String,
    /// `JUJU_DATA` directory shared by both admin clients.
    pub juju_home: PathBuf,
    /// Juju client binary.
    pub juju_bin: PathBuf,
    /// Development feature flags exported as `JUJU_DEV_FEATURE_FLAGS`.
    pub feature_flags: Vec<String>,
}

/// Bounded-wait budgets, in seconds unless suffixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub model_presence_secs: u64,
    pub model_absence_secs: u64,
    pub migrating_secs: u64,
    pub log_replication_secs: u64,
    pub started_secs: u64,
    pub workloads_secs: u64,
    pub poll_interval_ms: u64,
    /// Ambient deadline for the whole run; 0 disables it.
    pub soft_deadline_secs: u64,
}

/// Remote shell channel used by the failure injector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    pub ssh_bin: PathBuf,
    pub ssh_user: String,
    pub ssh_options: Vec<String>,
    /// Machine id of the controller's primary node.
    pub controller_machine: String,
    /// Service name; `{machine}` is replaced with `controller_machine`.
    pub service_template: String,
}

/// HTTP probe against deployed units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeConfig {
    pub http_timeout_secs: u64,
    /// Unit index probed (`<app>/<index>`).
    pub unit_index: u32,
    /// Payload the resource charm serves when no resource was attached.
    pub default_payload: String,
}

/// Workload fixtures deployed through the command surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixturesConfig {
    /// Local charm repository; charms resolve to `<repo>/<series>/<name>`.
    pub charm_repository: PathBuf,
    pub series: String,
    pub resource_charm: String,
    pub dummy_charm: String,
    pub resource_length: usize,
}

/// Filesystem paths used by mma.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
    /// Parent of the isolated `JUJU_DATA` directories for provisioned users.
    pub scratch_dir: PathBuf,
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[MMA-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

impl Default for ControllersConfig {
    fn default() -> Self {
        Self {
            source: "mma-source".to_string(),
            destination: "mma-destination".to_string(),
            juju_home: home_dir().join(".local").join("share").join("juju"),
            juju_bin: PathBuf::from("juju"),
            feature_flags: vec!["migration".to_string()],
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            model_presence_secs: 60,
            model_absence_secs: 60,
            migrating_secs: 60,
            log_replication_secs: 60,
            started_secs: 1_200,
            workloads_secs: 600,
            poll_interval_ms: 1_000,
            soft_deadline_secs: 0,
        }
    }
}

impl TimeoutsConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn model_presence(&self) -> Duration {
        Duration::from_secs(self.model_presence_secs)
    }

    #[must_use]
    pub const fn model_absence(&self) -> Duration {
        Duration::from_secs(self.model_absence_secs)
    }

    #[must_use]
    pub const fn migrating(&self) -> Duration {
        Duration::from_secs(self.migrating_secs)
    }

    #[must_use]
    pub const fn log_replication(&self) -> Duration {
        Duration::from_secs(self.log_replication_secs)
    }

    #[must_use]
    pub const fn started(&self) -> Duration {
        Duration::from_secs(self.started_secs)
    }

    #[must_use]
    pub const fn workloads(&self) -> Duration {
        Duration::from_secs(self.workloads_secs)
    }

    #[must_use]
    pub const fn soft_deadline(&self) -> Option<Duration> {
        if self.soft_deadline_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.soft_deadline_secs))
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_bin: PathBuf::from("ssh"),
            ssh_user: "ubuntu".to_string(),
            ssh_options: vec![
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
                "-o".to_string(),
                "ConnectTimeout=30".to_string(),
            ],
            controller_machine: "0".to_string(),
            service_template: "jujud-machine-{machine}".to_string(),
        }
    }
}

impl RemoteConfig {
    /// Name of the agent service on the controller's primary node.
    #[must_use]
    pub fn service_name(&self) -> String {
        self.service_template
            .replace("{machine}", &self.controller_machine)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 10,
            unit_index: 0,
            default_payload: "simple-server.".to_string(),
        }
    }
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            charm_repository: home_dir().join("repository").join("charms"),
            series: "xenial".to_string(),
            resource_charm: "simple-resource-http".to_string(),
            dummy_charm: "dummy-source".to_string(),
            resource_length: 20,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home_dir();
        let cfg = home.join(".config").join("mma").join("config.toml");
        let data = home.join(".local").join("share").join("mma");
        Self {
            config_file: cfg,
            jsonl_log: data.join("activity.jsonl"),
            scratch_dir: data.join("users"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| MmaError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(MmaError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the run log.
    ///
    /// FNV-1a over canonical JSON, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // controllers
        if let Some(raw) = lookup("MMA_SOURCE_CONTROLLER") {
            self.controllers.source = raw;
        }
        if let Some(raw) = lookup("MMA_DESTINATION_CONTROLLER") {
            self.controllers.destination = raw;
        }
        if let Some(raw) = lookup("MMA_JUJU_HOME").or_else(|| lookup("JUJU_DATA")) {
            self.controllers.juju_home = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("MMA_JUJU_BIN") {
            self.controllers.juju_bin = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("MMA_FEATURE_FLAGS") {
            self.controllers.feature_flags = raw
                .split(',')
                .map(str::trim)
                .filter(|flag| !flag.is_empty())
                .map(str::to_string)
                .collect();
        }

        // timeouts
        for (name, slot) in [
            (
                "MMA_TIMEOUT_MODEL_PRESENCE_SECS",
                &mut self.timeouts.model_presence_secs,
            ),
            (
                "MMA_TIMEOUT_MODEL_ABSENCE_SECS",
                &mut self.timeouts.model_absence_secs,
            ),
            (
                "MMA_TIMEOUT_MIGRATING_SECS",
                &mut self.timeouts.migrating_secs,
            ),
            (
                "MMA_TIMEOUT_LOG_REPLICATION_SECS",
                &mut self.timeouts.log_replication_secs,
            ),
            ("MMA_TIMEOUT_STARTED_SECS", &mut self.timeouts.started_secs),
            (
                "MMA_TIMEOUT_WORKLOADS_SECS",
                &mut self.timeouts.workloads_secs,
            ),
            (
                "MMA_POLL_INTERVAL_MS",
                &mut self.timeouts.poll_interval_ms,
            ),
            (
                "MMA_SOFT_DEADLINE_SECS",
                &mut self.timeouts.soft_deadline_secs,
            ),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_u64(name, &raw)?;
            }
        }

        // remote
        if let Some(raw) = lookup("MMA_SSH_USER") {
            self.remote.ssh_user = raw;
        }
        if let Some(raw) = lookup("MMA_CONTROLLER_MACHINE") {
            self.remote.controller_machine = raw;
        }

        // fixtures
        if let Some(raw) = lookup("MMA_CHARM_REPOSITORY").or_else(|| lookup("JUJU_REPOSITORY")) {
            self.fixtures.charm_repository = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("MMA_SERIES") {
            self.fixtures.series = raw;
        }

        // paths
        if let Some(raw) = lookup("MMA_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("MMA_SCRATCH_DIR") {
            self.paths.scratch_dir = PathBuf::from(raw);
        }

        Ok(())
    }

    fn normalize(&mut self) {
        self.controllers.source = self.controllers.source.trim().to_string();
        self.controllers.destination = self.controllers.destination.trim().to_string();
        self.controllers.feature_flags.sort();
        self.controllers.feature_flags.dedup();
    }

    pub fn validate(&self) -> Result<()> {
        if self.controllers.source.is_empty() || self.controllers.destination.is_empty() {
            return Err(MmaError::InvalidConfig {
                details: "controllers.source and controllers.destination must be set".to_string(),
            });
        }
        if self.controllers.source == self.controllers.destination {
            return Err(MmaError::InvalidConfig {
                details: format!(
                    "controllers.source and controllers.destination must differ, both are {:?}",
                    self.controllers.source
                ),
            });
        }

        for (name, val) in [
            ("model_presence_secs", self.timeouts.model_presence_secs),
            ("model_absence_secs", self.timeouts.model_absence_secs),
            ("migrating_secs", self.timeouts.migrating_secs),
            ("log_replication_secs", self.timeouts.log_replication_secs),
            ("started_secs", self.timeouts.started_secs),
            ("workloads_secs", self.timeouts.workloads_secs),
            ("poll_interval_ms", self.timeouts.poll_interval_ms),
        ] {
            if val == 0 {
                return Err(MmaError::InvalidConfig {
                    details: format!("timeouts.{name} must be > 0"),
                });
            }
        }

        if self.remote.controller_machine.trim().is_empty() {
            return Err(MmaError::InvalidConfig {
                details: "remote.controller_machine must be set".to_string(),
            });
        }
        if !self.remote.service_template.contains("{machine}") {
            return Err(MmaError::InvalidConfig {
                details: format!(
                    "remote.service_template must contain {{machine}}, got {:?}",
                    self.remote.service_template
                ),
            });
        }

        if self.probe.http_timeout_secs == 0 {
            return Err(MmaError::InvalidConfig {
                details: "probe.http_timeout_secs must be > 0".to_string(),
            });
        }

        if self.fixtures.resource_length == 0 {
            return Err(MmaError::InvalidConfig {
                details: "fixtures.resource_length must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| MmaError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
