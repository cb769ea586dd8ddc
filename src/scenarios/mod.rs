//! Scenario catalogue and the runner that executes it.
//!
//! Scenarios run once each, in catalogue order. The first failure aborts the
//! run; every later scenario is reported as skipped.

#![allow(missing_docs)]

pub mod fixtures;
mod steps;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::juju::client::JujuClient;
use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
use crate::juju::remote::RemoteShell;
use crate::juju::runner::CommandRunner;
use crate::logger::recorder::{Recorder, RunEvent};
use crate::migration::driver::MigrationDriver;
use crate::migration::inject::FailureInjector;
use crate::migration::oracle::{ContinuityOracle, HttpProbe};
use crate::migration::permissions::PermissionHarness;
use crate::wait::clock::Clock;
use crate::wait::deadline::SoftDeadline;
use crate::wait::poll::PollEngine;

use self::fixtures::Fixtures;

/// User the configured controllers are driven as.
pub const ADMIN_USER: &str = "admin";

// ──────────────────── catalogue ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Migrate a model whose application serves a resource payload.
    ResourcesMigration,
    /// Pre-migration debug log reappears after migration.
    LogContinuity,
    /// A non-superuser's migrate request is refused.
    InsufficientPermission,
    /// A superuser migrates their own model.
    SuperuserPermission,
    /// A superuser migrates another user's model.
    SuperuserMigratesOtherUser,
    /// Destination outage mid-migration rolls the model back.
    RollbackOnFailure,
    /// Controller identity and registry follow the model.
    ApiLoginRedirect,
    /// The first migrated model still works at the end of the run.
    MigratedModelRecheck,
}

impl Scenario {
    pub const ALL: [Self; 8] = [
        Self::ResourcesMigration,
        Self::LogContinuity,
        Self::InsufficientPermission,
        Self::SuperuserPermission,
        Self::SuperuserMigratesOtherUser,
        Self::RollbackOnFailure,
        Self::ApiLoginRedirect,
        Self::MigratedModelRecheck,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ResourcesMigration => "resources-migration",
            Self::LogContinuity => "log-continuity",
            Self::InsufficientPermission => "insufficient-permission",
            Self::SuperuserPermission => "superuser-permission",
            Self::SuperuserMigratesOtherUser => "superuser-migrates-other-user",
            Self::RollbackOnFailure => "rollback-on-failure",
            Self::ApiLoginRedirect => "api-login-redirect",
            Self::MigratedModelRecheck => "migrated-model-recheck",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ResourcesMigration => {
                "migrate a resource-serving model; payload, placement and readiness survive"
            }
            Self::LogContinuity => "debug log captured before migration is replayed after it",
            Self::InsufficientPermission => "addmodel user's migrate request is refused",
            Self::SuperuserPermission => "superuser migrates their own model",
            Self::SuperuserMigratesOtherUser => "superuser migrates another user's model",
            Self::RollbackOnFailure => "destination outage mid-migration rolls back to the source",
            Self::ApiLoginRedirect => "controller uuid and models.yaml follow the migrated model",
            Self::MigratedModelRecheck => "first migrated model is still operational (>= 2.1)",
        }
    }

    /// Needs behaviour only present on development-branch controllers.
    #[must_use]
    pub const fn requires_develop(self) -> bool {
        matches!(
            self,
            Self::SuperuserMigratesOtherUser | Self::RollbackOnFailure | Self::ApiLoginRedirect
        )
    }

    /// Catalogue order, filtered by `use_develop` and an optional selection.
    #[must_use]
    pub fn plan(use_develop: bool, only: &[Self]) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|s| use_develop || !s.requires_develop())
            .filter(|s| only.is_empty() || only.contains(s))
            .collect()
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ──────────────────── harness ────────────────────

/// Collaborators a harness is assembled from. Production passes the real
/// juju binary, ssh, and HTTP; tests pass in-memory fakes.
pub struct HarnessParts {
    pub runner: Arc<dyn CommandRunner>,
    pub remote: Arc<dyn RemoteShell>,
    pub probe: Arc<dyn HttpProbe>,
    pub clock: Arc<dyn Clock>,
    pub recorder: Recorder,
}

/// Everything a scenario needs, wired once per run.
#[derive(Debug, Clone)]
pub struct Harness {
    pub source: ControlPlaneHandle,
    pub destination: ControlPlaneHandle,
    pub driver: MigrationDriver,
    pub injector: FailureInjector,
    pub permissions: PermissionHarness,
    pub oracle: ContinuityOracle,
    pub fixtures: Fixtures,
    clock: Arc<dyn Clock>,
    config_hash: String,
}

impl Harness {
    /// Wire components and read the client version.
    pub fn assemble(config: &Config, parts: HarnessParts) -> Result<Self> {
        let HarnessParts {
            runner,
            remote,
            probe,
            clock,
            recorder,
        } = parts;

        let soft_deadline = Arc::new(SoftDeadline::from_budget(
            Arc::clone(&clock),
            config.timeouts.soft_deadline(),
        ));
        let client = JujuClient::new(runner, recorder.clone(), Arc::clone(&soft_deadline));
        let poll = PollEngine::new(
            Arc::clone(&clock),
            config.timeouts.poll_interval(),
            soft_deadline,
            recorder,
        );
        let driver = MigrationDriver::new(client.clone(), poll, config.timeouts.clone());

        let controllers = &config.controllers;
        let version = client.client_version(&controllers.source, &controllers.juju_home)?;
        let source = ControlPlaneHandle::new(
            controllers.source.as_str(),
            controllers.juju_home.as_path(),
            version.as_str(),
            ADMIN_USER,
        );
        let destination = ControlPlaneHandle::new(
            controllers.destination.as_str(),
            controllers.juju_home.as_path(),
            version.as_str(),
            ADMIN_USER,
        );

        let injector = FailureInjector::new(client.clone(), remote, config.remote.clone());
        let permissions = PermissionHarness::new(client, config.paths.scratch_dir.clone());
        let oracle = ContinuityOracle::new(driver.clone(), probe, config.probe.clone());
        let fixtures = Fixtures::new(
            driver.clone(),
            oracle.clone(),
            config.fixtures.clone(),
            config.paths.scratch_dir.join("resources"),
        );

        Ok(Self {
            source,
            destination,
            driver,
            injector,
            permissions,
            oracle,
            fixtures,
            clock,
            config_hash: config.stable_hash()?,
        })
    }

    #[must_use]
    pub fn client(&self) -> &JujuClient {
        self.driver.client()
    }

    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        self.client().recorder()
    }
}

// ──────────────────── report ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub version: String,
    pub source: String,
    pub destination: String,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    fn count(&self, outcome: Outcome) -> usize {
        self.scenarios.iter().filter(|s| s.outcome == outcome).count()
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(Outcome::Passed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    /// Every selected scenario passed or was not applicable.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    #[must_use]
    pub fn outcome_of(&self, scenario: Scenario) -> Option<Outcome> {
        self.scenarios
            .iter()
            .find(|s| s.scenario == scenario)
            .map(|s| s.outcome)
    }
}

// ──────────────────── runner ────────────────────

/// Result of one scenario body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepResult {
    Done,
    NotApplicable(String),
}

/// State carried from one scenario to a later one.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    /// First migrated model, its application, and the payload it serves.
    pub(crate) migrated: Option<(ModelHandle, String, String)>,
}

/// Executes a scenario plan against a [`Harness`].
#[derive(Debug)]
pub struct ScenarioRunner {
    harness: Harness,
    plan: Vec<Scenario>,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(harness: Harness, use_develop: bool, only: &[Scenario]) -> Self {
        Self {
            plan: Scenario::plan(use_develop, only),
            harness,
        }
    }

    #[must_use]
    pub fn plan(&self) -> &[Scenario] {
        &self.plan
    }

    #[must_use]
    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Run the plan. Stops executing at the first failure.
    pub fn run(&self) -> RunReport {
        let recorder = self.harness.recorder();
        recorder.record(RunEvent::RunStarted {
            version: self.harness.source.version().to_string(),
            config_hash: self.harness.config_hash.clone(),
            source: self.harness.source.name().to_string(),
            destination: self.harness.destination.name().to_string(),
        });

        let mut state = RunState::default();
        let mut reports = Vec::with_capacity(self.plan.len());
        let mut aborted = false;
        for &scenario in &self.plan {
            if aborted {
                reports.push(ScenarioReport {
                    scenario,
                    outcome: Outcome::Skipped,
                    duration_ms: 0,
                    error_code: None,
                    message: Some("not run after an earlier failure".to_string()),
                });
                continue;
            }
            let report = self.run_one(scenario, &mut state);
            aborted = report.outcome == Outcome::Failed;
            reports.push(report);
        }
        recorder.enter_scenario(None);

        let report = RunReport {
            version: self.harness.source.version().to_string(),
            source: self.harness.source.name().to_string(),
            destination: self.harness.destination.name().to_string(),
            scenarios: reports,
        };
        recorder.record(RunEvent::RunFinished {
            passed: report.passed(),
            failed: report.failed(),
        });
        report
    }

    fn run_one(&self, scenario: Scenario, state: &mut RunState) -> ScenarioReport {
        let recorder = self.harness.recorder();
        recorder.enter_scenario(Some(scenario.name()));
        recorder.record(RunEvent::ScenarioStarted {
            scenario: scenario.name().to_string(),
        });

        let started = self.harness.clock.now();
        let result = steps::run(&self.harness, scenario, state);
        let elapsed = self.harness.clock.now().saturating_sub(started);
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(StepResult::Done) => {
                recorder.record(RunEvent::ScenarioPassed {
                    scenario: scenario.name().to_string(),
                    duration_ms,
                });
                ScenarioReport {
                    scenario,
                    outcome: Outcome::Passed,
                    duration_ms,
                    error_code: None,
                    message: None,
                }
            }
            Ok(StepResult::NotApplicable(reason)) => {
                recorder.note(format!("{scenario} skipped: {reason}"));
                ScenarioReport {
                    scenario,
                    outcome: Outcome::Skipped,
                    duration_ms,
                    error_code: None,
                    message: Some(reason),
                }
            }
            Err(err) => {
                recorder.record(RunEvent::ScenarioFailed {
                    scenario: scenario.name().to_string(),
                    duration_ms,
                    error_code: err.code().to_string(),
                    error_message: err.to_string(),
                });
                ScenarioReport {
                    scenario,
                    outcome: Outcome::Failed,
                    duration_ms,
                    error_code: Some(err.code().to_string()),
                    message: Some(err.to_string()),
                }
            }
        }
    }
}
