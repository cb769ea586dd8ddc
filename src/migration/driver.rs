//! Drives `juju migrate` and the polls that confirm ownership moved.

#![allow(missing_docs)]

use crate::core::config::TimeoutsConfig;
use crate::core::errors::{MmaError, Result};
use crate::juju::client::JujuClient;
use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
use crate::migration::attempt::{MigrationAttempt, MigrationPhase};
use crate::migration::protocol::migrate_invocation;
use crate::wait::condition::{
    AllAgentsStarted, AllApplicationsActive, AllWorkloadsActive, MigrationInProgress, ModelAbsent,
    ModelPresent,
};
use crate::wait::poll::PollEngine;

/// Issues migrations and waits for their observable outcome.
#[derive(Debug, Clone)]
pub struct MigrationDriver {
    client: JujuClient,
    poll: PollEngine,
    timeouts: TimeoutsConfig,
}

impl MigrationDriver {
    pub fn new(client: JujuClient, poll: PollEngine, timeouts: TimeoutsConfig) -> Self {
        Self {
            client,
            poll,
            timeouts,
        }
    }

    #[must_use]
    pub fn client(&self) -> &JujuClient {
        &self.client
    }

    #[must_use]
    pub fn poll(&self) -> &PollEngine {
        &self.poll
    }

    #[must_use]
    pub fn timeouts(&self) -> &TimeoutsConfig {
        &self.timeouts
    }

    /// Migrate `source` to `destination` and return the model's new handle.
    ///
    /// Returns once the model is listed at the destination, its agents have
    /// started there, and it is no longer listed at the source. The source
    /// handle is consumed.
    pub fn migrate(
        &self,
        source: ModelHandle,
        destination: &ControlPlaneHandle,
        include_user: bool,
    ) -> Result<ModelHandle> {
        self.client
            .recorder()
            .note(format!("migrating {source} to {destination}"));
        let mut attempt = MigrationAttempt::new(
            source,
            destination.clone(),
            self.client.recorder().clone(),
        );
        if let Err(err) = self.issue(&mut attempt, include_user) {
            if err.is_permission_denied() && attempt.phase() == MigrationPhase::Migrating {
                attempt.advance(MigrationPhase::Rejected)?;
            }
            return Err(err.into_authorization());
        }

        let target = destination_handle(attempt.source(), destination);
        self.wait_for_model(&target)?;
        self.wait_for_started(&target)?;
        self.wait_until_gone(attempt.source())?;
        attempt.advance(MigrationPhase::Succeeded)?;
        Ok(target)
    }

    /// Send the `migrate` command for `attempt`.
    ///
    /// Once the controller has answered, success or failure, the attempt
    /// counts as migrating. A command that never reached the controller
    /// leaves the attempt in `requested`.
    pub fn issue(&self, attempt: &mut MigrationAttempt, include_user: bool) -> Result<String> {
        let invocation = migrate_invocation(attempt.source(), attempt.destination(), include_user);
        let outcome = self.client.run(
            attempt.source().controller(),
            Some(attempt.source()),
            &invocation,
        );
        if matches!(&outcome, Ok(_) | Err(MmaError::CommandFailed { .. })) {
            attempt.advance(MigrationPhase::Migrating)?;
        }
        outcome
    }

    // ──────────────────── waits ────────────────────

    /// Model is listed on its controller.
    pub fn wait_for_model(&self, model: &ModelHandle) -> Result<()> {
        let name = model.scoped_name();
        let all = model.owner().is_some();
        self.poll.require(
            model.controller().name(),
            &ModelPresent(name),
            self.timeouts.model_presence(),
            || self.client.list_models(model.controller(), all),
        )
    }

    /// Model is no longer listed on its controller.
    pub fn wait_until_gone(&self, model: &ModelHandle) -> Result<()> {
        let name = model.scoped_name();
        let all = model.owner().is_some();
        self.poll.require(
            model.controller().name(),
            &ModelAbsent(name),
            self.timeouts.model_absence(),
            || self.client.list_models(model.controller(), all),
        )
    }

    /// The model reports a migration under way.
    pub fn wait_for_migrating(&self, model: &ModelHandle) -> Result<()> {
        self.poll.require(
            &model.to_string(),
            &MigrationInProgress,
            self.timeouts.migrating(),
            || self.client.show_model(model),
        )
    }

    pub fn wait_for_started(&self, model: &ModelHandle) -> Result<()> {
        self.poll.require(
            &model.to_string(),
            &AllAgentsStarted,
            self.timeouts.started(),
            || self.client.status(model),
        )
    }

    pub fn wait_for_workloads(&self, model: &ModelHandle) -> Result<()> {
        self.poll.require(
            &model.to_string(),
            &AllWorkloadsActive,
            self.timeouts.workloads(),
            || self.client.status(model),
        )
    }

    pub fn wait_for_applications_active(&self, model: &ModelHandle) -> Result<()> {
        self.poll.require(
            &model.to_string(),
            &AllApplicationsActive,
            self.timeouts.workloads(),
            || self.client.status(model),
        )
    }
}

/// Handle for `source`'s model once it lives on `destination`. The owner
/// qualifier, if any, carries over.
#[must_use]
pub fn destination_handle(source: &ModelHandle, destination: &ControlPlaneHandle) -> ModelHandle {
    let target = destination.model(source.name());
    match source.owner() {
        Some(owner) => target.owned_by(owner),
        None => target,
    }
}
