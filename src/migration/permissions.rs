//! Scoped user identities and migration authorization checks.
//!
//! Each provisioned user gets its own `JUJU_DATA` under the scratch
//! directory and is registered on both controllers. The destination
//! registration is named `<user>_controllerb` so the two controllers stay
//! distinguishable inside the one credential home.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use rand::distr::{Alphanumeric, SampleString};

use crate::core::errors::{MmaError, Result};
use crate::juju::client::JujuClient;
use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
use crate::migration::attempt::{MigrationAttempt, MigrationPhase};
use crate::migration::driver::MigrationDriver;

/// Username and the controller permission granted on both controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub permission: String,
}

impl UserIdentity {
    #[must_use]
    pub fn new(username: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            permission: permission.into(),
        }
    }

    /// Name the destination controller is registered under for this user.
    #[must_use]
    pub fn destination_controller_name(&self) -> String {
        format!("{}_controllerb", self.username)
    }
}

/// Provisions users and judges migration attempts made as them.
#[derive(Debug, Clone)]
pub struct PermissionHarness {
    client: JujuClient,
    scratch_dir: PathBuf,
}

impl PermissionHarness {
    pub fn new(client: JujuClient, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            scratch_dir: scratch_dir.into(),
        }
    }

    #[must_use]
    pub fn user_home(&self, username: &str) -> PathBuf {
        self.scratch_dir.join(username)
    }

    /// Create `identity` on both controllers and return handles acting as it:
    /// `(source-scoped, destination-scoped)`.
    pub fn provision_user(
        &self,
        source: &ControlPlaneHandle,
        destination: &ControlPlaneHandle,
        identity: &UserIdentity,
    ) -> Result<(ControlPlaneHandle, ControlPlaneHandle)> {
        let home = self.user_home(&identity.username);
        fresh_dir(&home)?;
        let password = Alphanumeric.sample_string(&mut rand::rng(), 16);

        let token = self.client.add_user(source, &identity.username)?;
        self.client
            .register(&home, &token, source.name(), &password)?;
        self.client
            .grant(source, &identity.username, &identity.permission)?;

        let dest_name = identity.destination_controller_name();
        let token = self.client.add_user(destination, &identity.username)?;
        self.client.register(&home, &token, &dest_name, &password)?;
        self.client
            .grant(destination, &identity.username, &identity.permission)?;

        self.client.recorder().note(format!(
            "provisioned {} with {} on {source} and {destination}",
            identity.username, identity.permission
        ));
        Ok((
            source.for_user(source.name(), identity.username.as_str(), home.clone()),
            destination.for_user(dest_name, identity.username.as_str(), home),
        ))
    }

    /// Attempt to migrate `model` and require a permission-denied refusal.
    ///
    /// A refusal carrying the marker moves the attempt to `rejected`. Any
    /// other failure is returned unchanged, and a migration that goes
    /// through is an assertion failure.
    pub fn expect_migration_rejected(
        &self,
        driver: &MigrationDriver,
        model: &ModelHandle,
        destination: &ControlPlaneHandle,
    ) -> Result<MigrationAttempt> {
        let mut attempt = MigrationAttempt::new(
            model.clone(),
            destination.clone(),
            self.client.recorder().clone(),
        );
        match driver.issue(&mut attempt, false) {
            Ok(output) => Err(MmaError::assertion(format!(
                "migration of {model} to {destination} did not fail as expected: {}",
                output.trim()
            ))),
            Err(err) if err.is_permission_denied() => {
                attempt.advance(MigrationPhase::Rejected)?;
                self.client
                    .recorder()
                    .note(format!("migrate of {model} refused as expected"));
                Ok(attempt)
            }
            Err(err) => Err(err),
        }
    }
}

fn fresh_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|source| MmaError::io(path, source))?;
    }
    fs::create_dir_all(path).map_err(|source| MmaError::io(path, source))
}
