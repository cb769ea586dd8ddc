//! Workload fixtures deployed through the command surface.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use rand::distr::{Alphanumeric, SampleString};

use crate::core::config::FixturesConfig;
use crate::core::errors::{MmaError, Result};
use crate::juju::client::JujuClient;
use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
use crate::migration::driver::MigrationDriver;
use crate::migration::oracle::{ContinuityOracle, fingerprint};

/// Store charms deployed alongside the resource server.
pub const UBUNTU_CHARM: &str = "cs:ubuntu";
pub const NTP_CHARM: &str = "cs:ntp";

/// Resource name the resource server charm serves from.
pub const RESOURCE_NAME: &str = "index";

/// Random alphanumeric payload.
#[must_use]
pub fn random_payload(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::rng(), len)
}

/// Deploys the resource server and dummy source workloads.
#[derive(Debug, Clone)]
pub struct Fixtures {
    driver: MigrationDriver,
    oracle: ContinuityOracle,
    config: FixturesConfig,
    resource_dir: PathBuf,
}

impl Fixtures {
    pub fn new(
        driver: MigrationDriver,
        oracle: ContinuityOracle,
        config: FixturesConfig,
        resource_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            driver,
            oracle,
            config,
            resource_dir: resource_dir.into(),
        }
    }

    fn client(&self) -> &JujuClient {
        self.driver.client()
    }

    /// Local charm path: `<repository>/<series>/<name>`.
    #[must_use]
    pub fn charm_path(&self, name: &str) -> PathBuf {
        self.config
            .charm_repository
            .join(&self.config.series)
            .join(name)
    }

    #[must_use]
    pub fn resource_application(&self) -> &str {
        &self.config.resource_charm
    }

    #[must_use]
    pub fn dummy_application(&self) -> &str {
        &self.config.dummy_charm
    }

    #[must_use]
    pub fn new_payload(&self) -> String {
        random_payload(self.config.resource_length)
    }

    /// New model with the resource server, `ubuntu`, and a subordinate `ntp`
    /// related to both. Returns the model and the resource server's name.
    pub fn deploy_simple_server(
        &self,
        controller: &ControlPlaneHandle,
        model_name: &str,
        payload: Option<&str>,
    ) -> Result<(ModelHandle, String)> {
        let model = self.client().add_model(controller, model_name)?;
        let application = self.deploy_resource_server(&model, payload)?;

        self.client().deploy(&model, UBUNTU_CHARM, None)?;
        self.driver.wait_for_started(&model)?;
        self.client().deploy(&model, NTP_CHARM, None)?;
        self.client().add_relation(&model, "ntp", &application)?;
        self.client().add_relation(&model, "ntp", "ubuntu")?;

        self.driver.wait_for_applications_active(&model)?;
        self.driver.wait_for_workloads(&model)?;
        self.client().status(&model)?;
        self.oracle.assert_responding(&model, &application, payload)?;
        Ok((model, application))
    }

    /// Deploy the resource server, attaching `payload` as its index resource.
    pub fn deploy_resource_server(&self, model: &ModelHandle, payload: Option<&str>) -> Result<String> {
        let application = self.config.resource_charm.clone();
        let charm = self.charm_path(&application);
        let charm = charm.to_string_lossy();
        match payload {
            Some(payload) => {
                let index = self.write_resource(model, payload)?;
                self.client()
                    .deploy(model, &charm, Some((RESOURCE_NAME, &index)))?;
                self.client().recorder().note(format!(
                    "deployed {application} to {model} with resource {}",
                    fingerprint(payload)
                ));
            }
            None => self.client().deploy(model, &charm, None)?,
        }
        self.driver.wait_for_started(model)?;
        self.driver.wait_for_workloads(model)?;
        self.client().expose(model, &application)?;
        Ok(application)
    }

    /// New model running the dummy source charm with `token=one`.
    pub fn deploy_dummy_source(&self, controller: &ControlPlaneHandle, model_name: &str) -> Result<ModelHandle> {
        let model = self.client().add_model(controller, model_name)?;
        let application = self.config.dummy_charm.as_str();
        let charm = self.charm_path(application);
        self.client().deploy(&model, &charm.to_string_lossy(), None)?;
        self.driver.wait_for_started(&model)?;
        self.client()
            .set_config(&model, application, &[("token", "one")])?;
        self.driver.wait_for_workloads(&model)?;
        Ok(model)
    }

    fn write_resource(&self, model: &ModelHandle, payload: &str) -> Result<PathBuf> {
        let dir = self.resource_dir.join(model.name());
        fs::create_dir_all(&dir).map_err(|source| MmaError::io(&dir, source))?;
        let index = dir.join("index.html");
        write_file(&index, payload)?;
        Ok(index)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|source| MmaError::io(path, source))
}
