//! Post-migration checks against a model handle.
//!
//! Covers readiness, the HTTP payload served by the resource charm,
//! placement of newly added units, controller identity, the local registry
//! file, and replicated log history.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::core::config::ProbeConfig;
use crate::core::errors::{MmaError, Result};
use crate::juju::client::JujuClient;
use crate::juju::handle::ModelHandle;
use crate::juju::registry::ControllerRegistry;
use crate::logger::recorder::RunEvent;
use crate::migration::driver::MigrationDriver;
use crate::wait::condition::LogContains;

// ──────────────────── HTTP probe ────────────────────

/// Plain HTTP GET returning the response body.
pub trait HttpProbe: Send + Sync {
    fn get(&self, url: &str) -> Result<String>;
}

/// [`HttpProbe`] over a blocking reqwest client.
#[cfg(feature = "probe")]
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "probe")]
impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[cfg(feature = "probe")]
impl HttpProbe for ReqwestProbe {
    fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}

/// Probe used when the crate is built without HTTP support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableProbe;

impl HttpProbe for UnavailableProbe {
    fn get(&self, url: &str) -> Result<String> {
        Err(MmaError::Probe {
            url: url.to_string(),
            details: "built without the `probe` feature".to_string(),
        })
    }
}

/// Short SHA-256 fingerprint of a payload, for logs.
#[must_use]
pub fn fingerprint(payload: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(payload.as_bytes()));
    digest[..16].to_string()
}

// ──────────────────── oracle ────────────────────

/// Judges a migrated (or rolled-back) model.
#[derive(Clone)]
pub struct ContinuityOracle {
    driver: MigrationDriver,
    probe: Arc<dyn HttpProbe>,
    config: ProbeConfig,
}

impl std::fmt::Debug for ContinuityOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuityOracle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContinuityOracle {
    pub fn new(driver: MigrationDriver, probe: Arc<dyn HttpProbe>, config: ProbeConfig) -> Self {
        Self {
            driver,
            probe,
            config,
        }
    }

    fn client(&self) -> &JujuClient {
        self.driver.client()
    }

    /// Workloads active, payload served, and a new unit lands on a new machine.
    pub fn assert_migrated_successfully(
        &self,
        model: &ModelHandle,
        application: &str,
        expected_payload: Option<&str>,
    ) -> Result<()> {
        self.driver.wait_for_workloads(model)?;
        self.assert_responding(model, application, expected_payload)?;
        self.ensure_functional(model, application)
    }

    /// The application's probed unit serves `expected` (or the default payload).
    /// The body is compared after trimming trailing whitespace only.
    pub fn assert_responding(
        &self,
        model: &ModelHandle,
        application: &str,
        expected: Option<&str>,
    ) -> Result<()> {
        let expected = expected.unwrap_or(&self.config.default_payload);
        let unit = format!("{application}/{}", self.config.unit_index);
        let address = self.client().status(model)?.unit_address(&unit)?;
        let url = format!("http://{address}");
        let body = self.probe.get(&url)?;
        let served = body.trim_end();

        let ok = served == expected;
        self.client().recorder().record(RunEvent::ProbeResult {
            subject: format!("{model} {unit}"),
            ok,
            details: format!(
                "expected={} served={}",
                fingerprint(expected),
                fingerprint(served)
            ),
        });
        if ok {
            Ok(())
        } else {
            Err(MmaError::assertion(format!(
                "{unit} at {url} is not serving the expected payload (expected {}, got {})",
                fingerprint(expected),
                fingerprint(served)
            )))
        }
    }

    /// Add a unit and check it did not land on an occupied machine.
    pub fn ensure_functional(&self, model: &ModelHandle, application: &str) -> Result<()> {
        self.client().status(model)?;
        self.client().add_unit(model, application)?;
        self.driver.wait_for_started(model)?;
        self.assert_units_on_different_machines(model)
    }

    pub fn assert_units_on_different_machines(&self, model: &ModelHandle) -> Result<()> {
        raise_if_shared_machines(&self.client().status(model)?.unit_machines())
    }

    /// `show-model` reports the UUID of the controller the handle points at.
    pub fn assert_controller_uuid(&self, model: &ModelHandle) -> Result<String> {
        let details = self.client().show_model(model)?;
        let reported = details.require_controller_uuid()?.to_string();
        let actual = self.client().controller_uuid(model.controller())?;
        if reported == actual {
            Ok(reported)
        } else {
            Err(MmaError::assertion(format!(
                "{model} reports controller {reported}, but {} is {actual}",
                model.controller()
            )))
        }
    }

    /// The local registry lists the model under `expected_controller`.
    pub fn assert_registry_lists_model(&self, model: &ModelHandle, expected_controller: &str) -> Result<()> {
        let registry = ControllerRegistry::load(model.controller().juju_home())?;
        if registry.lists_model(expected_controller, &model.scoped_name())? {
            Ok(())
        } else {
            Err(MmaError::assertion(format!(
                "{} does not list {} under {expected_controller}",
                registry.path().display(),
                model.scoped_name()
            )))
        }
    }

    /// `expected` shows up in the model's replayed debug log within `timeout`.
    pub fn assert_logs_appear(&self, model: &ModelHandle, expected: &str, timeout: Duration) -> Result<()> {
        self.driver.poll().require(
            &model.to_string(),
            &LogContains(expected.to_string()),
            timeout,
            || self.client().debug_log(model, true),
        )
    }
}

/// Fail if two units share a machine. An empty list is an error, not a pass.
pub fn raise_if_shared_machines(unit_machines: &[String]) -> Result<()> {
    if unit_machines.is_empty() {
        return Err(MmaError::Runtime {
            details: "cannot check machine sharing: no unit reports a machine".to_string(),
        });
    }
    let unique: BTreeSet<&str> = unit_machines.iter().map(String::as_str).collect();
    if unique.len() == unit_machines.len() {
        Ok(())
    } else {
        Err(MmaError::assertion(format!(
            "application units share machines: {unit_machines:?}"
        )))
    }
}
