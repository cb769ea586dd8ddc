//! Failure injection: stop a controller's agent for a bounded region.
//!
//! [`FailureInjector::disable_apiserver`] stops the agent service on the
//! controller's primary node and hands back an [`ApiServerOutage`] guard.
//! The guard restarts the service on [`ApiServerOutage::restore`] or, failing
//! that, on [`Drop`], so early returns, timeouts and panics inside the region
//! never leak a stopped controller into later scenarios.

#![allow(missing_docs)]

use std::sync::Arc;

use crate::core::config::RemoteConfig;
use crate::core::errors::Result;
use crate::juju::client::JujuClient;
use crate::juju::handle::ControlPlaneHandle;
use crate::juju::remote::{RemoteShell, ServiceAction};
use crate::logger::recorder::{Recorder, RunEvent};

/// Stops and restarts controller agents over the remote shell channel.
#[derive(Clone)]
pub struct FailureInjector {
    client: JujuClient,
    remote: Arc<dyn RemoteShell>,
    config: RemoteConfig,
}

impl std::fmt::Debug for FailureInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureInjector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FailureInjector {
    pub fn new(client: JujuClient, remote: Arc<dyn RemoteShell>, config: RemoteConfig) -> Self {
        Self {
            client,
            remote,
            config,
        }
    }

    /// Address of the controller's primary node, from the controller model's status.
    pub fn controller_host(&self, controller: &ControlPlaneHandle) -> Result<String> {
        self.client
            .controller_status(controller)?
            .machine_dns_name(&self.config.controller_machine)
    }

    /// Stop the agent on `controller`'s primary node.
    ///
    /// If the stop command itself fails the service is started again before
    /// the error is returned.
    pub fn disable_apiserver(&self, controller: &ControlPlaneHandle) -> Result<ApiServerOutage> {
        let host = self.controller_host(controller)?;
        let service = self.config.service_name();
        let outage = ApiServerOutage {
            remote: Arc::clone(&self.remote),
            recorder: self.client.recorder().clone(),
            controller: controller.name().to_string(),
            host,
            service,
            restored: false,
        };

        self.remote
            .service(&outage.host, &outage.service, ServiceAction::Stop)?;
        self.client.recorder().record(RunEvent::FaultInjected {
            controller: outage.controller.clone(),
            service: outage.service.clone(),
        });
        Ok(outage)
    }

    /// Run `region` with `controller`'s agent stopped. The agent is restarted
    /// however `region` ends. A region error takes precedence over a restart
    /// error.
    pub fn with_apiserver_disabled<T, F>(&self, controller: &ControlPlaneHandle, region: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let outage = self.disable_apiserver(controller)?;
        let outcome = region();
        let restored = outage.restore();
        match (outcome, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), _) => Err(err),
        }
    }
}

/// A stopped controller agent. Restarts it exactly once.
#[must_use = "dropping the outage restarts the service immediately"]
pub struct ApiServerOutage {
    remote: Arc<dyn RemoteShell>,
    recorder: Recorder,
    controller: String,
    host: String,
    service: String,
    restored: bool,
}

impl std::fmt::Debug for ApiServerOutage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServerOutage")
            .field("controller", &self.controller)
            .field("host", &self.host)
            .field("service", &self.service)
            .field("restored", &self.restored)
            .finish_non_exhaustive()
    }
}

impl ApiServerOutage {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Start the service again and report the result.
    pub fn restore(mut self) -> Result<()> {
        self.start()
    }

    fn start(&mut self) -> Result<()> {
        self.restored = true;
        let result = self
            .remote
            .service(&self.host, &self.service, ServiceAction::Start)
            .map(drop);
        self.recorder.record(RunEvent::FaultRestored {
            controller: self.controller.clone(),
            service: self.service.clone(),
            ok: result.is_ok(),
        });
        result
    }
}

impl Drop for ApiServerOutage {
    fn drop(&mut self) {
        if !self.restored
            && let Err(err) = self.start()
        {
            self.recorder.error(&err);
        }
    }
}
