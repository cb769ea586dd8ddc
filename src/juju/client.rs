//! `JujuClient`: the harness's only route to a controller.
//!
//! Every call is recorded, timed, and checked against the ambient soft
//! deadline before it runs.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::core::errors::{MmaError, Result};
use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
use crate::juju::runner::{CommandRunner, Invocation};
use crate::juju::status::{ModelDetails, ModelListing, Status, parse_controller_uuid};
use crate::logger::recorder::{Recorder, RunEvent};
use crate::wait::deadline::SoftDeadline;

/// Name of the model every controller hosts itself in.
pub const CONTROLLER_MODEL: &str = "controller";

/// Controller-level permissions accepted by `juju grant`.
pub const CONTROLLER_PERMISSIONS: [&str; 3] = ["login", "addmodel", "superuser"];

/// Facade over a [`CommandRunner`] exposing the commands the harness uses.
#[derive(Clone)]
pub struct JujuClient {
    runner: Arc<dyn CommandRunner>,
    recorder: Recorder,
    soft_deadline: Arc<SoftDeadline>,
}

impl std::fmt::Debug for JujuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JujuClient")
            .field("soft_deadline", &self.soft_deadline)
            .finish_non_exhaustive()
    }
}

impl JujuClient {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        recorder: Recorder,
        soft_deadline: Arc<SoftDeadline>,
    ) -> Self {
        Self {
            runner,
            recorder,
            soft_deadline,
        }
    }

    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    #[must_use]
    pub fn soft_deadline(&self) -> &Arc<SoftDeadline> {
        &self.soft_deadline
    }

    /// Run an invocation on behalf of `controller` (and optionally a model,
    /// for the log only).
    pub fn run(
        &self,
        controller: &ControlPlaneHandle,
        model: Option<&ModelHandle>,
        invocation: &Invocation,
    ) -> Result<String> {
        self.soft_deadline.check(&invocation.display())?;

        let started = Instant::now();
        let result = self.runner.run(invocation);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.recorder.record(RunEvent::CommandRun {
            controller: controller.name().to_string(),
            model: model.map(ModelHandle::scoped_name),
            command: invocation.display(),
            duration_ms,
            ok: result.is_ok(),
        });
        result
    }

    fn on_model(&self, model: &ModelHandle, command: &str) -> Invocation {
        Invocation::new(model.controller().juju_home(), command)
            .arg("-m")
            .arg(model.model_arg())
    }

    fn on_controller(controller: &ControlPlaneHandle, command: &str) -> Invocation {
        Invocation::new(controller.juju_home(), command)
            .arg("-c")
            .arg(controller.name())
    }

    // ──────────────────── queries ────────────────────

    /// `juju version` as seen from `juju_home`.
    pub fn client_version(&self, controller_name: &str, juju_home: &Path) -> Result<String> {
        let handle = ControlPlaneHandle::new(controller_name, juju_home, "", "");
        let out = self.run(&handle, None, &Invocation::new(juju_home, "version"))?;
        Ok(out.trim().to_string())
    }

    /// Models visible on the controller. `all` lists every user's models.
    pub fn list_models(&self, controller: &ControlPlaneHandle, all: bool) -> Result<ModelListing> {
        let mut inv = Self::on_controller(controller, "models").args(["--format", "json"]);
        if all {
            inv = inv.arg("--all");
        }
        ModelListing::parse(&self.run(controller, None, &inv)?)
    }

    /// Human-readable listing of every model, for the run log.
    pub fn show_all_models(&self, controller: &ControlPlaneHandle) -> Result<String> {
        let inv = Self::on_controller(controller, "models").arg("--all");
        self.run(controller, None, &inv)
    }

    pub fn show_model(&self, model: &ModelHandle) -> Result<ModelDetails> {
        let inv = Invocation::new(model.controller().juju_home(), "show-model")
            .arg(model.model_arg())
            .args(["--format", "json"]);
        let raw = self.run(model.controller(), Some(model), &inv)?;
        ModelDetails::parse(&raw, &model.scoped_name())
    }

    pub fn status(&self, model: &ModelHandle) -> Result<Status> {
        let inv = self.on_model(model, "status").args(["--format", "json"]);
        Status::parse(&self.run(model.controller(), Some(model), &inv)?)
    }

    /// Status of the controller's own model (controller machines).
    pub fn controller_status(&self, controller: &ControlPlaneHandle) -> Result<Status> {
        self.status(&controller.model(CONTROLLER_MODEL).owned_by("admin"))
    }

    pub fn controller_uuid(&self, controller: &ControlPlaneHandle) -> Result<String> {
        let inv = Invocation::new(controller.juju_home(), "show-controller")
            .arg(controller.name())
            .args(["--format", "json"]);
        let raw = self.run(controller, None, &inv)?;
        parse_controller_uuid(&raw, controller.name())
    }

    /// Debug log text. `replay` asks for the full history.
    pub fn debug_log(&self, model: &ModelHandle, replay: bool) -> Result<String> {
        let mut inv = self.on_model(model, "debug-log").arg("--no-tail");
        if replay {
            inv = inv.arg("--replay");
        }
        inv = inv.args(["-l", "DEBUG"]);
        self.run(model.controller(), Some(model), &inv)
    }

    // ──────────────────── mutations ────────────────────

    pub fn add_model(&self, controller: &ControlPlaneHandle, name: &str) -> Result<ModelHandle> {
        let inv = Invocation::new(controller.juju_home(), "add-model")
            .arg(name)
            .args(["-c", controller.name()]);
        self.run(controller, None, &inv)?;
        Ok(controller.model(name))
    }

    /// Deploy a charm, optionally attaching one `name=path` resource.
    pub fn deploy(
        &self,
        model: &ModelHandle,
        charm: &str,
        resource: Option<(&str, &Path)>,
    ) -> Result<()> {
        let mut inv = self.on_model(model, "deploy").arg(charm);
        if let Some((name, path)) = resource {
            inv = inv
                .arg("--resource")
                .arg(format!("{name}={}", path.display()));
        }
        self.run(model.controller(), Some(model), &inv).map(drop)
    }

    pub fn set_config(&self, model: &ModelHandle, application: &str, pairs: &[(&str, &str)]) -> Result<()> {
        let inv = self
            .on_model(model, "config")
            .arg(application)
            .args(pairs.iter().map(|(k, v)| format!("{k}={v}")));
        self.run(model.controller(), Some(model), &inv).map(drop)
    }

    pub fn expose(&self, model: &ModelHandle, application: &str) -> Result<()> {
        let inv = self.on_model(model, "expose").arg(application);
        self.run(model.controller(), Some(model), &inv).map(drop)
    }

    pub fn add_relation(&self, model: &ModelHandle, a: &str, b: &str) -> Result<()> {
        let inv = self.on_model(model, "add-relation").args([a, b]);
        self.run(model.controller(), Some(model), &inv).map(drop)
    }

    pub fn add_unit(&self, model: &ModelHandle, application: &str) -> Result<()> {
        let inv = self.on_model(model, "add-unit").arg(application);
        self.run(model.controller(), Some(model), &inv).map(drop)
    }

    pub fn remove_application(&self, model: &ModelHandle, application: &str) -> Result<()> {
        let inv = self.on_model(model, "remove-application").arg(application);
        self.run(model.controller(), Some(model), &inv).map(drop)
    }

    /// Create a user and return the registration token printed by the controller.
    pub fn add_user(&self, controller: &ControlPlaneHandle, user: &str) -> Result<String> {
        let inv = Self::on_controller(controller, "add-user").arg(user);
        let out = self.run(controller, None, &inv)?;
        parse_registration_token(&out).ok_or_else(|| MmaError::OutputParse {
            context: "add-user",
            details: format!("no registration token in output for {user:?}"),
        })
    }

    /// Register a token into `user_home`, naming the controller `controller_name`.
    pub fn register(
        &self,
        user_home: &Path,
        token: &str,
        controller_name: &str,
        password: &str,
    ) -> Result<()> {
        let handle = ControlPlaneHandle::new(controller_name, user_home, "", "");
        let inv = Invocation::new(user_home, "register")
            .arg(token)
            .stdin(format!("{password}\n{password}\n{controller_name}\n"));
        self.run(&handle, None, &inv).map(drop)
    }

    pub fn grant(&self, controller: &ControlPlaneHandle, user: &str, permission: &str) -> Result<()> {
        if !CONTROLLER_PERMISSIONS.contains(&permission) {
            return Err(MmaError::InvalidConfig {
                details: format!(
                    "unknown controller permission {permission:?}; expected one of {CONTROLLER_PERMISSIONS:?}"
                ),
            });
        }
        let inv = Self::on_controller(controller, "grant").args([user, permission]);
        self.run(controller, None, &inv).map(drop)
    }
}

/// Token from a `juju register <token>` line in `add-user` output.
#[must_use]
pub fn parse_registration_token(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("juju register ")?;
        let token = rest.split_whitespace().next()?;
        Some(token.to_string())
    })
}
