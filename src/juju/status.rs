//! Typed views over the client's `--format json` output.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::core::errors::{MmaError, Result};

/// Agent states that count as settled.
pub const AGENTS_READY: [&str; 2] = ["started", "idle"];

/// `current`/`message` pair used throughout status output.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StatusInfo {
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusInfo {
    #[must_use]
    pub fn is(&self, state: &str) -> bool {
        self.current.as_deref() == Some(state)
    }
}

// ──────────────────── models ────────────────────

/// Output of `juju models`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelListing {
    #[serde(default)]
    pub models: Vec<ModelSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(rename = "short-name", default)]
    pub short_name: Option<String>,
    #[serde(rename = "controller-uuid", default)]
    pub controller_uuid: Option<String>,
}

impl ModelListing {
    pub fn parse(raw: &str) -> Result<Self> {
        parse_json("models", raw)
    }

    /// Names as the listing presents them: `short-name` when the client
    /// reports one, else `name`.
    #[must_use]
    pub fn model_names(&self) -> Vec<&str> {
        self.models
            .iter()
            .map(|m| m.short_name.as_deref().unwrap_or(&m.name))
            .collect()
    }

    /// Whether `name` is listed, bare or user-qualified.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.models
            .iter()
            .any(|m| m.name == name || m.short_name.as_deref() == Some(name))
    }
}

// ──────────────────── show-model ────────────────────

/// One entry of `juju show-model`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "controller-uuid", default)]
    pub controller_uuid: Option<String>,
    #[serde(rename = "controller-name", default)]
    pub controller_name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub status: ModelStatusInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelStatusInfo {
    #[serde(default)]
    pub current: Option<String>,
    /// Present only while a migration is under way.
    #[serde(default)]
    pub migration: Option<String>,
}

impl ModelDetails {
    /// Parse `show-model` output and pick the entry for `model_name`.
    ///
    /// The output is keyed by model name; qualified and bare spellings are
    /// both accepted, and a single-entry document is taken as-is.
    pub fn parse(raw: &str, model_name: &str) -> Result<Self> {
        let mut by_name: BTreeMap<String, Self> = parse_json("show-model", raw)?;
        let bare = model_name.rsplit('/').next().unwrap_or(model_name);
        if let Some(details) = by_name.remove(model_name) {
            return Ok(details);
        }
        if let Some(details) = by_name.remove(bare) {
            return Ok(details);
        }
        if by_name.len() == 1
            && let Some((_, details)) = by_name.pop_first()
        {
            return Ok(details);
        }
        Err(MmaError::OutputParse {
            context: "show-model",
            details: format!("no entry for model {model_name:?}"),
        })
    }

    pub fn require_controller_uuid(&self) -> Result<&str> {
        self.controller_uuid
            .as_deref()
            .ok_or_else(|| MmaError::OutputParse {
                context: "show-model",
                details: "controller-uuid missing".to_string(),
            })
    }
}

// ──────────────────── show-controller ────────────────────

#[derive(Debug, Clone, Deserialize)]
struct ControllerEntry {
    details: ControllerDetails,
}

#[derive(Debug, Clone, Deserialize)]
struct ControllerDetails {
    uuid: String,
}

/// UUID from `juju show-controller <name>` output.
pub fn parse_controller_uuid(raw: &str, controller_name: &str) -> Result<String> {
    let mut by_name: BTreeMap<String, ControllerEntry> = parse_json("show-controller", raw)?;
    let entry = match by_name.remove(controller_name) {
        Some(entry) => entry,
        None => by_name
            .pop_first()
            .map(|(_, entry)| entry)
            .ok_or_else(|| MmaError::OutputParse {
                context: "show-controller",
                details: format!("no entry for controller {controller_name:?}"),
            })?,
    };
    Ok(entry.details.uuid)
}

// ──────────────────── status ────────────────────

/// Output of `juju status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub applications: BTreeMap<String, ApplicationStatus>,
    #[serde(default)]
    pub machines: BTreeMap<String, MachineStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationStatus {
    #[serde(rename = "application-status", default)]
    pub application_status: Option<StatusInfo>,
    #[serde(default)]
    pub units: BTreeMap<String, UnitStatus>,
    #[serde(rename = "subordinate-to", default)]
    pub subordinate_to: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitStatus {
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(rename = "workload-status", default)]
    pub workload_status: Option<StatusInfo>,
    #[serde(rename = "juju-status", default)]
    pub agent_status: Option<StatusInfo>,
    #[serde(rename = "public-address", default)]
    pub public_address: Option<String>,
    #[serde(default)]
    pub subordinates: BTreeMap<String, UnitStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MachineStatus {
    #[serde(rename = "dns-name", default)]
    pub dns_name: Option<String>,
    #[serde(rename = "juju-status", default)]
    pub agent_status: Option<StatusInfo>,
}

impl Status {
    pub fn parse(raw: &str) -> Result<Self> {
        parse_json("status", raw)
    }

    /// Every unit including subordinates, as `(unit name, unit)`.
    pub fn iter_units(&self) -> impl Iterator<Item = (&str, &UnitStatus)> {
        let mut out = Vec::new();
        for app in self.applications.values() {
            for (name, unit) in &app.units {
                out.push((name.as_str(), unit));
                for (sub_name, sub) in &unit.subordinates {
                    out.push((sub_name.as_str(), sub));
                }
            }
        }
        out.into_iter()
    }

    /// Units belonging to one application (principal units only).
    pub fn units_of<'a>(
        &'a self,
        application: &str,
    ) -> impl Iterator<Item = (&'a str, &'a UnitStatus)> + use<'a> {
        self.applications
            .get(application)
            .into_iter()
            .flat_map(|app| app.units.iter().map(|(name, unit)| (name.as_str(), unit)))
    }

    /// Machine ids of every unit that sits on a machine.
    #[must_use]
    pub fn unit_machines(&self) -> Vec<String> {
        self.iter_units()
            .filter_map(|(_, unit)| unit.machine.clone())
            .filter(|machine| !machine.is_empty())
            .collect()
    }

    pub fn unit(&self, unit_name: &str) -> Result<&UnitStatus> {
        self.iter_units()
            .find(|(name, _)| *name == unit_name)
            .map(|(_, unit)| unit)
            .ok_or_else(|| MmaError::OutputParse {
                context: "status",
                details: format!("unit {unit_name:?} not found"),
            })
    }

    pub fn unit_address(&self, unit_name: &str) -> Result<String> {
        self.unit(unit_name)?
            .public_address
            .clone()
            .ok_or_else(|| MmaError::OutputParse {
                context: "status",
                details: format!("unit {unit_name:?} has no public-address"),
            })
    }

    pub fn machine_dns_name(&self, machine_id: &str) -> Result<String> {
        self.machines
            .get(machine_id)
            .and_then(|m| m.dns_name.clone())
            .ok_or_else(|| MmaError::OutputParse {
                context: "status",
                details: format!("machine {machine_id:?} has no dns-name"),
            })
    }

    /// Agents (machine and unit) not yet in a ready state, as `(name, state)`.
    #[must_use]
    pub fn unready_agents(&self) -> Vec<(String, String)> {
        let machines = self
            .machines
            .iter()
            .map(|(id, m)| (format!("machine-{id}"), m.agent_status.as_ref()));
        let units = self
            .iter_units()
            .map(|(name, unit)| (name.to_string(), unit.agent_status.as_ref()));
        machines
            .chain(units)
            .filter_map(|(name, status)| {
                let state = status.and_then(|s| s.current.as_deref()).unwrap_or("pending");
                (!AGENTS_READY.contains(&state)).then(|| (name, state.to_string()))
            })
            .collect()
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(context: &'static str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| MmaError::OutputParse {
        context,
        details: e.to_string(),
    })
}
