//! Read-only view of the client's `models.yaml` controller registry.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::errors::{MmaError, Result};

/// Registry file name inside a `JUJU_DATA` directory.
pub const REGISTRY_FILE: &str = "models.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerRegistry {
    #[serde(default)]
    controllers: BTreeMap<String, ControllerRecord>,
    #[serde(skip)]
    path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerRecord {
    /// Model name to per-model record. Only the keys matter here.
    #[serde(default)]
    pub models: BTreeMap<String, serde_yaml::Value>,
    #[serde(rename = "current-model", default)]
    pub current_model: Option<String>,
}

impl ControllerRegistry {
    /// Load `<juju_home>/models.yaml`.
    pub fn load(juju_home: &Path) -> Result<Self> {
        let path = juju_home.join(REGISTRY_FILE);
        let raw = fs::read_to_string(&path).map_err(|source| MmaError::io(&path, source))?;
        let mut registry = Self::parse(&raw)?;
        registry.path = path;
        Ok(registry)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| MmaError::OutputParse {
            context: "models.yaml",
            details: e.to_string(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn controller(&self, name: &str) -> Result<&ControllerRecord> {
        self.controllers.get(name).ok_or_else(|| {
            MmaError::assertion(format!(
                "controller {name:?} has no entry in {}",
                self.path.display()
            ))
        })
    }

    /// Model names registered under `controller`.
    pub fn models_of(&self, controller: &str) -> Result<Vec<&str>> {
        Ok(self
            .controller(controller)?
            .models
            .keys()
            .map(String::as_str)
            .collect())
    }

    /// Whether `controller` lists `model`, bare or user-qualified.
    pub fn lists_model(&self, controller: &str, model: &str) -> Result<bool> {
        let qualified = model.contains('/');
        Ok(self
            .models_of(controller)?
            .into_iter()
            .any(|key| key == model || (!qualified && key.rsplit('/').next() == Some(model))))
    }
}
