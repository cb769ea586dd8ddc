//! Identity handles for controllers and the models they own.
//!
//! Handles are plain immutable values. Scoping to another model or user is
//! done by deriving a new handle, never by mutating an existing one.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// One control-plane instance as seen by one client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlPlaneHandle {
    name: String,
    juju_home: PathBuf,
    version: String,
    user_name: String,
}

impl ControlPlaneHandle {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        juju_home: impl Into<PathBuf>,
        version: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            juju_home: juju_home.into(),
            version: version.into(),
            user_name: user_name.into(),
        }
    }

    /// Controller name as registered in the client's `JUJU_DATA`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `JUJU_DATA` directory for this identity.
    #[must_use]
    pub fn juju_home(&self) -> &Path {
        &self.juju_home
    }

    /// Client version string reported by `juju version`.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// User this handle acts as.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Same controller reached through another identity and credential home.
    #[must_use]
    pub fn for_user(
        &self,
        controller_name: impl Into<String>,
        user_name: impl Into<String>,
        juju_home: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: controller_name.into(),
            juju_home: juju_home.into(),
            version: self.version.clone(),
            user_name: user_name.into(),
        }
    }

    /// Bind a model name to this controller.
    #[must_use]
    pub fn model(&self, model_name: impl Into<String>) -> ModelHandle {
        ModelHandle {
            controller: self.clone(),
            name: model_name.into(),
            owner: None,
        }
    }
}

impl fmt::Display for ControlPlaneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A model owned by exactly one controller.
///
/// Migration consumes the source handle and yields a new one bound to the
/// destination, so a stale handle cannot be used after ownership moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelHandle {
    controller: ControlPlaneHandle,
    name: String,
    owner: Option<String>,
}

impl ModelHandle {
    #[must_use]
    pub fn controller(&self) -> &ControlPlaneHandle {
        &self.controller
    }

    /// Bare model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// User qualifier for models owned by someone other than the caller.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Derive a handle that addresses the model through its owner's namespace.
    #[must_use]
    pub fn owned_by(&self, owner: impl Into<String>) -> Self {
        Self {
            controller: self.controller.clone(),
            name: self.name.clone(),
            owner: Some(owner.into()),
        }
    }

    /// `user/model`, using the explicit owner or else the acting user.
    #[must_use]
    pub fn user_qualified_name(&self) -> String {
        qualified_model_name(
            &self.name,
            self.owner.as_deref().unwrap_or(self.controller.user_name()),
        )
    }

    /// Name as addressed inside its controller: `user/model` if an owner is set.
    #[must_use]
    pub fn scoped_name(&self) -> String {
        self.owner
            .as_deref()
            .map_or_else(|| self.name.clone(), |owner| qualified_model_name(&self.name, owner))
    }

    /// `controller:model` (or `controller:user/model`) for `-m` arguments.
    #[must_use]
    pub fn model_arg(&self) -> String {
        format!("{}:{}", self.controller.name(), self.scoped_name())
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.model_arg())
    }
}

/// `user/model`, leaving an already qualified name untouched.
#[must_use]
pub fn qualified_model_name(model_name: &str, user_name: &str) -> String {
    if model_name.contains('/') {
        model_name.to_string()
    } else {
        format!("{user_name}/{model_name}")
    }
}
