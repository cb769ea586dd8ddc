//! Version policy for the `migrate` command shape.
//!
//! Clients at or after 2.2-beta4 address the source as `controller:model`
//! with no model-context flag. Older clients scope the command to the
//! controller with `-c` and use the bare model name. [`ProtocolVariant`] is
//! the only place that decision is made.

#![allow(missing_docs)]

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;

use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
use crate::juju::runner::Invocation;

/// Strict threshold: 2.2.0 and later use the qualified layout.
pub const STRICT_THRESHOLD: Version = Version::new(2, 2, 0);

/// Loose threshold for pre-release strings such as `2.2-rc1`.
pub const LOOSE_THRESHOLD: &str = "2.2-beta4";

/// Argument layout for `juju migrate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// `migrate ctrl:[user/]model dest`
    QualifiedSource,
    /// `migrate -c ctrl [user/]model dest`
    ControllerScoped,
}

impl ProtocolVariant {
    /// Layout for the given client version string.
    #[must_use]
    pub fn for_version(client_version: &str) -> Self {
        if at_or_after_threshold(client_version) {
            Self::QualifiedSource
        } else {
            Self::ControllerScoped
        }
    }

    #[must_use]
    pub fn for_controller(controller: &ControlPlaneHandle) -> Self {
        Self::for_version(controller.version())
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QualifiedSource => "qualified-source",
            Self::ControllerScoped => "controller-scoped",
        }
    }

    /// Arguments after the `migrate` subcommand.
    #[must_use]
    pub fn migrate_args(self, controller: &str, model_ref: &str, destination: &str) -> Vec<String> {
        match self {
            Self::QualifiedSource => vec![format!("{controller}:{model_ref}"), destination.to_string()],
            Self::ControllerScoped => vec![
                "-c".to_string(),
                controller.to_string(),
                model_ref.to_string(),
                destination.to_string(),
            ],
        }
    }
}

/// `migrate` invocation for `source` towards `destination`, run with the
/// source identity's credentials.
///
/// With `include_user` the model is addressed as `user/model` using the
/// source identity's user name.
#[must_use]
pub fn migrate_invocation(
    source: &ModelHandle,
    destination: &ControlPlaneHandle,
    include_user: bool,
) -> Invocation {
    let controller = source.controller();
    let model_ref = if include_user {
        source.user_qualified_name()
    } else {
        source.scoped_name()
    };
    let variant = ProtocolVariant::for_controller(controller);
    Invocation::new(controller.juju_home(), "migrate").args(variant.migrate_args(
        controller.name(),
        &model_ref,
        destination.name(),
    ))
}

/// Drop series and architecture from a built version string.
///
/// `2.2.0-xenial-amd64` becomes `2.2.0`; `2.2-beta4-xenial-amd64` keeps its
/// pre-release tag and becomes `2.2-beta4`.
#[must_use]
pub fn strip_version(raw: &str) -> String {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() == 4 {
        parts[..2].join("-")
    } else {
        parts.first().copied().unwrap_or(raw).to_string()
    }
}

/// Strict semantic-version comparison first; loose token comparison for
/// anything that does not parse strictly.
#[must_use]
pub fn at_or_after_threshold(client_version: &str) -> bool {
    let stripped = strip_version(client_version);
    match parse_strict(&stripped) {
        Some(version) => version >= STRICT_THRESHOLD,
        None => loose_cmp(&stripped, LOOSE_THRESHOLD) != Ordering::Less,
    }
}

/// Whether the client is at least `major.minor`, compared the same way as
/// the migrate threshold.
#[must_use]
pub fn version_at_least(client_version: &str, major: u64, minor: u64) -> bool {
    let stripped = strip_version(client_version);
    match parse_strict(&stripped) {
        Some(version) => version >= Version::new(major, minor, 0),
        None => loose_cmp(&stripped, &format!("{major}.{minor}")) != Ordering::Less,
    }
}

/// `X.Y` or `X.Y.Z` with numeric components only.
fn parse_strict(version: &str) -> Option<Version> {
    let numeric = version.split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if !numeric {
        return None;
    }
    match version.matches('.').count() {
        1 => Version::parse(&format!("{version}.0")).ok(),
        2 => Version::parse(version).ok(),
        _ => None,
    }
}

/// One component of a loosely compared version. Numbers sort before text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LooseToken {
    Number(u64),
    Text(String),
}

fn loose_tokens(version: &str) -> Vec<LooseToken> {
    static COMPONENT: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(component) = COMPONENT.get_or_init(|| Regex::new(r"\d+|[a-z]+|\.").ok()) else {
        return vec![LooseToken::Text(version.to_string())];
    };

    let mut tokens = Vec::new();
    let mut push = |piece: &str| {
        if piece.is_empty() || piece == "." {
            return;
        }
        tokens.push(
            piece
                .parse::<u64>()
                .map_or_else(|_| LooseToken::Text(piece.to_string()), LooseToken::Number),
        );
    };
    let mut cursor = 0;
    for m in component.find_iter(version) {
        push(&version[cursor..m.start()]);
        push(m.as_str());
        cursor = m.end();
    }
    push(&version[cursor..]);
    tokens
}

fn loose_cmp(a: &str, b: &str) -> Ordering {
    loose_tokens(a).cmp(&loose_tokens(b))
}
