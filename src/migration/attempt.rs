//! In-memory record of one migration attempt and its phase transitions.
//!
//! Phases only move forward: `requested -> migrating -> (succeeded |
//! rolled-back | rejected)`. Every terminal phase is reached through
//! `migrating`, so a rejected request is recorded as issued first.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};

use crate::core::errors::{MmaError, Result};
use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
use crate::logger::recorder::{Recorder, RunEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MigrationPhase {
    Requested,
    Migrating,
    Succeeded,
    RolledBack,
    Rejected,
}

impl MigrationPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Migrating => "migrating",
            Self::Succeeded => "succeeded",
            Self::RolledBack => "rolled-back",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::RolledBack | Self::Rejected)
    }

    const fn may_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Migrating)
                | (Self::Migrating, Self::Succeeded | Self::RolledBack | Self::Rejected)
        )
    }
}

/// One observed phase change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub at: DateTime<Utc>,
    pub from: MigrationPhase,
    pub to: MigrationPhase,
}

/// Transient record for one scenario's migration.
#[derive(Debug, Clone)]
pub struct MigrationAttempt {
    source: ModelHandle,
    destination: ControlPlaneHandle,
    requested_at: DateTime<Utc>,
    phase: MigrationPhase,
    transitions: Vec<Transition>,
    recorder: Recorder,
}

impl MigrationAttempt {
    #[must_use]
    pub fn new(source: ModelHandle, destination: ControlPlaneHandle, recorder: Recorder) -> Self {
        Self {
            source,
            destination,
            requested_at: Utc::now(),
            phase: MigrationPhase::Requested,
            transitions: Vec::new(),
            recorder,
        }
    }

    #[must_use]
    pub fn source(&self) -> &ModelHandle {
        &self.source
    }

    #[must_use]
    pub fn destination(&self) -> &ControlPlaneHandle {
        &self.destination
    }

    #[must_use]
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    #[must_use]
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Move to `next`, rejecting skips and backward moves.
    pub fn advance(&mut self, next: MigrationPhase) -> Result<()> {
        if !self.phase.may_advance_to(next) {
            return Err(MmaError::InvalidTransition {
                model: self.source.to_string(),
                from: self.phase.as_str(),
                to: next.as_str(),
            });
        }
        self.transitions.push(Transition {
            at: Utc::now(),
            from: self.phase,
            to: next,
        });
        self.recorder.record(RunEvent::MigrationTransition {
            model: self.source.to_string(),
            controller: self.destination.name().to_string(),
            from: self.phase.as_str(),
            to: next.as_str(),
        });
        self.phase = next;
        Ok(())
    }

    /// Phase names in order, starting from `requested`.
    #[must_use]
    pub fn phase_history(&self) -> Vec<&'static str> {
        std::iter::once(MigrationPhase::Requested.as_str())
            .chain(self.transitions.iter().map(|t| t.to.as_str()))
            .collect()
    }
}
