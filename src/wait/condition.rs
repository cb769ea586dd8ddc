//! Wait predicates evaluated against freshly polled state.
//!
//! A condition is stateless between polls. The poll engine only knows the
//! [`WaitCondition`] trait, so adding a condition never touches the engine.

#![allow(missing_docs)]

use std::time::Duration;

use memchr::memmem;

use crate::core::errors::MmaError;
use crate::juju::status::{ModelDetails, ModelListing, Status};

/// Result of evaluating a condition against one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Satisfied,
    /// Not yet; carries why, for the timeout report.
    Pending(String),
}

impl Evaluation {
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Predicate over polled state `S` plus its terminal-timeout action.
pub trait WaitCondition<S> {
    /// Short name used in logs and timeout reports.
    fn describe(&self) -> String;

    fn evaluate(&self, observed: &S) -> Evaluation;

    /// Domain error raised once when the wait times out.
    fn on_timeout(&self, subject: &str, timeout: Duration, last_reason: &str) -> MmaError {
        MmaError::CheckTimeout {
            subject: format!("{subject}: {}", self.describe()),
            timeout_secs: timeout.as_secs(),
            details: last_reason.to_string(),
        }
    }

    /// Fetch errors that count as "not yet" instead of aborting the poll.
    fn tolerates(&self, _err: &MmaError) -> bool {
        false
    }
}

fn pending_list(prefix: &str, items: &[String]) -> Evaluation {
    if items.is_empty() {
        Evaluation::Satisfied
    } else {
        Evaluation::Pending(format!("{prefix}: {}", items.join(", ")))
    }
}

// ──────────────────── status conditions ────────────────────

/// Every application's aggregate status is `active`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllApplicationsActive;

impl WaitCondition<Status> for AllApplicationsActive {
    fn describe(&self) -> String {
        "all applications active".to_string()
    }

    fn evaluate(&self, status: &Status) -> Evaluation {
        let waiting: Vec<String> = status
            .applications
            .iter()
            .filter(|(_, app)| {
                !app.application_status
                    .as_ref()
                    .is_some_and(|s| s.is("active"))
            })
            .map(|(name, app)| {
                let state = app
                    .application_status
                    .as_ref()
                    .and_then(|s| s.current.as_deref())
                    .unwrap_or("unknown");
                format!("{name}={state}")
            })
            .collect();
        pending_list("applications not active", &waiting)
    }
}

/// Every unit's workload status is `active`. A unit with no workload status
/// is not active.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllWorkloadsActive;

impl WaitCondition<Status> for AllWorkloadsActive {
    fn describe(&self) -> String {
        "all workloads active".to_string()
    }

    fn evaluate(&self, status: &Status) -> Evaluation {
        let waiting: Vec<String> = status
            .iter_units()
            .filter_map(|(name, unit)| {
                let state = unit
                    .workload_status
                    .as_ref()
                    .and_then(|s| s.current.as_deref());
                match state {
                    Some("active") => None,
                    Some(other) => Some(format!("{name}={other}")),
                    None => Some(format!("{name}=<missing>")),
                }
            })
            .collect();
        pending_list("workloads not active", &waiting)
    }
}

/// Machine and unit agents have all started.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllAgentsStarted;

impl WaitCondition<Status> for AllAgentsStarted {
    fn describe(&self) -> String {
        "all agents started".to_string()
    }

    fn evaluate(&self, status: &Status) -> Evaluation {
        let waiting: Vec<String> = status
            .unready_agents()
            .into_iter()
            .map(|(name, state)| format!("{name}={state}"))
            .collect();
        pending_list("agents not started", &waiting)
    }
}

// ──────────────────── model listing conditions ────────────────────

/// A model name appears in the controller's listing.
#[derive(Debug, Clone)]
pub struct ModelPresent(pub String);

impl WaitCondition<ModelListing> for ModelPresent {
    fn describe(&self) -> String {
        format!("model {} present", self.0)
    }

    fn evaluate(&self, listing: &ModelListing) -> Evaluation {
        if listing.contains(&self.0) {
            Evaluation::Satisfied
        } else {
            Evaluation::Pending(format!("not listed among {:?}", listing.model_names()))
        }
    }
}

/// A model name is gone from the controller's listing. Tolerates the
/// controller's "model being removed" error while the model tears down.
#[derive(Debug, Clone)]
pub struct ModelAbsent(pub String);

impl WaitCondition<ModelListing> for ModelAbsent {
    fn describe(&self) -> String {
        format!("model {} absent", self.0)
    }

    fn evaluate(&self, listing: &ModelListing) -> Evaluation {
        if listing.contains(&self.0) {
            Evaluation::Pending("still listed".to_string())
        } else {
            Evaluation::Satisfied
        }
    }

    fn tolerates(&self, err: &MmaError) -> bool {
        err.is_transient_removal()
    }
}

// ──────────────────── model detail conditions ────────────────────

/// `show-model` reports a migration status for the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationInProgress;

impl WaitCondition<ModelDetails> for MigrationInProgress {
    fn describe(&self) -> String {
        "migration in progress".to_string()
    }

    fn evaluate(&self, details: &ModelDetails) -> Evaluation {
        match details.status.migration.as_deref() {
            Some(message) if !message.is_empty() => Evaluation::Satisfied,
            _ => Evaluation::Pending(format!(
                "model status {}",
                details.status.current.as_deref().unwrap_or("unknown")
            )),
        }
    }
}

// ──────────────────── log conditions ────────────────────

/// Fetched log text contains an expected substring.
#[derive(Debug, Clone)]
pub struct LogContains(pub String);

impl WaitCondition<String> for LogContains {
    fn describe(&self) -> String {
        format!("log contains {} bytes of prior history", self.0.len())
    }

    fn evaluate(&self, log: &String) -> Evaluation {
        if memmem::find(log.as_bytes(), self.0.as_bytes()).is_some() {
            Evaluation::Satisfied
        } else {
            Evaluation::Pending(format!("log has {} bytes, history not found", log.len()))
        }
    }

    fn on_timeout(&self, subject: &str, timeout: Duration, last_reason: &str) -> MmaError {
        MmaError::assertion(format!(
            "logs for {subject} did not contain the pre-migration history after {} seconds ({last_reason})",
            timeout.as_secs()
        ))
    }
}
