//! Ambient soft deadline for the whole run.
//!
//! Once the deadline passes, every new control-plane command fails with
//! [`MmaError::SoftDeadline`]. Polls suppress the check for their own
//! duration so a wait already in progress is bounded by its own timeout.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::errors::{MmaError, Result};
use crate::wait::clock::Clock;

/// Shared deadline checked before each command.
pub struct SoftDeadline {
    limit: Option<(Arc<dyn Clock>, Duration)>,
    suppressed: AtomicUsize,
}

impl fmt::Debug for SoftDeadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftDeadline")
            .field("limit", &self.limit.as_ref().map(|(_, at)| at))
            .field("suppressed", &self.suppressed.load(Ordering::Relaxed))
            .finish()
    }
}

impl SoftDeadline {
    /// No deadline at all.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            limit: None,
            suppressed: AtomicUsize::new(0),
        }
    }

    /// Deadline `after` from the clock's current reading.
    #[must_use]
    pub fn after(clock: Arc<dyn Clock>, after: Duration) -> Self {
        let at = clock.now() + after;
        Self {
            limit: Some((clock, at)),
            suppressed: AtomicUsize::new(0),
        }
    }

    /// Build from an optional configured budget.
    #[must_use]
    pub fn from_budget(clock: Arc<dyn Clock>, budget: Option<Duration>) -> Self {
        budget.map_or_else(Self::disabled, |after| Self::after(clock, after))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.limit
            .as_ref()
            .is_some_and(|(clock, at)| clock.now() >= *at)
    }

    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst) > 0
    }

    /// Suppress the check until the returned guard drops. Nests.
    #[must_use]
    pub fn suppress(&self) -> Suppression<'_> {
        self.suppressed.fetch_add(1, Ordering::SeqCst);
        Suppression { deadline: self }
    }

    /// Fail if the deadline passed and nothing suppresses it.
    pub fn check(&self, command: &str) -> Result<()> {
        if self.is_suppressed() || !self.is_expired() {
            return Ok(());
        }
        let deadline_secs = self.limit.as_ref().map_or(0, |(_, at)| at.as_secs());
        Err(MmaError::SoftDeadline {
            command: command.to_string(),
            deadline_secs,
        })
    }
}

/// Guard returned by [`SoftDeadline::suppress`]. Restores the prior state on drop.
#[derive(Debug)]
pub struct Suppression<'a> {
    deadline: &'a SoftDeadline,
}

impl Drop for Suppression<'_> {
    fn drop(&mut self) {
        self.deadline.suppressed.fetch_sub(1, Ordering::SeqCst);
    }
}
