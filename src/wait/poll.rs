//! Bounded-time poll loop over a [`WaitCondition`].
//!
//! The engine fetches, evaluates, sleeps one interval, and repeats until the
//! condition holds or the timeout elapses. A timeout is reported as
//! [`PollError::CheckFailed`]; callers translate it into the condition's own
//! domain error with [`PollError::into_error`].

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::{MmaError, Result};
use crate::logger::recorder::{Recorder, RunEvent};
use crate::wait::clock::Clock;
use crate::wait::condition::{Evaluation, WaitCondition};
use crate::wait::deadline::SoftDeadline;

/// Why a poll ended without the condition holding.
#[derive(Debug)]
pub enum PollError {
    /// The timeout elapsed. Not yet a domain error.
    CheckFailed {
        subject: String,
        timeout: Duration,
        attempts: u64,
        last_reason: String,
    },
    /// A fetch failed in a way the condition does not tolerate.
    Fetch(MmaError),
}

impl PollError {
    /// Translate into the domain error for `condition`. A timeout calls the
    /// condition's `on_timeout` here and nowhere else.
    pub fn into_error<S, C>(self, condition: &C) -> MmaError
    where
        C: WaitCondition<S> + ?Sized,
    {
        match self {
            Self::CheckFailed {
                subject,
                timeout,
                last_reason,
                ..
            } => condition.on_timeout(&subject, timeout, &last_reason),
            Self::Fetch(err) => err,
        }
    }
}

/// Synchronous poll loop sharing the run's clock and soft deadline.
#[derive(Debug, Clone)]
pub struct PollEngine {
    clock: Arc<dyn Clock>,
    interval: Duration,
    soft_deadline: Arc<SoftDeadline>,
    recorder: Recorder,
}

impl PollEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        interval: Duration,
        soft_deadline: Arc<SoftDeadline>,
        recorder: Recorder,
    ) -> Self {
        Self {
            clock,
            interval,
            soft_deadline,
            recorder,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Poll `fetch` until `condition` holds or `timeout` elapses.
    ///
    /// Fetch errors the condition tolerates count as pending; any other
    /// fetch error ends the poll at once. The ambient soft deadline is
    /// suppressed for the whole wait.
    pub fn wait<S, C, F>(
        &self,
        subject: &str,
        condition: &C,
        timeout: Duration,
        mut fetch: F,
    ) -> std::result::Result<(), PollError>
    where
        C: WaitCondition<S> + ?Sized,
        F: FnMut() -> Result<S>,
    {
        let _scope = self.soft_deadline.suppress();
        let label = format!("{subject}: {}", condition.describe());
        self.recorder.record(RunEvent::PollStarted {
            subject: label.clone(),
            timeout_secs: timeout.as_secs(),
        });

        let started = self.clock.now();
        let mut attempts = 0_u64;
        let mut last_reason = String::from("not polled");
        loop {
            attempts += 1;
            match fetch() {
                Ok(observed) => match condition.evaluate(&observed) {
                    Evaluation::Satisfied => {
                        let elapsed = self.clock.now().saturating_sub(started);
                        self.recorder.record(RunEvent::PollSatisfied {
                            subject: label,
                            attempts,
                            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        });
                        return Ok(());
                    }
                    Evaluation::Pending(reason) => last_reason = reason,
                },
                Err(err) if condition.tolerates(&err) => {
                    last_reason = format!("transient: {err}");
                }
                Err(err) => return Err(PollError::Fetch(err)),
            }

            if self.clock.now().saturating_sub(started) >= timeout {
                self.recorder.record(RunEvent::PollTimedOut {
                    subject: label,
                    attempts,
                    last_reason: last_reason.clone(),
                });
                return Err(PollError::CheckFailed {
                    subject: subject.to_string(),
                    timeout,
                    attempts,
                    last_reason,
                });
            }
            self.clock.sleep(self.interval);
        }
    }

    /// [`PollEngine::wait`] with the timeout already translated into the
    /// condition's domain error.
    pub fn require<S, C, F>(&self, subject: &str, condition: &C, timeout: Duration, fetch: F) -> Result<()>
    where
        C: WaitCondition<S> + ?Sized,
        F: FnMut() -> Result<S>,
    {
        self.wait(subject, condition, timeout, fetch)
            .map_err(|err| err.into_error(condition))
    }
}
