//! Observability handle passed explicitly into every harness component.
//!
//! A [`Recorder`] is built once per process in the CLI entry point and
//! cloned into constructors. Events go to the JSONL trail and, unless quiet,
//! a one-line progress message on stderr. Tests use [`Recorder::capturing`]
//! to assert on the emitted event sequence.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::MmaError;
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Events emitted by the harness.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        version: String,
        config_hash: String,
        source: String,
        destination: String,
    },
    RunFinished {
        passed: usize,
        failed: usize,
    },
    ScenarioStarted {
        scenario: String,
    },
    ScenarioPassed {
        scenario: String,
        duration_ms: u64,
    },
    ScenarioFailed {
        scenario: String,
        duration_ms: u64,
        error_code: String,
        error_message: String,
    },
    CommandRun {
        controller: String,
        model: Option<String>,
        command: String,
        duration_ms: u64,
        ok: bool,
    },
    PollStarted {
        subject: String,
        timeout_secs: u64,
    },
    PollSatisfied {
        subject: String,
        attempts: u64,
        duration_ms: u64,
    },
    PollTimedOut {
        subject: String,
        attempts: u64,
        last_reason: String,
    },
    MigrationTransition {
        model: String,
        controller: String,
        from: &'static str,
        to: &'static str,
    },
    FaultInjected {
        controller: String,
        service: String,
    },
    FaultRestored {
        controller: String,
        service: String,
        ok: bool,
    },
    ProbeResult {
        subject: String,
        ok: bool,
        details: String,
    },
    Note {
        details: String,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Echo policy for stderr progress lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Quiet,
    Normal,
    Verbose,
}

struct Inner {
    jsonl: Mutex<Option<JsonlWriter>>,
    captured: Option<Mutex<Vec<LogEntry>>>,
    scenario: Mutex<Option<String>>,
    echo: Echo,
}

/// Cheaply cloneable observability handle.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("echo", &self.inner.echo)
            .field("capturing", &self.inner.captured.is_some())
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Recorder writing to a JSONL trail.
    pub fn open(config: JsonlConfig, echo: Echo) -> Self {
        Self::build(Some(JsonlWriter::open(config)), None, echo)
    }

    /// Recorder that keeps entries in memory and stays silent.
    pub fn capturing() -> Self {
        Self::build(None, Some(Mutex::new(Vec::new())), Echo::Quiet)
    }

    /// Recorder that drops everything.
    pub fn discard() -> Self {
        Self::build(None, None, Echo::Quiet)
    }

    fn build(jsonl: Option<JsonlWriter>, captured: Option<Mutex<Vec<LogEntry>>>, echo: Echo) -> Self {
        Self {
            inner: Arc::new(Inner {
                jsonl: Mutex::new(jsonl),
                captured,
                scenario: Mutex::new(None),
                echo,
            }),
        }
    }

    /// Tag subsequent entries with the given scenario name.
    pub fn enter_scenario(&self, scenario: Option<&str>) {
        *self.inner.scenario.lock() = scenario.map(str::to_string);
    }

    /// Record one event.
    pub fn record(&self, event: RunEvent) {
        let mut entry = event_to_log_entry(&event);
        entry.scenario.clone_from(&self.inner.scenario.lock());

        if let Some(line) = echo_line(&event, self.inner.echo) {
            let _ = writeln!(io::stderr(), "{line}");
        }
        if let Some(writer) = self.inner.jsonl.lock().as_mut() {
            writer.write_entry(&entry);
        }
        if let Some(captured) = &self.inner.captured {
            captured.lock().push(entry);
        }
    }

    /// Free-form progress note.
    pub fn note(&self, details: impl Into<String>) {
        self.record(RunEvent::Note {
            details: details.into(),
        });
    }

    /// Record an error without consuming it.
    pub fn error(&self, err: &MmaError) {
        self.record(RunEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }

    /// Entries captured so far (empty unless built with [`Recorder::capturing`]).
    pub fn captured(&self) -> Vec<LogEntry> {
        self.inner
            .captured
            .as_ref()
            .map(|entries| entries.lock().clone())
            .unwrap_or_default()
    }

    /// Captured entries of one event type.
    pub fn captured_of(&self, event: EventType) -> Vec<LogEntry> {
        self.captured()
            .into_iter()
            .filter(|entry| entry.event == event)
            .collect()
    }
}

fn echo_line(event: &RunEvent, echo: Echo) -> Option<String> {
    if echo == Echo::Quiet {
        return None;
    }
    let line = match event {
        RunEvent::ScenarioStarted { scenario } => format!("[MMA-SCENARIO] {scenario}: starting"),
        RunEvent::ScenarioPassed {
            scenario,
            duration_ms,
        } => format!("[MMA-SCENARIO] SUCCESS: {scenario} ({duration_ms} ms)"),
        RunEvent::ScenarioFailed {
            scenario,
            error_message,
            ..
        } => format!("[MMA-SCENARIO] FAILED: {scenario}: {error_message}"),
        RunEvent::MigrationTransition {
            model, from, to, ..
        } => format!("[MMA-MIGRATE] {model}: {from} -> {to}"),
        RunEvent::FaultInjected {
            controller,
            service,
        } => format!("[MMA-FAULT] stopped {service} on {controller}"),
        RunEvent::FaultRestored {
            controller,
            service,
            ok,
        } => format!(
            "[MMA-FAULT] restart of {service} on {controller}: {}",
            if *ok { "ok" } else { "failed" }
        ),
        RunEvent::PollTimedOut {
            subject,
            last_reason,
            ..
        } => format!("[MMA-POLL] timed out waiting for {subject}: {last_reason}"),
        RunEvent::Note { details } => format!("[MMA] {details}"),
        RunEvent::Error { code, message } => format!("[{code}] {message}"),
        RunEvent::CommandRun { command, ok, .. } if echo == Echo::Verbose => {
            format!("[MMA-CMD] {command} ({})", if *ok { "ok" } else { "failed" })
        }
        RunEvent::PollStarted {
            subject,
            timeout_secs,
        } if echo == Echo::Verbose => format!("[MMA-POLL] {subject} (<= {timeout_secs}s)"),
        RunEvent::PollSatisfied {
            subject, attempts, ..
        } if echo == Echo::Verbose => format!("[MMA-POLL] {subject}: satisfied after {attempts} polls"),
        _ => return None,
    };
    Some(line)
}

#[allow(clippy::too_many_lines)]
fn event_to_log_entry(event: &RunEvent) -> LogEntry {
    match event {
        RunEvent::RunStarted {
            version,
            config_hash,
            source,
            destination,
        } => {
            let mut e = LogEntry::new(EventType::RunStart, Severity::Info);
            e.details = Some(format!(
                "version={version} config_hash={config_hash} source={source} destination={destination}"
            ));
            e
        }
        RunEvent::RunFinished { passed, failed } => {
            let mut e = LogEntry::new(
                EventType::RunStop,
                if *failed == 0 {
                    Severity::Info
                } else {
                    Severity::Critical
                },
            );
            e.ok = Some(*failed == 0);
            e.details = Some(format!("passed={passed} failed={failed}"));
            e
        }
        RunEvent::ScenarioStarted { scenario } => {
            let mut e = LogEntry::new(EventType::ScenarioStart, Severity::Info);
            e.subject = Some(scenario.clone());
            e
        }
        RunEvent::ScenarioPassed {
            scenario,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::ScenarioPass, Severity::Info);
            e.subject = Some(scenario.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        RunEvent::ScenarioFailed {
            scenario,
            duration_ms,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::ScenarioFail, Severity::Critical);
            e.subject = Some(scenario.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        RunEvent::CommandRun {
            controller,
            model,
            command,
            duration_ms,
            ok,
        } => {
            let mut e = LogEntry::new(
                EventType::Command,
                if *ok {
                    Severity::Info
                } else {
                    Severity::Warning
                },
            );
            e.controller = Some(controller.clone());
            e.model.clone_from(model);
            e.subject = Some(command.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(*ok);
            e
        }
        RunEvent::PollStarted {
            subject,
            timeout_secs,
        } => {
            let mut e = LogEntry::new(EventType::PollStart, Severity::Info);
            e.subject = Some(subject.clone());
            e.details = Some(format!("timeout={timeout_secs}s"));
            e
        }
        RunEvent::PollSatisfied {
            subject,
            attempts,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::PollSatisfied, Severity::Info);
            e.subject = Some(subject.clone());
            e.attempts = Some(*attempts);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        RunEvent::PollTimedOut {
            subject,
            attempts,
            last_reason,
        } => {
            let mut e = LogEntry::new(EventType::PollTimeout, Severity::Warning);
            e.subject = Some(subject.clone());
            e.attempts = Some(*attempts);
            e.ok = Some(false);
            e.details = Some(last_reason.clone());
            e
        }
        RunEvent::MigrationTransition {
            model,
            controller,
            from,
            to,
        } => {
            let mut e = LogEntry::new(EventType::MigrationTransition, Severity::Info);
            e.model = Some(model.clone());
            e.controller = Some(controller.clone());
            e.phase = Some(format!("{from}->{to}"));
            e
        }
        RunEvent::FaultInjected {
            controller,
            service,
        } => {
            let mut e = LogEntry::new(EventType::FaultInjected, Severity::Warning);
            e.controller = Some(controller.clone());
            e.subject = Some(service.clone());
            e
        }
        RunEvent::FaultRestored {
            controller,
            service,
            ok,
        } => {
            let mut e = LogEntry::new(
                EventType::FaultRestored,
                if *ok {
                    Severity::Info
                } else {
                    Severity::Critical
                },
            );
            e.controller = Some(controller.clone());
            e.subject = Some(service.clone());
            e.ok = Some(*ok);
            e
        }
        RunEvent::ProbeResult {
            subject,
            ok,
            details,
        } => {
            let mut e = LogEntry::new(EventType::ProbeResult, Severity::Info);
            e.subject = Some(subject.clone());
            e.ok = Some(*ok);
            e.details = Some(details.clone());
            e
        }
        RunEvent::Note { details } => {
            let mut e = LogEntry::new(EventType::Command, Severity::Info);
            e.details = Some(details.clone());
            e
        }
        RunEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
    }
}
