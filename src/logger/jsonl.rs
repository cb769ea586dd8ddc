//! JSONL logger: append-only line-delimited JSON for post-run analysis of a harness run.
//!
//! One JSON object per line, written with a single `write_all` and flushed
//! immediately so a crashed run still leaves a complete trail up to the
//! failing step.
//!
//! Sinks degrade in order: primary file, fallback file, stderr (prefixed
//! `[MMA-JSONL]`), discard. Logging never fails a scenario.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::PathsConfig;
use crate::core::errors::{MmaError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types matching the harness activity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    RunStop,
    ScenarioStart,
    ScenarioPass,
    ScenarioFail,
    Command,
    PollStart,
    PollSatisfied,
    PollTimeout,
    MigrationTransition,
    FaultInjected,
    FaultRestored,
    ProbeResult,
    Error,
}

/// A single JSONL log entry. All fields are optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Event type identifier.
    pub event: EventType,
    /// Severity level.
    pub severity: Severity,
    /// Scenario the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Controller involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// Model involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Command line or wait subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Migration phase label (`from->to`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Number of polls performed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u64>,
    /// Duration of the action in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Whether the action succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// MMA error code if action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            scenario: None,
            controller: None,
            model: None,
            subject: None,
            phase: None,
            attempts: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where lines currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl Sink {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Optional fallback path (e.g. on a different filesystem).
    pub fallback_path: Option<PathBuf>,
    /// Size at which the primary file is rotated to `<path>.1` on open.
    pub rotate_at_bytes: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathsConfig::default().jsonl_log,
            fallback_path: Some(std::env::temp_dir().join("mma.jsonl")),
            rotate_at_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Append-only JSONL log writer with a degradation chain.
#[derive(Debug)]
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<File>,
    sink: Sink,
    lines_written: u64,
}

impl JsonlWriter {
    /// Open the log. Runs are short, so rotation happens once here rather
    /// than per write.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Discard,
            lines_written: 0,
        };
        rotate_if_large(&writer.config.path, writer.config.rotate_at_bytes);
        writer.attach(Sink::Primary);
        writer
    }

    /// Write a single log entry as one JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[MMA-JSONL] serialize error: {e}");
            }
        }
    }

    /// Current sink.
    pub fn sink(&self) -> Sink {
        self.sink
    }

    /// Lines accepted since open, across all sinks except discard.
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn write_line(&mut self, line: &str) {
        loop {
            match self.sink {
                Sink::Primary | Sink::Fallback => {
                    let written = self.file.as_mut().is_some_and(|file| {
                        file.write_all(line.as_bytes()).is_ok() && file.flush().is_ok()
                    });
                    if written {
                        self.lines_written += 1;
                        return;
                    }
                    self.degrade();
                }
                Sink::Stderr => {
                    if write!(io::stderr(), "[MMA-JSONL] {line}").is_ok() {
                        self.lines_written += 1;
                    }
                    return;
                }
                Sink::Discard => return,
            }
        }
    }

    fn degrade(&mut self) {
        let next = match self.sink {
            Sink::Primary => Sink::Fallback,
            Sink::Fallback => Sink::Stderr,
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
        self.attach(next);
    }

    fn attach(&mut self, sink: Sink) {
        self.file = None;
        let path = match sink {
            Sink::Primary => Some(self.config.path.clone()),
            Sink::Fallback => self.config.fallback_path.clone(),
            Sink::Stderr | Sink::Discard => {
                self.sink = sink;
                return;
            }
        };
        match path.map(|p| open_append(&p).map(|file| (p, file))) {
            Some(Ok((p, file))) => {
                if sink == Sink::Fallback {
                    let _ = writeln!(
                        io::stderr(),
                        "[MMA-JSONL] primary path failed, using fallback: {}",
                        p.display()
                    );
                }
                self.file = Some(file);
                self.sink = sink;
            }
            Some(Err(_)) | None => {
                self.sink = sink;
                self.degrade();
            }
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| MmaError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| MmaError::io(path, source))
}

fn rotate_if_large(path: &Path, limit: u64) {
    let too_large = fs::metadata(path).is_ok_and(|meta| meta.len() >= limit);
    if too_large {
        let mut rotated = path.as_os_str().to_owned();
        rotated.push(".1");
        let _ = fs::rename(path, PathBuf::from(rotated));
    }
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(path: PathBuf) -> JsonlConfig {
        JsonlConfig {
            path,
            fallback_path: None,
            rotate_at_bytes: 1024 * 1024,
        }
    }

    #[test]
    fn write_entry_produces_valid_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let mut writer = JsonlWriter::open(config_at(path.clone()));

        let mut entry = LogEntry::new(EventType::ScenarioStart, Severity::Info);
        entry.scenario = Some("resources-migration".to_string());
        writer.write_entry(&entry);
        writer.write_entry(&LogEntry::new(EventType::ScenarioPass, Severity::Info));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "scenario_start");
        assert_eq!(parsed["severity"], "info");
        assert_eq!(parsed["scenario"], "resources-migration");
        assert_eq!(writer.lines_written(), 2);
    }

    #[test]
    fn optional_fields_omitted_when_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.jsonl");
        let mut writer = JsonlWriter::open(config_at(path.clone()));
        writer.write_entry(&LogEntry::new(EventType::RunStart, Severity::Info));

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"model\""));
        assert!(!line.contains("\"controller\""));
        assert!(!line.contains("\"attempts\""));
    }

    #[test]
    fn fallback_when_primary_dir_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file in the way").unwrap();
        let fallback = dir.path().join("fallback.jsonl");
        let mut writer = JsonlWriter::open(JsonlConfig {
            path: blocker.join("primary.jsonl"),
            fallback_path: Some(fallback.clone()),
            rotate_at_bytes: 1024,
        });

        assert_eq!(writer.sink(), Sink::Fallback);
        writer.write_entry(&LogEntry::new(EventType::Error, Severity::Warning));
        assert!(!fs::read_to_string(&fallback).unwrap().is_empty());
    }

    #[test]
    fn stderr_when_no_file_sink_available() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let writer = JsonlWriter::open(config_at(blocker.join("run.jsonl")));
        assert_eq!(writer.sink(), Sink::Stderr);
        assert_eq!(writer.sink().as_str(), "stderr");
    }

    #[test]
    fn oversized_log_rotated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jsonl");
        fs::write(&path, "x".repeat(64)).unwrap();
        let mut writer = JsonlWriter::open(JsonlConfig {
            path: path.clone(),
            fallback_path: None,
            rotate_at_bytes: 32,
        });
        writer.write_entry(&LogEntry::new(EventType::RunStart, Severity::Info));

        assert!(dir.path().join("big.jsonl.1").exists());
        assert!(fs::read_to_string(&path).unwrap().contains("run_start"));
    }
}
