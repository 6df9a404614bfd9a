//! Run progress events and the sinks that receive them.
//!
//! Events are fire-and-forget: a sink that fails logs a warning and the run
//! continues.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every task completed.
    Completed,
    /// The run finished but some tasks escalated.
    CompletedWithEscalations,
    /// The run stopped early on a fatal error.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    PhaseChange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        phase: String,
    },
    FileCommitted {
        path: String,
        bytes: usize,
    },
    BuildStatus {
        task_id: String,
        attempt: u32,
        passed: bool,
        errors: Vec<String>,
    },
    EscalationAlert {
        task_id: String,
        retries: u32,
        errors: Vec<String>,
    },
    Done {
        outcome: RunOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl RunEvent {
    pub fn info(message: impl Into<String>) -> Self {
        RunEvent::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn phase(task_id: Option<&str>, phase: impl Into<String>) -> Self {
        RunEvent::PhaseChange {
            task_id: task_id.map(str::to_string),
            phase: phase.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::Log { .. } => "log",
            RunEvent::PhaseChange { .. } => "phase_change",
            RunEvent::FileCommitted { .. } => "file_committed",
            RunEvent::BuildStatus { .. } => "build_status",
            RunEvent::EscalationAlert { .. } => "escalation_alert",
            RunEvent::Done { .. } => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Done { .. })
    }
}

/// An event stamped with its run id, as written to logs and streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEventRecord {
    pub run_id: String,
    pub at: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

impl RunEventRecord {
    pub fn new(run_id: &str, event: &RunEvent) -> Self {
        Self {
            run_id: run_id.to_string(),
            at: chrono::Utc::now().to_rfc3339(),
            event: event.clone(),
        }
    }
}

/// Receiver of run progress.
pub trait EventSink: Send + Sync {
    fn emit(&self, run_id: &str, event: &RunEvent);
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, run_id: &str, event: &RunEvent) {
        (**self).emit(run_id, event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, run_id: &str, event: &RunEvent) {
        (**self).emit(run_id, event);
    }
}

/// Mirrors events into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, run_id: &str, event: &RunEvent) {
        match event {
            RunEvent::Log {
                level: LogLevel::Warn | LogLevel::Error,
                message,
            } => warn!(run_id, message = %message, "run log"),
            RunEvent::EscalationAlert {
                task_id, retries, ..
            } => warn!(run_id, task_id = %task_id, retries, "task escalated"),
            _ => info!(run_id, kind = event.kind(), "run event"),
        }
    }
}

/// Appends one JSON record per line to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create event log dir {}", parent.display()))?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &RunEventRecord) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut line = serde_json::to_string(record).context("serialize event")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, run_id: &str, event: &RunEvent) {
        if let Err(err) = self.append(&RunEventRecord::new(run_id, event)) {
            warn!(err = %format!("{err:#}"), "failed to append run event");
        }
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, run_id: &str, event: &RunEvent) {
        for sink in &self.sinks {
            sink.emit(run_id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = RunEvent::EscalationAlert {
            task_id: "task-2".to_string(),
            retries: 4,
            errors: vec!["broken".to_string()],
        };
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["type"], "escalation_alert");
        assert_eq!(json["retries"], 4);

        let record =
            serde_json::to_value(RunEventRecord::new("run-1", &RunEvent::phase(None, "planning")))
                .expect("json");
        assert_eq!(record["run_id"], "run-1");
        assert_eq!(record["type"], "phase_change");
        assert!(record.get("task_id").is_none());
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sink = JsonlSink::new(temp.path().join("runs").join("events.jsonl")).expect("sink");
        sink.emit("run-1", &RunEvent::info("hello"));
        sink.emit(
            "run-1",
            &RunEvent::Done {
                outcome: RunOutcome::Completed,
                message: None,
            },
        );
        let text = fs::read_to_string(sink.path()).expect("read");
        let lines: Vec<RunEventRecord> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("record"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].event, RunEvent::info("hello"));
        assert!(lines[1].event.is_terminal());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone());
        fanout.emit(
            "run-1",
            &RunEvent::Log {
                level: LogLevel::Warn,
                message: "careful".to_string(),
            },
        );
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.kinds(), vec!["log"]);
    }
}
