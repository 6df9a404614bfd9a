//! Run artifact files under `.forge/runs/<run_id>/`.
//!
//! These are product artifacts, written regardless of `RUST_LOG`: raw
//! generation text, evaluation results and fix strategies per attempt, the
//! planning raw text, and the final run summary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{EvaluationResult, FixStrategy};

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub plan_dir: PathBuf,
    pub events_path: PathBuf,
    pub summary_path: PathBuf,
    pub stream_dir: PathBuf,
}

impl RunPaths {
    pub fn new(root: &Path, run_id: &str) -> Self {
        let dir = root.join(".forge").join("runs").join(run_id);
        Self {
            plan_dir: dir.join("plan"),
            events_path: dir.join("events.jsonl"),
            summary_path: dir.join("summary.json"),
            stream_dir: dir.join("stream"),
            dir,
        }
    }

    pub fn attempt_dir(&self, task_id: &str, attempt: u32) -> PathBuf {
        self.dir.join(task_id).join(attempt.to_string())
    }

    /// Persist raw planner or decomposer output as `plan/<name>.raw.txt`.
    pub fn write_plan_raw(&self, name: &str, raw: &str) -> Result<PathBuf> {
        let path = self.plan_dir.join(format!("{name}.raw.txt"));
        write_text(&path, raw)?;
        Ok(path)
    }

    pub fn write_plan_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.plan_dir.join(format!("{name}.json"));
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<()> {
        write_json(&self.summary_path, summary)
    }
}

/// Everything recorded for one generate/evaluate attempt of a task.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRecord<'a> {
    pub task_id: &'a str,
    pub attempt: u32,
    pub raw: Option<&'a str>,
    pub evaluation: Option<&'a EvaluationResult>,
    pub fix: Option<&'a FixStrategy>,
}

pub fn write_attempt(paths: &RunPaths, record: &AttemptRecord<'_>) -> Result<PathBuf> {
    let dir = paths.attempt_dir(record.task_id, record.attempt);
    fs::create_dir_all(&dir).with_context(|| format!("create attempt dir {}", dir.display()))?;

    if let Some(raw) = record.raw {
        write_text(&dir.join("raw.txt"), raw)?;
    }
    if let Some(evaluation) = record.evaluation {
        write_json(&dir.join("evaluation.json"), evaluation)?;
    }
    if let Some(fix) = record.fix {
        write_json(&dir.join("fix.json"), fix)?;
    }
    Ok(dir)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
