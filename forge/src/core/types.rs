//! Shared deterministic types for forge core logic.
//!
//! These are the typed records every generating role is validated into at the
//! boundary. They carry no I/O and serialize stably.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Technology choices for the generated project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechStack {
    pub framework: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<String>,
}

impl TechStack {
    pub fn is_typescript(&self) -> bool {
        let language = self.language.to_ascii_lowercase();
        language == "typescript" || language == "ts"
    }

    pub fn uses_tailwind(&self) -> bool {
        self.styling
            .as_deref()
            .is_some_and(|styling| styling.to_ascii_lowercase().contains("tailwind"))
    }
}

/// One file the planner expects the project to contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    #[serde(default)]
    pub description: String,
}

/// Structured project blueprint, produced once per run by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub project_name: String,
    pub tech_stack: TechStack,
    #[serde(default)]
    pub design_tokens: BTreeMap<String, serde_json::Value>,
    pub files: Vec<ManifestFile>,
    pub dependencies: Vec<String>,
}

impl Manifest {
    pub fn file_paths(&self) -> Vec<&str> {
        self.files.iter().map(|file| file.path.as_str()).collect()
    }
}

/// Lifecycle of a task on the task board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Complete,
    Escalated,
}

impl TaskStatus {
    /// Terminal tasks are never selected again in the same run.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Escalated)
    }
}

/// Milestone-sized unit of files processed through generate/evaluate/heal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub files: Vec<String>,
    pub status: TaskStatus,
    pub description: String,
}

/// A typed action extracted from generation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    File { path: String, content: String },
    Shell { content: String },
}

/// One parsed container of actions from a single generation response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Artifact {
    pub id: Option<String>,
    pub title: Option<String>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalStatus {
    #[serde(alias = "pass", alias = "Pass")]
    Pass,
    #[serde(alias = "fail", alias = "Fail")]
    Fail,
}

/// Outcome of one evaluation cycle for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub status: EvalStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub healing_instructions: String,
}

impl EvaluationResult {
    pub fn pass() -> Self {
        Self {
            status: EvalStatus::Pass,
            errors: Vec::new(),
            healing_instructions: String::new(),
        }
    }

    pub fn fail(errors: Vec<String>, healing_instructions: impl Into<String>) -> Self {
        Self {
            status: EvalStatus::Fail,
            errors,
            healing_instructions: healing_instructions.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == EvalStatus::Pass
    }
}

/// Debugger output merged into the next generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixStrategy {
    pub root_cause: String,
    pub patch: String,
}

impl FixStrategy {
    /// Render as extra context for the code generator.
    pub fn as_context(&self) -> String {
        format!(
            "Root cause of the previous failure:\n{}\n\nRequired fix:\n{}\n",
            self.root_cause.trim(),
            self.patch.trim()
        )
    }
}
