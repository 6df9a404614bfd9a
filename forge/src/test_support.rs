//! Test-only helpers: scripted generation, event recording and fixtures.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;

use crate::core::artifact::serialize_artifact;
use crate::core::types::{
    Action, Artifact, Manifest, ManifestFile, Task, TaskStatus, TechStack,
};
use crate::error::GenerationServiceError;
use crate::io::events::{EventSink, RunEvent};
use crate::io::generation::{GenerationRequest, GenerationService};

/// Generation service that replays queued responses in order.
///
/// Once the queue is empty every call fails with a generic
/// [`GenerationServiceError`], so an under-scripted test ends its run loudly.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, GenerationServiceError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::default();
        for response in responses {
            generator.push(response);
        }
        generator
    }

    pub fn push(&self, response: impl Into<String>) -> &Self {
        self.lock_responses().push_back(Ok(response.into()));
        self
    }

    pub fn push_err(&self, err: GenerationServiceError) -> &Self {
        self.lock_responses().push_back(Err(err));
        self
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<String, GenerationServiceError>>> {
        self.responses.lock().expect("responses lock")
    }
}

impl GenerationService for ScriptedGenerator {
    fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        match self.lock_responses().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(err)) => Err(err.into()),
            None => Err(GenerationServiceError::generic("scripted responses exhausted").into()),
        }
    }
}

/// Event sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, RunEvent)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(String, RunEvent)> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("events lock")
            .iter()
            .map(|(_, event)| event.kind())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, run_id: &str, event: &RunEvent) {
        self.events
            .lock()
            .expect("events lock")
            .push((run_id.to_string(), event.clone()));
    }
}

/// Small React + TypeScript manifest with three files.
pub fn sample_manifest() -> Manifest {
    Manifest {
        project_name: "Todo App".to_string(),
        tech_stack: TechStack {
            framework: "react".to_string(),
            language: "typescript".to_string(),
            styling: Some("tailwind".to_string()),
        },
        design_tokens: BTreeMap::from([(
            "primary".to_string(),
            serde_json::Value::String("#2563eb".to_string()),
        )]),
        files: ["src/App.tsx", "src/components/ui/button.tsx", "src/types.ts"]
            .iter()
            .map(|path| ManifestFile {
                path: path.to_string(),
                description: String::new(),
            })
            .collect(),
        dependencies: vec!["zustand@4.5.0".to_string()],
    }
}

/// A `todo` task owning `files`.
pub fn task(id: &str, files: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        name: format!("{id} name"),
        files: files.iter().map(|file| file.to_string()).collect(),
        status: TaskStatus::Todo,
        description: format!("{id} description"),
    }
}

/// Planner reply wrapping `manifest` in its delimiter.
pub fn manifest_reply(manifest: &Manifest) -> String {
    format!(
        "Here is the plan.\n<manifest>\n{}\n</manifest>\n",
        serde_json::to_string_pretty(manifest).expect("manifest json")
    )
}

/// Decomposer reply listing `(id, files)` pairs.
pub fn tasks_reply(tasks: &[(&str, &[&str])]) -> String {
    let tasks: Vec<_> = tasks
        .iter()
        .map(|(id, files)| {
            serde_json::json!({
                "id": id,
                "name": format!("{id} name"),
                "files": files,
                "description": format!("build {id}"),
            })
        })
        .collect();
    format!(
        "<tasks>\n{}\n</tasks>",
        serde_json::json!({ "tasks": tasks })
    )
}

/// Generator reply with one file action per `(path, content)`.
pub fn artifact_reply(task_id: &str, files: &[(&str, &str)]) -> String {
    serialize_artifact(&Artifact {
        id: Some(task_id.to_string()),
        title: Some(format!("{task_id} files")),
        actions: files
            .iter()
            .map(|(path, content)| Action::File {
                path: path.to_string(),
                content: content.to_string(),
            })
            .collect(),
    })
    .expect("artifact markup")
}

pub fn pass_reply() -> String {
    "<evaluation>{\"status\": \"PASS\", \"errors\": [], \"healing_instructions\": \"\"}</evaluation>"
        .to_string()
}

pub fn fail_reply(error: &str) -> String {
    format!(
        "<evaluation>{}</evaluation>",
        serde_json::json!({
            "status": "FAIL",
            "errors": [error],
            "healing_instructions": format!("fix: {error}"),
        })
    )
}

pub fn fix_reply(root_cause: &str, patch: &str) -> String {
    format!(
        "<fix>{}</fix>",
        serde_json::json!({ "root_cause": root_cause, "patch": patch })
    )
}
