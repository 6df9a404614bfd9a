//! Decomposer role: split a manifest into an ordered, non-overlapping task list.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::core::extract::{Strategy, extract_value};
use crate::core::invariants::validate_task_list;
use crate::core::task_board::{DraftTask, normalize_tasks};
use crate::core::types::{Manifest, Task};
use crate::error::SchemaValidationFailure;
use crate::io::generation::GenerationService;
use crate::io::run_log::RunPaths;
use crate::io::schema::{TASK_LIST_SCHEMA, schema_errors};

use super::RoleConfig;

const STRATEGIES: &[Strategy] = &[
    Strategy::Delimited("tasks"),
    Strategy::Fenced,
    Strategy::ObjectWithKey("tasks"),
    Strategy::WholeText,
];

/// Task counts outside this range are logged, not rejected.
const TARGET_TASKS: std::ops::RangeInclusive<usize> = 3..=7;

#[derive(Debug, Clone)]
pub struct DecomposerAgent {
    config: RoleConfig,
}

impl DecomposerAgent {
    pub fn new(config: RoleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    #[instrument(skip_all, fields(files = manifest.files.len()))]
    pub fn decompose<G: GenerationService>(
        &self,
        service: &G,
        manifest: &Manifest,
        run: Option<&RunPaths>,
    ) -> Result<Vec<Task>> {
        let pack = self.config.prompts().decomposer(manifest)?;
        let raw = service
            .complete(&self.config.request(pack))
            .context("decomposer generation")?;
        let raw_path = match run {
            Some(paths) => Some(paths.write_plan_raw("decomposer", &raw)?),
            None => None,
        };

        let extracted = extract_value(&raw, STRATEGIES, "task list")?;
        let value = match extracted.value {
            Value::Array(items) => json!({ "tasks": items }),
            other => other,
        };
        let errors = schema_errors(&value, TASK_LIST_SCHEMA)?;
        if !errors.is_empty() {
            return Err(SchemaValidationFailure {
                what: "task list".to_string(),
                errors,
                raw_path,
            }
            .into());
        }
        let drafts: Vec<DraftTask> = serde_json::from_value(value["tasks"].clone())
            .context("deserialize task list")?;
        let drafted = drafts.len();

        let tasks = normalize_tasks(drafts, manifest);
        let violations = validate_task_list(&tasks, manifest);
        if !violations.is_empty() {
            return Err(SchemaValidationFailure {
                what: "task list".to_string(),
                errors: violations,
                raw_path,
            }
            .into());
        }
        if !TARGET_TASKS.contains(&tasks.len()) {
            warn!(tasks = tasks.len(), "task count outside the 3-7 target");
        }
        info!(
            strategy = %extracted.strategy,
            drafted,
            tasks = tasks.len(),
            "manifest decomposed"
        );
        if let Some(paths) = run {
            paths.write_plan_json("tasks", &tasks)?;
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::io::config::ForgeConfig;
    use crate::test_support::{ScriptedGenerator, sample_manifest, tasks_reply};

    fn agent() -> DecomposerAgent {
        DecomposerAgent::new(RoleConfig::from_config(&ForgeConfig::default(), 0.2))
    }

    #[test]
    fn overlapping_and_orphan_files_are_resolved() {
        let service = ScriptedGenerator::new([tasks_reply(&[
            ("shell", &["src/App.tsx", "src/types.ts"]),
            ("ui", &["src/types.ts"]),
        ])]);
        let tasks = agent()
            .decompose(&service, &sample_manifest(), None)
            .expect("decompose");

        let ids: Vec<_> = tasks.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["shell"]);
        assert_eq!(
            tasks[0].files,
            vec!["src/app.tsx", "src/types.ts", "src/components/ui/button.tsx"]
        );
        assert!(tasks.iter().all(|task| task.status == TaskStatus::Todo));
    }

    #[test]
    fn bare_array_in_fence_is_accepted() {
        let service = ScriptedGenerator::new([r#"Plan:
```json
[{"title": "App", "files": ["src/App.tsx", "src/types.ts"]},
 {"title": "Button", "files": ["src/components/ui/button.tsx"]}]
```"#]);
        let tasks = agent()
            .decompose(&service, &sample_manifest(), None)
            .expect("decompose");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "task-1");
        assert_eq!(tasks[1].name, "Button");
    }

    #[test]
    fn tasks_without_files_fail_schema() {
        let service = ScriptedGenerator::new([r#"<tasks>{"tasks": [{"id": "a"}]}</tasks>"#]);
        let err = agent()
            .decompose(&service, &sample_manifest(), None)
            .unwrap_err();
        assert!(err.downcast_ref::<SchemaValidationFailure>().is_some());
    }
}
