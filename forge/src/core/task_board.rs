//! Task list normalization and the sequential task board.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::path::normalize_path;
use crate::core::types::{Manifest, Task, TaskStatus};

/// A task as the decomposer generation returns it, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Turn draft tasks into a well-formed, non-overlapping task list.
///
/// Paths are normalized; a file claimed by several tasks stays with the first;
/// manifest files nobody claimed are appended to the last task; tasks left
/// without files are dropped. Missing ids become `task-N`; duplicates get a
/// numeric suffix.
pub fn normalize_tasks(drafts: Vec<DraftTask>, manifest: &Manifest) -> Vec<Task> {
    let mut claimed = HashSet::new();
    let mut ids = HashSet::new();
    let mut tasks = Vec::with_capacity(drafts.len());

    for (idx, draft) in drafts.into_iter().enumerate() {
        let base_id = draft
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("task-{}", idx + 1));
        let mut id = base_id.clone();
        let mut suffix = 2;
        while !ids.insert(id.clone()) {
            id = format!("{base_id}-{suffix}");
            suffix += 1;
        }

        let files = draft
            .files
            .iter()
            .map(|file| normalize_path(file))
            .filter(|file| !file.is_empty() && claimed.insert(file.clone()))
            .collect();

        tasks.push(Task {
            name: draft
                .name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| id.clone()),
            id,
            files,
            status: TaskStatus::Todo,
            description: draft.description.unwrap_or_default(),
        });
    }

    let orphans: Vec<String> = manifest
        .files
        .iter()
        .map(|file| normalize_path(&file.path))
        .filter(|path| !path.is_empty() && !claimed.contains(path))
        .collect();

    tasks.retain(|task| !task.files.is_empty());

    if !orphans.is_empty() {
        match tasks.last_mut() {
            Some(last) => last.files.extend(orphans),
            None => tasks.push(Task {
                id: "task-1".to_string(),
                name: "Implement project files".to_string(),
                files: orphans,
                status: TaskStatus::Todo,
                description: "Implement every file listed in the manifest.".to_string(),
            }),
        }
    }

    tasks
}

/// Sequential pointer over a run's tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskBoard {
    tasks: Vec<Task>,
}

impl TaskBoard {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// The first task that is neither complete nor escalated, marked in progress.
    ///
    /// Calling this again without resolving the task returns the same task.
    pub fn get_next_task(&mut self) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|task| !task.status.is_terminal())?;
        task.status = TaskStatus::InProgress;
        Some(task.clone())
    }

    /// Complete `id` if it is the task in progress; otherwise a no-op returning false.
    pub fn mark_complete(&mut self, id: &str) -> bool {
        self.resolve(id, TaskStatus::Complete)
    }

    /// Escalate `id` if it is the task in progress; otherwise a no-op returning false.
    pub fn escalate(&mut self, id: &str) -> bool {
        self.resolve(id, TaskStatus::Escalated)
    }

    pub fn is_exhausted(&self) -> bool {
        self.tasks.iter().all(|task| task.status.is_terminal())
    }

    fn resolve(&mut self, id: &str, status: TaskStatus) -> bool {
        match self
            .tasks
            .iter_mut()
            .find(|task| task.status == TaskStatus::InProgress)
        {
            Some(task) if task.id == id => {
                task.status = status;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ManifestFile, TechStack};
    use std::collections::BTreeMap;

    fn manifest(paths: &[&str]) -> Manifest {
        Manifest {
            project_name: "demo".to_string(),
            tech_stack: TechStack {
                framework: "react".to_string(),
                language: "typescript".to_string(),
                styling: None,
            },
            design_tokens: BTreeMap::new(),
            files: paths
                .iter()
                .map(|p| ManifestFile {
                    path: p.to_string(),
                    description: String::new(),
                })
                .collect(),
            dependencies: Vec::new(),
        }
    }

    fn draft(id: Option<&str>, files: &[&str]) -> DraftTask {
        DraftTask {
            id: id.map(str::to_string),
            name: None,
            files: files.iter().map(|f| f.to_string()).collect(),
            description: None,
        }
    }

    #[test]
    fn overlap_goes_to_first_task_and_orphans_to_last() {
        let m = manifest(&["src/App.tsx", "src/a.ts", "src/b.ts", "src/orphan.ts"]);
        let tasks = normalize_tasks(
            vec![
                draft(Some("setup"), &["src/App.tsx", "src/a.ts"]),
                draft(Some("feature"), &["src/a.ts", "src/b.ts"]),
            ],
            &m,
        );
        assert_eq!(tasks[0].files, vec!["src/app.tsx", "src/a.ts"]);
        assert_eq!(tasks[1].files, vec!["src/b.ts", "src/orphan.ts"]);
    }

    #[test]
    fn ids_are_defaulted_and_deduplicated() {
        let m = manifest(&["a.ts", "b.ts", "c.ts"]);
        let tasks = normalize_tasks(
            vec![
                draft(None, &["a.ts"]),
                draft(Some("x"), &["b.ts"]),
                draft(Some("x"), &["c.ts"]),
            ],
            &m,
        );
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["task-1", "x", "x-2"]);
        assert_eq!(tasks[0].name, "task-1");
    }

    #[test]
    fn tasks_emptied_by_dedup_are_dropped() {
        let m = manifest(&["a.ts"]);
        let tasks = normalize_tasks(
            vec![draft(Some("one"), &["a.ts"]), draft(Some("two"), &["A.ts"])],
            &m,
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "one");
    }

    #[test]
    fn empty_draft_list_still_covers_manifest() {
        let tasks = normalize_tasks(Vec::new(), &manifest(&["a.ts"]));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].files, vec!["a.ts"]);
    }

    #[test]
    fn board_walks_tasks_in_order_and_guards_resolution() {
        let m = manifest(&["a.ts", "b.ts"]);
        let mut board = TaskBoard::new(normalize_tasks(
            vec![draft(Some("one"), &["a.ts"]), draft(Some("two"), &["b.ts"])],
            &m,
        ));

        let first = board.get_next_task().expect("first");
        assert_eq!(first.id, "one");
        assert_eq!(board.get_next_task().expect("same").id, "one");
        assert!(!board.mark_complete("two"));
        assert!(board.escalate("one"));
        assert!(!board.escalate("one"));

        let second = board.get_next_task().expect("second");
        assert_eq!(second.id, "two");
        assert!(board.mark_complete("two"));
        assert!(board.get_next_task().is_none());
        assert!(board.is_exhausted());
        assert_eq!(board.get("one").map(|t| t.status), Some(TaskStatus::Escalated));
    }
}
