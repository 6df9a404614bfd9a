//! Semantic invariants not expressible via JSON Schema.

use std::collections::{HashMap, HashSet};

use crate::core::path::normalize_path;
use crate::core::types::{Manifest, Task};

/// Check manifest invariants:
/// - non-empty project name
/// - at least one file
/// - file paths unique after normalization and never empty
pub fn validate_manifest(manifest: &Manifest) -> Vec<String> {
    let mut errors = Vec::new();
    if manifest.project_name.trim().is_empty() {
        errors.push("project_name must not be empty".to_string());
    }
    if manifest.files.is_empty() {
        errors.push("files must list at least one file".to_string());
    }
    let mut seen = HashSet::new();
    for (idx, file) in manifest.files.iter().enumerate() {
        let path = normalize_path(&file.path);
        if path.is_empty() {
            errors.push(format!("files[{idx}]: path {:?} is empty after normalization", file.path));
        } else if !seen.insert(path.clone()) {
            errors.push(format!("files[{idx}]: duplicate path '{path}'"));
        }
    }
    errors
}

/// Check task-list invariants against the manifest:
/// - ids unique and non-empty
/// - every task owns at least one file
/// - no file owned by two tasks
/// - every manifest file owned by some task
pub fn validate_task_list(tasks: &[Task], manifest: &Manifest) -> Vec<String> {
    let mut errors = Vec::new();
    if tasks.is_empty() {
        errors.push("task list is empty".to_string());
        return errors;
    }

    let mut ids = HashSet::new();
    let mut owner: HashMap<&str, &str> = HashMap::new();
    for task in tasks {
        if task.id.trim().is_empty() {
            errors.push(format!("task '{}' has an empty id", task.name));
        } else if !ids.insert(task.id.as_str()) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
        if task.files.is_empty() {
            errors.push(format!("task '{}' owns no files", task.id));
        }
        for file in &task.files {
            if let Some(first) = owner.insert(file.as_str(), task.id.as_str()) {
                errors.push(format!(
                    "file '{}' assigned to both '{}' and '{}'",
                    file, first, task.id
                ));
            }
        }
    }

    for file in &manifest.files {
        let path = normalize_path(&file.path);
        if !path.is_empty() && !owner.contains_key(path.as_str()) {
            errors.push(format!("manifest file '{path}' is not assigned to any task"));
        }
    }

    errors
}
