//! One in-flight run per project id.
//!
//! `RunRegistry` guards a single process (the server); `ProjectLock` guards
//! separate processes sharing one store (the CLI).

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::io::durable::validate_id;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("a run is already in progress for project {0}")]
pub struct RunInProgress(pub String);

/// Tracks which projects have a run in flight.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `project_id`; the returned guard releases it on drop.
    pub fn try_begin(&self, project_id: &str) -> Result<RunGuard, RunInProgress> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(project_id.to_string()) {
            return Err(RunInProgress(project_id.to_string()));
        }
        Ok(RunGuard {
            registry: self.clone(),
            project_id: project_id.to_string(),
        })
    }

    pub fn is_active(&self, project_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(project_id)
    }
}

#[derive(Debug)]
pub struct RunGuard {
    registry: RunRegistry,
    project_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.project_id);
    }
}

/// Lock file `<dir>/<project>.lock`, created exclusively and removed on drop.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    /// Claim `project_id`, failing with [`RunInProgress`] if another holder
    /// (in this or any other process) has the lock file.
    pub fn acquire(dir: &Path, project_id: &str) -> Result<Self> {
        validate_id("project", project_id)?;
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(format!("{project_id}.lock"));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(RunInProgress(project_id.to_string()).into());
            }
            Err(err) => return Err(err).with_context(|| format!("create {}", path.display())),
        };
        let lock = Self { path };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("write {}", lock.path.display()))?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
