//! Durable storage for generated project files.
//!
//! The in-memory [`ProjectFileStore`] is the source of truth during a run; it
//! is written through to a [`DurableStore`] after every task's file-set change
//! so a crash loses at most the task in flight.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::core::store::ProjectFileStore;

/// Storage keyed by owner, project and project-relative path.
pub trait DurableStore: Send + Sync {
    fn upload(&self, owner: &str, project: &str, path: &str, content: &str) -> Result<()>;

    /// Every stored path for the project, sorted.
    fn list(&self, owner: &str, project: &str) -> Result<Vec<String>>;

    /// The stored content, or `None` when the path does not exist.
    fn download(&self, owner: &str, project: &str, path: &str) -> Result<Option<String>>;
}

/// Write the given paths from `files` through to `store`.
#[instrument(skip_all, fields(owner = %owner, project = %project, paths = paths.len()))]
pub fn persist_paths(
    store: &dyn DurableStore,
    owner: &str,
    project: &str,
    files: &ProjectFileStore,
    paths: &[String],
) -> Result<()> {
    for path in paths {
        if let Some(content) = files.get(path) {
            store
                .upload(owner, project, path, content)
                .with_context(|| format!("persist {path}"))?;
        }
    }
    debug!("write-through complete");
    Ok(())
}

/// Load every stored file of a project into a fresh in-memory store.
pub fn load_project(
    store: &dyn DurableStore,
    owner: &str,
    project: &str,
) -> Result<ProjectFileStore> {
    let mut files = ProjectFileStore::new();
    for path in store.list(owner, project)? {
        if let Some(content) = store.download(owner, project, &path)? {
            files.commit(&path, content);
        }
    }
    Ok(files)
}

/// Ids accepted as owner or project names.
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
        && id != "."
        && id != "..";
    if !valid {
        bail!("invalid {kind} id {id:?}");
    }
    Ok(())
}

/// Filesystem store at `<root>/<owner>/<project>/<path>`.
#[derive(Debug, Clone)]
pub struct LocalDurableStore {
    root: PathBuf,
}

impl LocalDurableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, owner: &str, project: &str) -> Result<PathBuf> {
        validate_id("owner", owner)?;
        validate_id("project", project)?;
        Ok(self.root.join(owner).join(project))
    }

    fn file_path(&self, owner: &str, project: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            bail!("refusing unsafe store path {path:?}");
        }
        Ok(self.project_dir(owner, project)?.join(relative))
    }
}

impl DurableStore for LocalDurableStore {
    fn upload(&self, owner: &str, project: &str, path: &str, content: &str) -> Result<()> {
        let target = self.file_path(owner, project, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let tmp = target.with_file_name(format!(
            ".{}.tmp",
            target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
        fs::write(&tmp, content).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &target).with_context(|| format!("replace {}", target.display()))?;
        Ok(())
    }

    fn list(&self, owner: &str, project: &str) -> Result<Vec<String>> {
        let dir = self.project_dir(owner, project)?;
        let mut paths = Vec::new();
        if dir.is_dir() {
            collect_files(&dir, &dir, &mut paths)?;
        }
        paths.sort();
        Ok(paths)
    }

    fn download(&self, owner: &str, project: &str, path: &str) -> Result<Option<String>> {
        let target = self.file_path(owner, project, path)?;
        if !target.is_file() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&target).with_context(|| format!("read {}", target.display()))?;
        Ok(Some(content))
    }
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            collect_files(base, &path, out)?;
        } else if file_type.is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') && name.ends_with(".tmp") {
                continue;
            }
            let relative = path
                .strip_prefix(base)
                .with_context(|| format!("relativize {}", path.display()))?;
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(key);
        }
    }
    Ok(())
}
