//! Initialization helpers for `.forge/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use super::config::{ForgeConfig, write_config};
use crate::core::ui_schema::ComponentCatalog;

/// Canonical paths within `.forge/` for a project root.
#[derive(Debug, Clone)]
pub struct ForgePaths {
    pub root: PathBuf,
    pub forge_dir: PathBuf,
    pub config_path: PathBuf,
    pub catalog_path: PathBuf,
    pub runs_dir: PathBuf,
    pub store_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ForgePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let forge_dir = root.join(".forge");
        Self {
            config_path: forge_dir.join("config.toml"),
            catalog_path: forge_dir.join("catalog.json"),
            runs_dir: forge_dir.join("runs"),
            store_dir: forge_dir.join("store"),
            gitignore_path: forge_dir.join(".gitignore"),
            forge_dir,
            root,
        }
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InitOptions {
    /// Overwrite existing forge-owned files.
    pub force: bool,
}

/// Create `.forge/` with a default config and an editable component catalog.
///
/// Fails if `.forge/` already exists unless `options.force` is set.
pub fn init_forge(root: &Path, options: InitOptions) -> Result<ForgePaths> {
    let paths = ForgePaths::new(root);
    if paths.forge_dir.exists() && !paths.forge_dir.is_dir() {
        return Err(anyhow!("forge init: .forge exists but is not a directory"));
    }
    if paths.forge_dir.exists() && !options.force {
        return Err(anyhow!(
            "forge init: .forge already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.runs_dir)?;
    create_dir(&paths.store_dir)?;
    write_file(&paths.gitignore_path, FORGE_GITIGNORE)?;
    write_json(&paths.catalog_path, &ComponentCatalog::builtin())?;

    let mut config = ForgeConfig::default();
    config.ui.catalog_path = Some(PathBuf::from(".forge/catalog.json"));
    write_config(&paths.config_path, &config)?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_file(path, &buf)
}

const FORGE_GITIGNORE: &str = "runs/\nstore/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_forge(temp.path(), InitOptions { force: false }).expect("init");

        assert!(paths.runs_dir.is_dir());
        assert!(paths.store_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            FORGE_GITIGNORE
        );

        let config = load_config(&paths.config_path).expect("config");
        let catalog_path = paths.resolve(config.ui.catalog_path.as_deref().expect("catalog"));
        let catalog = ComponentCatalog::from_json_str(
            &fs::read_to_string(catalog_path).expect("read catalog"),
        )
        .expect("parse catalog");
        assert_eq!(catalog, ComponentCatalog::builtin());
    }

    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_forge(temp.path(), InitOptions { force: false }).expect("init");
        let err = init_forge(temp.path(), InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        init_forge(temp.path(), InitOptions { force: true }).expect("re-init");
    }
}
