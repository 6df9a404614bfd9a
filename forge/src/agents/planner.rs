//! Planner role: one generation call turning a prompt into a [`Manifest`].

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::core::extract::{Strategy, extract_value};
use crate::core::invariants::validate_manifest;
use crate::core::path::normalize_path;
use crate::core::types::Manifest;
use crate::error::SchemaValidationFailure;
use crate::io::generation::GenerationService;
use crate::io::run_log::RunPaths;
use crate::io::schema::{MANIFEST_SCHEMA, schema_errors};

use super::RoleConfig;

const STRATEGIES: &[Strategy] = &[
    Strategy::Delimited("manifest"),
    Strategy::Fenced,
    Strategy::WholeText,
];

#[derive(Debug, Clone)]
pub struct PlannerAgent {
    config: RoleConfig,
}

impl PlannerAgent {
    pub fn new(config: RoleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    /// Plan a project. Raw text is kept under the run's `plan/` dir when
    /// `run` is given.
    #[instrument(skip_all, fields(prompt_bytes = prompt.len()))]
    pub fn generate<G: GenerationService>(
        &self,
        service: &G,
        prompt: &str,
        context: Option<&str>,
        run: Option<&RunPaths>,
    ) -> Result<Manifest> {
        service.ensure_configured()?;

        let pack = self.config.prompts().planner(prompt, context)?;
        let raw = service
            .complete(&self.config.request(pack))
            .context("planner generation")?;
        let raw_path = match run {
            Some(paths) => Some(paths.write_plan_raw("planner", &raw)?),
            None => None,
        };
        let fail = |errors: Vec<String>| SchemaValidationFailure {
            what: "manifest".to_string(),
            errors,
            raw_path: raw_path.clone(),
        };

        let extracted = extract_value(&raw, STRATEGIES, "manifest")?;
        let mut value = extracted.value;
        let mut errors = schema_errors(&value, MANIFEST_SCHEMA)?;
        if !errors.is_empty() && inject_empty_dependencies(&mut value) {
            warn!(errors = errors.len(), "manifest invalid; retrying with empty dependencies");
            errors = schema_errors(&value, MANIFEST_SCHEMA)?;
        }
        if !errors.is_empty() {
            return Err(fail(errors).into());
        }

        let mut manifest: Manifest =
            serde_json::from_value(value).context("deserialize manifest")?;
        normalize_manifest_paths(&mut manifest);
        let violations = validate_manifest(&manifest);
        if !violations.is_empty() {
            return Err(fail(violations).into());
        }

        info!(
            strategy = %extracted.strategy,
            files = manifest.files.len(),
            project = %manifest.project_name,
            "manifest planned"
        );
        if let Some(paths) = run {
            paths.write_plan_json("manifest", &manifest)?;
        }
        Ok(manifest)
    }
}

/// Replace a missing or malformed `dependencies` with `[]`. Returns whether
/// anything changed.
fn inject_empty_dependencies(value: &mut Value) -> bool {
    let Some(object) = value.as_object_mut() else {
        return false;
    };
    let well_formed = object
        .get("dependencies")
        .and_then(Value::as_array)
        .is_some_and(|deps| deps.iter().all(Value::is_string));
    if well_formed {
        return false;
    }
    object.insert("dependencies".to_string(), json!([]));
    true
}

/// Normalize file paths, dropping empty ones and later duplicates.
fn normalize_manifest_paths(manifest: &mut Manifest) {
    let mut seen = std::collections::HashSet::new();
    manifest.files.retain_mut(|file| {
        file.path = normalize_path(&file.path);
        !file.path.is_empty() && seen.insert(file.path.clone())
    });
}
