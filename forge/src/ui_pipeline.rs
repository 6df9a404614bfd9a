//! Catalog-constrained UI generation: retrieve → plan → generate → validate.
//!
//! Every generated document goes through the D-HDC validator. A failed
//! attempt's diagnostic is fed verbatim into the next generate call, up to
//! the configured attempt cap.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::agents::RoleConfig;
use crate::core::extract::{Strategy, extract_value};
use crate::core::ui_schema::{
    ComponentCatalog, ComponentTemplate, UiValidation, validate, validate_str,
};
use crate::io::config::ForgeConfig;
use crate::io::generation::GenerationService;

const STRATEGIES: &[Strategy] = &[
    Strategy::Delimited("ui"),
    Strategy::Fenced,
    Strategy::ObjectWithKey("components"),
];

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiOutcome {
    pub ok: bool,
    /// The last document produced, valid or not.
    pub document: Option<Value>,
    pub attempts: u32,
    pub plan: String,
    /// Validation of the last attempt.
    pub validation: UiValidation,
}

#[derive(Debug, Clone)]
pub struct UiPipeline {
    config: RoleConfig,
    catalog: ComponentCatalog,
    max_attempts: u32,
    top_k: usize,
}

/// The configured catalog file, or the built-in catalog when none is set.
pub fn load_catalog(path: Option<&Path>) -> Result<ComponentCatalog> {
    let Some(path) = path else {
        return Ok(ComponentCatalog::builtin());
    };
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    ComponentCatalog::from_json_str(&text).with_context(|| format!("parse {}", path.display()))
}

impl UiPipeline {
    pub fn new(config: RoleConfig, catalog: ComponentCatalog, max_attempts: u32, top_k: usize) -> Self {
        Self {
            config,
            catalog,
            max_attempts: max_attempts.max(1),
            top_k,
        }
    }

    pub fn from_config(config: &ForgeConfig, catalog: ComponentCatalog) -> Self {
        Self::new(
            RoleConfig::from_config(config, config.temperatures.ui),
            catalog,
            config.ui.max_attempts,
            config.ui.retrieve_top_k,
        )
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// Top-k templates ranked by keyword overlap with `request`; ties keep
    /// catalog order.
    pub fn retrieve(&self, request: &str) -> Vec<ComponentTemplate> {
        let words: HashSet<String> = request
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        let mut scored: Vec<(usize, &ComponentTemplate)> = self
            .catalog
            .templates
            .iter()
            .map(|template| {
                let mut terms: HashSet<String> = template
                    .keywords
                    .iter()
                    .map(|keyword| keyword.to_ascii_lowercase())
                    .collect();
                terms.insert(template.type_name.to_ascii_lowercase());
                let score = terms.iter().filter(|term| words.contains(*term)).count();
                (score, template)
            })
            .collect();
        scored.sort_by_key(|(score, _)| Reverse(*score));
        scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, template)| template.clone())
            .collect()
    }

    #[instrument(skip_all, fields(request_bytes = request.len(), max_attempts = self.max_attempts))]
    pub fn run<G: GenerationService>(&self, service: &G, request: &str) -> Result<UiOutcome> {
        let templates = self.retrieve(request);
        debug!(
            templates = ?templates.iter().map(|t| t.type_name.as_str()).collect::<Vec<_>>(),
            "templates retrieved"
        );

        let plan_pack = self.config.prompts().ui_plan(request, &templates)?;
        let plan = service
            .complete(&self.config.request(plan_pack))
            .context("ui layout plan")?
            .trim()
            .to_string();

        let mut diagnostic: Option<String> = None;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let pack = self.config.prompts().ui_generate(
                request,
                Some(&plan),
                &templates,
                &self.catalog.types,
                diagnostic.as_deref(),
            )?;
            let raw = service
                .complete(&self.config.request(pack))
                .with_context(|| format!("ui generation attempt {attempts}"))?;
            let (document, validation) = self.check(&raw);

            if validation.ok || attempts >= self.max_attempts {
                if validation.ok {
                    info!(attempts, "ui document validated");
                } else {
                    warn!(attempts, errors = validation.errors.len(), "ui attempts exhausted");
                }
                return Ok(UiOutcome {
                    ok: validation.ok,
                    document,
                    attempts,
                    plan,
                    validation,
                });
            }
            debug!(attempt = attempts, errors = validation.errors.len(), "ui document rejected");
            diagnostic = Some(validation.diagnostic);
        }
    }

    fn check(&self, raw: &str) -> (Option<Value>, UiValidation) {
        match extract_value(raw, STRATEGIES, "ui document") {
            Ok(extracted) => {
                let validation = validate(&extracted.value, &self.catalog);
                (Some(extracted.value), validation)
            }
            Err(err) => {
                debug!(err = %err, "no ui document extracted; validating raw reply");
                (None, validate_str(raw.trim(), &self.catalog))
            }
        }
    }
}
