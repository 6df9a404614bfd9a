//! Debugger role: turn evaluation errors into a fix strategy. Never fails.

use std::collections::BTreeMap;

use tracing::{debug, instrument, warn};

use crate::core::extract::{Strategy, extract_json};
use crate::core::types::{FixStrategy, Manifest};
use crate::io::generation::GenerationService;

use super::RoleConfig;

const STRATEGIES: &[Strategy] = &[
    Strategy::Delimited("fix"),
    Strategy::Fenced,
    Strategy::ObjectWithKey("root_cause"),
];

#[derive(Debug, Clone)]
pub struct DebuggerAgent {
    config: RoleConfig,
}

impl DebuggerAgent {
    pub fn new(config: RoleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    /// Diagnose `errors` against the current code.
    ///
    /// Falls back through the extraction tiers, then to the raw reply as the
    /// patch, then to a strategy built from `errors` when generation itself fails.
    #[instrument(skip_all, fields(errors = errors.len(), files = current_code.len()))]
    pub fn analyze_and_fix<G: GenerationService>(
        &self,
        service: &G,
        errors: &[String],
        current_code: &BTreeMap<String, String>,
        manifest: &Manifest,
    ) -> FixStrategy {
        let raw = self
            .config
            .prompts()
            .debugger(errors, current_code, manifest)
            .and_then(|pack| service.complete(&self.config.request(pack)));
        match raw {
            Ok(raw) => parse_fix(&raw, errors),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "debugger generation failed; using error list");
                fallback_fix(errors)
            }
        }
    }
}

fn parse_fix(raw: &str, errors: &[String]) -> FixStrategy {
    if let Ok(extracted) = extract_json::<FixStrategy>(raw, STRATEGIES, "fix strategy") {
        debug!(strategy = %extracted.strategy, "fix strategy extracted");
        return extracted.value;
    }
    let text = raw.trim();
    if text.is_empty() {
        return fallback_fix(errors);
    }
    debug!("unstructured debugger reply used as patch");
    FixStrategy {
        root_cause: "The debugger replied without a structured diagnosis.".to_string(),
        patch: text.to_string(),
    }
}

fn fallback_fix(errors: &[String]) -> FixStrategy {
    FixStrategy {
        root_cause: "The previous attempt failed review.".to_string(),
        patch: format!(
            "Resolve each of these errors:\n{}",
            errors
                .iter()
                .map(|error| format!("- {error}"))
                .collect::<Vec<_>>()
                .join("\n")
        ),
    }
}
