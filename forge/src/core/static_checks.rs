//! Phase A of evaluation: deterministic checks over a task's files.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::path::extension_of;
use crate::core::store::ProjectFileStore;

/// Raw markup that must go through an approved component instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenMarkupRule {
    /// Regex matched against file content.
    pub pattern: String,
    /// Import path whose presence makes the pattern acceptable.
    pub alternative_import: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    pub message: String,
}

fn default_extensions() -> Vec<String> {
    vec!["tsx".to_string(), "jsx".to_string()]
}

pub fn default_rules() -> Vec<ForbiddenMarkupRule> {
    vec![
        ForbiddenMarkupRule {
            pattern: r"<button\b".to_string(),
            alternative_import: "components/ui/button".to_string(),
            extensions: default_extensions(),
            message: "raw <button> markup; use the Button component from components/ui/button"
                .to_string(),
        },
        ForbiddenMarkupRule {
            pattern: r"<input\b".to_string(),
            alternative_import: "components/ui/input".to_string(),
            extensions: default_extensions(),
            message: "raw <input> markup; use the Input component from components/ui/input"
                .to_string(),
        },
    ]
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    rule: ForbiddenMarkupRule,
}

/// Compiled Phase A checker.
#[derive(Debug, Clone)]
pub struct StaticChecker {
    rules: Vec<CompiledRule>,
}

impl StaticChecker {
    pub fn new(rules: &[ForbiddenMarkupRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).with_context(|| {
                    format!("compile forbidden markup pattern {:?}", rule.pattern)
                })?;
                Ok(CompiledRule {
                    regex,
                    rule: rule.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Rule messages, phrased as constraints for the semantic review.
    pub fn constraints(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|compiled| format!("no {}", compiled.rule.message))
            .collect()
    }

    /// Check every task file; returns one message per violation, empty on success.
    /// A file that defines an approved primitive is exempt from that primitive's rule.
    pub fn check(&self, task_files: &[String], store: &ProjectFileStore) -> Vec<String> {
        let mut errors = Vec::new();
        for path in task_files {
            let Some((key, content)) = store.resolve(path) else {
                errors.push(format!("{path}: file was not generated"));
                continue;
            };
            if content.trim().is_empty() {
                errors.push(format!("{key}: file is empty"));
                continue;
            }
            let ext = extension_of(key).map(str::to_ascii_lowercase);
            for compiled in &self.rules {
                let applies = ext.as_deref().is_some_and(|ext| {
                    compiled
                        .rule
                        .extensions
                        .iter()
                        .any(|allowed| allowed.trim_start_matches('.') == ext)
                });
                let defines_primitive = key.contains(&compiled.rule.alternative_import);
                if applies
                    && !defines_primitive
                    && compiled.regex.is_match(content)
                    && !content.contains(&compiled.rule.alternative_import)
                {
                    errors.push(format!("{key}: {}", compiled.rule.message));
                }
            }
        }
        errors
    }
}
