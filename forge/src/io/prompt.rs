//! Prompt packs for every generating role.
//!
//! Templates are rendered with minijinja, split into sections by
//! `<!-- section:KEY required|droppable -->` markers, and fitted into a byte
//! budget. The `contract` section becomes the system prompt; the remaining
//! sections form the user message.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Manifest, Task};
use crate::core::ui_schema::ComponentTemplate;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const DECOMPOSER_TEMPLATE: &str = include_str!("prompts/decomposer.md");
const GENERATOR_TEMPLATE: &str = include_str!("prompts/generator.md");
const EVALUATOR_TEMPLATE: &str = include_str!("prompts/evaluator.md");
const DEBUGGER_TEMPLATE: &str = include_str!("prompts/debugger.md");
const UI_PLAN_TEMPLATE: &str = include_str!("prompts/ui_plan.md");
const UI_GENERATE_TEMPLATE: &str = include_str!("prompts/ui_generate.md");

/// Drop order when a prompt exceeds its budget.
const DROP_ORDER: &[&str] = &["existing", "catalog", "context", "manifest", "plan", "code"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    for (name, source) in [
        ("planner", PLANNER_TEMPLATE),
        ("decomposer", DECOMPOSER_TEMPLATE),
        ("generator", GENERATOR_TEMPLATE),
        ("evaluator", EVALUATOR_TEMPLATE),
        ("debugger", DEBUGGER_TEMPLATE),
        ("ui_plan", UI_PLAN_TEMPLATE),
        ("ui_generate", UI_GENERATE_TEMPLATE),
    ] {
        env.add_template(name, source)
            .expect("prompt template should be valid");
    }
    env
});

#[derive(Debug, Clone, Serialize)]
struct FileView<'a> {
    path: &'a str,
    content: &'a str,
}

fn file_views(files: &BTreeMap<String, String>) -> Vec<FileView<'_>> {
    files
        .iter()
        .map(|(path, content)| FileView {
            path: path.as_str(),
            content: content.as_str(),
        })
        .collect()
}

fn manifest_json(manifest: &Manifest) -> String {
    serde_json::to_string_pretty(manifest).unwrap_or_default()
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(marker), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[marker.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`], then truncate the last section.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(last) = sections.last_mut() else {
        return;
    };
    let other_len = total - last.content.len();
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    let marker = "\n[truncated]";
    let keep = if allowed > marker.len() {
        allowed - marker.len()
    } else {
        allowed
    };
    let mut cut = keep.min(last.content.len());
    while !last.content.is_char_boundary(cut) {
        cut -= 1;
    }
    last.content.truncate(cut);
    if allowed > marker.len() {
        last.content.push_str(marker);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

/// A rendered prompt split into system prompt and user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    pub system: String,
    pub user: String,
}

/// Builds prompt packs within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    fn pack(&self, template: &str, ctx: minijinja::Value) -> Result<PromptPack> {
        let rendered = ENGINE.get_template(template)?.render(ctx)?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);

        let mut system = String::new();
        let mut user = Vec::new();
        for section in sections {
            if section.key == "contract" {
                system = section.content;
            } else {
                user.push(section.content);
            }
        }
        Ok(PromptPack {
            system,
            user: user.join("\n\n"),
        })
    }

    pub fn planner(&self, request: &str, extra_context: Option<&str>) -> Result<PromptPack> {
        self.pack(
            "planner",
            context! {
                request => request.trim(),
                context => non_empty(extra_context),
            },
        )
    }

    pub fn decomposer(&self, manifest: &Manifest) -> Result<PromptPack> {
        self.pack(
            "decomposer",
            context! { manifest => manifest_json(manifest) },
        )
    }

    pub fn generator(
        &self,
        manifest: &Manifest,
        task: &Task,
        existing: &BTreeMap<String, String>,
        fix: Option<&str>,
    ) -> Result<PromptPack> {
        self.pack(
            "generator",
            context! {
                task => task,
                manifest => manifest_json(manifest),
                existing => file_views(existing),
                fix => non_empty(fix),
            },
        )
    }

    pub fn evaluator(
        &self,
        task: &Task,
        files: &BTreeMap<String, String>,
        constraints: &[String],
    ) -> Result<PromptPack> {
        self.pack(
            "evaluator",
            context! {
                task => task,
                files => file_views(files),
                constraints => constraints,
            },
        )
    }

    pub fn debugger(
        &self,
        errors: &[String],
        code: &BTreeMap<String, String>,
        manifest: &Manifest,
    ) -> Result<PromptPack> {
        self.pack(
            "debugger",
            context! {
                errors => errors,
                code => file_views(code),
                manifest => manifest_json(manifest),
            },
        )
    }

    pub fn ui_plan(&self, request: &str, templates: &[ComponentTemplate]) -> Result<PromptPack> {
        self.pack(
            "ui_plan",
            context! { request => request.trim(), templates => templates },
        )
    }

    pub fn ui_generate(
        &self,
        request: &str,
        plan: Option<&str>,
        templates: &[ComponentTemplate],
        extra_types: &[String],
        diagnostic: Option<&str>,
    ) -> Result<PromptPack> {
        self.pack(
            "ui_generate",
            context! {
                request => request.trim(),
                plan => non_empty(plan),
                templates => templates,
                extra_types => extra_types,
                diagnostic => non_empty(diagnostic),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_manifest, task};

    #[test]
    fn contract_becomes_system_prompt() {
        let pack = PromptBuilder::new(100_000)
            .planner("Build a todo app", None)
            .expect("render");
        assert!(pack.system.starts_with("### Planner Contract"));
        assert!(pack.system.contains("<manifest>"));
        assert!(pack.user.contains("Build a todo app"));
        assert!(!pack.user.contains("Additional Context"));
    }

    #[test]
    fn generator_sections_are_ordered() {
        let existing = BTreeMap::from([("src/types.ts".to_string(), "export type Id = string;".to_string())]);
        let pack = PromptBuilder::new(100_000)
            .generator(
                &sample_manifest(),
                &task("task-1", &["src/app.tsx"]),
                &existing,
                Some("Root cause: x"),
            )
            .expect("render");
        let task_pos = pack.user.find("### Task").expect("task");
        let fix_pos = pack.user.find("### Fix From Previous Attempt").expect("fix");
        let manifest_pos = pack.user.find("### Manifest").expect("manifest");
        let existing_pos = pack.user.find("--- src/types.ts ---").expect("existing");
        assert!(task_pos < fix_pos && fix_pos < manifest_pos && manifest_pos < existing_pos);
        assert!(pack.system.contains("<forgeArtifact id=\"task-1\""));
    }

    #[test]
    fn budget_drops_existing_files_before_required_sections() {
        let existing = BTreeMap::from([("src/big.ts".to_string(), "x".repeat(5_000))]);
        let pack = PromptBuilder::new(2_500)
            .generator(&sample_manifest(), &task("task-1", &["src/app.tsx"]), &existing, None)
            .expect("render");
        assert!(!pack.user.contains("### Existing Files"));
        assert!(pack.user.contains("### Task"));
        assert!(pack.system.contains("### Generator Contract"));
    }

    #[test]
    fn oversized_required_section_is_truncated() {
        let files = BTreeMap::from([("src/app.tsx".to_string(), "y".repeat(10_000))]);
        let pack = PromptBuilder::new(3_000)
            .evaluator(&task("task-1", &["src/app.tsx"]), &files, &[])
            .expect("render");
        assert!(pack.user.ends_with("[truncated]"));
        assert!(pack.system.len() + pack.user.len() <= 3_000 + 4);
    }

    #[test]
    fn ui_generate_includes_diagnostic_when_present() {
        let templates = crate::core::ui_schema::ComponentCatalog::builtin().templates;
        let pack = PromptBuilder::new(100_000)
            .ui_generate("login form", Some("1. Input"), &templates, &[], Some("1. [property] bad"))
            .expect("render");
        assert!(pack.user.contains("Validation Errors In Previous Attempt"));
        assert!(pack.user.contains("- Button (required: label; allowed: label, variant, size, disabled)"));
    }
}
