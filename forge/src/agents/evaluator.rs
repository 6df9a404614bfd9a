//! Evaluator role: deterministic Phase A checks, then a semantic Phase B review.
//!
//! Phase B only runs when Phase A passes and is biased toward PASS: a reply
//! that cannot be parsed counts as a pass with no errors.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::extract::{Strategy, extract_json};
use crate::core::static_checks::StaticChecker;
use crate::core::store::ProjectFileStore;
use crate::core::types::{EvalStatus, EvaluationResult, Task};
use crate::io::generation::GenerationService;

use super::RoleConfig;

const STRATEGIES: &[Strategy] = &[
    Strategy::Delimited("evaluation"),
    Strategy::Fenced,
    Strategy::ObjectWithKey("status"),
];

#[derive(Debug, Clone)]
pub struct EvaluatorAgent {
    config: RoleConfig,
    checker: StaticChecker,
}

impl EvaluatorAgent {
    pub fn new(config: RoleConfig, checker: StaticChecker) -> Self {
        Self { config, checker }
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    /// Deterministic checks only.
    pub fn static_phase(&self, task: &Task, store: &ProjectFileStore) -> EvaluationResult {
        let errors = self.checker.check(&task.files, store);
        if errors.is_empty() {
            return EvaluationResult::pass();
        }
        let instructions = format!(
            "Fix every problem below and return the complete files:\n{}",
            errors
                .iter()
                .map(|error| format!("- {error}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        EvaluationResult::fail(errors, instructions)
    }

    /// Evaluate the task's current files. Only generation-service failures
    /// are returned as errors.
    #[instrument(skip_all, fields(task = %task.id))]
    pub fn evaluate<G: GenerationService>(
        &self,
        service: &G,
        task: &Task,
        store: &ProjectFileStore,
    ) -> Result<EvaluationResult> {
        let static_result = self.static_phase(task, store);
        if !static_result.passed() {
            info!(errors = static_result.errors.len(), "static checks failed");
            return Ok(static_result);
        }

        let files = store.snapshot(&task.files);
        let pack = self
            .config
            .prompts()
            .evaluator(task, &files, &self.checker.constraints())?;
        let raw = service
            .complete(&self.config.request(pack))
            .with_context(|| format!("evaluate task {}", task.id))?;
        let result = semantic_result(&raw);
        info!(passed = result.passed(), errors = result.errors.len(), "task evaluated");
        Ok(result)
    }
}

/// Interpret a Phase B reply.
///
/// FAIL iff the reply says FAIL or lists any error; anything unparseable is a pass.
fn semantic_result(raw: &str) -> EvaluationResult {
    let parsed = match extract_json::<EvaluationResult>(raw, STRATEGIES, "evaluation") {
        Ok(extracted) => {
            debug!(strategy = %extracted.strategy, "evaluation extracted");
            extracted.value
        }
        Err(err) => {
            warn!(err = %err, "evaluation unparseable; treating as pass");
            return EvaluationResult::pass();
        }
    };
    let errors: Vec<String> = parsed
        .errors
        .into_iter()
        .map(|error| error.trim().to_string())
        .filter(|error| !error.is_empty())
        .collect();
    if parsed.status == EvalStatus::Pass && errors.is_empty() {
        return EvaluationResult::pass();
    }
    let errors = if errors.is_empty() {
        vec!["semantic review reported FAIL without details".to_string()]
    } else {
        errors
    };
    EvaluationResult::fail(errors, parsed.healing_instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::static_checks::default_rules;
    use crate::io::config::ForgeConfig;
    use crate::test_support::{ScriptedGenerator, fail_reply, pass_reply, task};

    fn agent() -> EvaluatorAgent {
        EvaluatorAgent::new(
            RoleConfig::from_config(&ForgeConfig::default(), 0.0),
            StaticChecker::new(&default_rules()).expect("rules"),
        )
    }

    fn store_with(path: &str, content: &str) -> ProjectFileStore {
        let mut store = ProjectFileStore::new();
        store.commit(path, content);
        store
    }

    #[test]
    fn static_failure_skips_semantic_review() {
        let service = ScriptedGenerator::default();
        let store = store_with("src/app.tsx", "export const A = () => <button />;");
        let result = agent()
            .evaluate(&service, &task("task-1", &["src/app.tsx", "src/types.ts"]), &store)
            .expect("evaluate");

        assert!(!result.passed());
        assert_eq!(result.errors.len(), 2);
        assert!(result.healing_instructions.contains("- src/types.ts: file was not generated"));
        assert!(service.requests().is_empty());
    }

    #[test]
    fn semantic_pass_and_fail() {
        let store = store_with("src/app.tsx", "export default 1;");
        let service = ScriptedGenerator::new([pass_reply(), fail_reply("App renders nothing")]);
        let evaluator = agent();
        let t = task("task-1", &["src/app.tsx"]);

        assert!(evaluator.evaluate(&service, &t, &store).expect("first").passed());
        let failed = evaluator.evaluate(&service, &t, &store).expect("second");
        assert_eq!(failed.errors, vec!["App renders nothing"]);
        assert_eq!(failed.healing_instructions, "fix: App renders nothing");

        let request = &service.requests()[0];
        assert!(request.messages[0].content.contains("--- src/app.tsx ---"));
        assert!(request.messages[0].content.contains("no raw <button> markup"));
    }

    #[test]
    fn unparseable_review_passes() {
        assert!(semantic_result("Looks great to me!").passed());
    }

    #[test]
    fn errors_with_pass_status_still_fail() {
        let result =
            semantic_result(r#"Result: {"status": "PASS", "errors": ["missing key prop"]}"#);
        assert!(!result.passed());
        assert_eq!(result.errors, vec!["missing key prop"]);

        let result = semantic_result("```json\n{\"status\": \"FAIL\"}\n```");
        assert!(!result.passed());
        assert_eq!(result.errors.len(), 1);
    }
}
