//! Generating roles. Each owns its prompt settings and talks to a
//! [`GenerationService`](crate::io::generation::GenerationService) passed in per call.

use anyhow::Result;

use crate::core::static_checks::StaticChecker;
use crate::io::config::ForgeConfig;
use crate::io::generation::{GenerationOptions, GenerationRequest, Message};
use crate::io::prompt::{PromptBuilder, PromptPack};

pub mod debugger;
pub mod decomposer;
pub mod evaluator;
pub mod generator;
pub mod planner;

use debugger::DebuggerAgent;
use decomposer::DecomposerAgent;
use evaluator::EvaluatorAgent;
use generator::GeneratorAgent;
use planner::PlannerAgent;

/// Model settings shared by one role's calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub prompt_budget_bytes: usize,
}

impl RoleConfig {
    pub fn from_config(config: &ForgeConfig, temperature: f32) -> Self {
        Self {
            provider: config.generation.provider.clone(),
            model: config.generation.model.clone(),
            temperature,
            prompt_budget_bytes: config.orchestration.prompt_budget_bytes,
        }
    }

    pub(crate) fn prompts(&self) -> PromptBuilder {
        PromptBuilder::new(self.prompt_budget_bytes)
    }

    pub(crate) fn request(&self, pack: PromptPack) -> GenerationRequest {
        GenerationRequest {
            system_prompt: pack.system,
            messages: vec![Message::user(pack.user)],
            options: GenerationOptions {
                provider: self.provider.clone(),
                model: self.model.clone(),
                temperature: self.temperature,
            },
        }
    }
}

/// Every role of a run, built explicitly from one config.
#[derive(Debug, Clone)]
pub struct Roles {
    pub planner: PlannerAgent,
    pub decomposer: DecomposerAgent,
    pub generator: GeneratorAgent,
    pub evaluator: EvaluatorAgent,
    pub debugger: DebuggerAgent,
}

impl Roles {
    pub fn from_config(config: &ForgeConfig) -> Result<Self> {
        let temps = &config.temperatures;
        Ok(Self {
            planner: PlannerAgent::new(RoleConfig::from_config(config, temps.planner)),
            decomposer: DecomposerAgent::new(RoleConfig::from_config(config, temps.decomposer)),
            generator: GeneratorAgent::new(RoleConfig::from_config(config, temps.generator)),
            evaluator: EvaluatorAgent::new(
                RoleConfig::from_config(config, temps.evaluator),
                StaticChecker::new(&config.evaluator.forbidden_markup)?,
            ),
            debugger: DebuggerAgent::new(RoleConfig::from_config(config, temps.debugger)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_take_their_own_temperature() {
        let mut config = ForgeConfig::default();
        config.temperatures.debugger = 0.7;
        config.generation.model = "test-model".to_string();
        let roles = Roles::from_config(&config).expect("roles");
        assert_eq!(roles.debugger.config().temperature, 0.7);
        assert_eq!(roles.planner.config().temperature, 0.4);
        assert_eq!(roles.generator.config().model, "test-model");
    }

    #[test]
    fn invalid_forbidden_pattern_fails_construction() {
        let mut config = ForgeConfig::default();
        config.evaluator.forbidden_markup[0].pattern = "(".to_string();
        assert!(Roles::from_config(&config).is_err());
    }
}
