//! Forge configuration stored under `.forge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::static_checks::{ForbiddenMarkupRule, default_rules};

/// Default config location relative to the project root.
pub const CONFIG_PATH: &str = ".forge/config.toml";

/// Forge configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    pub generation: GenerationConfig,
    pub temperatures: Temperatures,
    pub orchestration: OrchestrationConfig,
    pub evaluator: EvaluatorConfig,
    pub ui: UiConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Command that reads a request on stdin and prints the completion on stdout.
    pub command: Vec<String>,
    /// Environment variable that must be set before any generation call.
    pub api_key_env: Option<String>,
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// How the request is written to the command's stdin.
    pub stdin_format: StdinFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StdinFormat {
    /// Tagged plain-text transcript.
    #[default]
    Text,
    /// The request serialized as one JSON object.
    Json,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            api_key_env: None,
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
            stdin_format: StdinFormat::Text,
        }
    }
}

/// Sampling temperature per role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Temperatures {
    pub planner: f32,
    pub decomposer: f32,
    pub generator: f32,
    pub evaluator: f32,
    pub debugger: f32,
    pub ui: f32,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            planner: 0.4,
            decomposer: 0.2,
            generator: 0.2,
            evaluator: 0.0,
            debugger: 0.1,
            ui: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Heal cycles allowed per task before escalation.
    pub max_retries: u32,
    /// Byte budget for a rendered prompt.
    pub prompt_budget_bytes: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            prompt_budget_bytes: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub forbidden_markup: Vec<ForbiddenMarkupRule>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            forbidden_markup: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    /// Total generate attempts in the UI pipeline.
    pub max_attempts: u32,
    /// JSON component catalog replacing the built-in one.
    pub catalog_path: Option<PathBuf>,
    /// Catalog templates placed in the prompt.
    pub retrieve_top_k: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            catalog_path: None,
            retrieve_top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the durable store, relative to the project root.
    pub root: PathBuf,
    /// Owner namespace for stored projects.
    pub owner: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".forge/store"),
            owner: "local".to_string(),
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        let gen_cfg = &self.generation;
        if gen_cfg.command.is_empty() || gen_cfg.command[0].trim().is_empty() {
            return Err(anyhow!("generation.command must be a non-empty array"));
        }
        if gen_cfg.timeout_secs == 0 {
            return Err(anyhow!("generation.timeout_secs must be > 0"));
        }
        if gen_cfg.output_limit_bytes == 0 {
            return Err(anyhow!("generation.output_limit_bytes must be > 0"));
        }
        if self.orchestration.prompt_budget_bytes == 0 {
            return Err(anyhow!("orchestration.prompt_budget_bytes must be > 0"));
        }
        if self.ui.max_attempts == 0 {
            return Err(anyhow!("ui.max_attempts must be > 0"));
        }
        if self.store.owner.trim().is_empty() {
            return Err(anyhow!("store.owner must not be empty"));
        }
        let temps = &self.temperatures;
        for (role, value) in [
            ("planner", temps.planner),
            ("decomposer", temps.decomposer),
            ("generator", temps.generator),
            ("evaluator", temps.evaluator),
            ("debugger", temps.debugger),
            ("ui", temps.ui),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("temperatures.{role} must be within 0.0..=2.0"));
            }
        }
        for rule in &self.evaluator.forbidden_markup {
            if rule.pattern.is_empty() || rule.alternative_import.is_empty() {
                return Err(anyhow!(
                    "evaluator.forbidden_markup entries need pattern and alternative_import"
                ));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForgeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
