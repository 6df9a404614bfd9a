//! Generation service abstraction.
//!
//! The [`GenerationService`] trait decouples every role from the actual
//! completion backend. [`CommandGenerator`] spawns a configured command
//! (by default `codex exec -`) and treats its stdout as the completion. Tests
//! use scripted services that return predetermined text without spawning
//! processes.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigurationError, GenerationServiceError};
use crate::io::config::{GenerationConfig, StdinFormat};
use crate::io::process::run_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
}

/// One completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    /// Render as a plain-text transcript for backends that read a single prompt.
    pub fn to_transcript(&self) -> String {
        let mut out = String::new();
        out.push_str("<system>\n");
        out.push_str(self.system_prompt.trim());
        out.push_str("\n</system>\n");
        for message in &self.messages {
            let tag = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            out.push_str(&format!("\n<{tag}>\n{}\n</{tag}>\n", message.content.trim()));
        }
        out
    }
}

/// Abstraction over completion backends.
pub trait GenerationService {
    /// Return the completion text for `request`.
    ///
    /// Transport and quota failures are reported as [`GenerationServiceError`];
    /// missing credentials as [`ConfigurationError`].
    fn complete(&self, request: &GenerationRequest) -> Result<String>;

    /// Fail fast with [`ConfigurationError`] when credentials are missing.
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }
}

impl<G: GenerationService + ?Sized> GenerationService for &G {
    fn complete(&self, request: &GenerationRequest) -> Result<String> {
        (**self).complete(request)
    }

    fn ensure_configured(&self) -> Result<()> {
        (**self).ensure_configured()
    }
}

impl<G: GenerationService + ?Sized> GenerationService for Arc<G> {
    fn complete(&self, request: &GenerationRequest) -> Result<String> {
        (**self).complete(request)
    }

    fn ensure_configured(&self) -> Result<()> {
        (**self).ensure_configured()
    }
}

/// Generation backend that spawns a command per call.
#[derive(Debug)]
pub struct CommandGenerator {
    config: GenerationConfig,
    stream_dir: Option<PathBuf>,
    calls: AtomicU32,
}

impl CommandGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            stream_dir: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Tee each call's stdout to `call-NNNN.log` under `dir` while it runs.
    pub fn with_stream_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stream_dir = Some(dir.into());
        self
    }

    fn build_command(&self, request: &GenerationRequest) -> Command {
        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..])
            .env("FORGE_PROVIDER", &request.options.provider)
            .env("FORGE_MODEL", &request.options.model)
            .env("FORGE_TEMPERATURE", request.options.temperature.to_string());
        cmd
    }

    fn stdin_payload(&self, request: &GenerationRequest) -> Result<String> {
        Ok(match self.config.stdin_format {
            StdinFormat::Text => request.to_transcript(),
            StdinFormat::Json => serde_json::to_string(request)?,
        })
    }
}

impl GenerationService for CommandGenerator {
    fn ensure_configured(&self) -> Result<()> {
        if self.config.command.first().is_none_or(|bin| bin.trim().is_empty()) {
            return Err(ConfigurationError("generation.command is empty".to_string()).into());
        }
        if let Some(var) = self.config.api_key_env.as_deref() {
            let present = std::env::var(var).is_ok_and(|value| !value.trim().is_empty());
            if !present {
                return Err(ConfigurationError(format!(
                    "environment variable {var} is not set; generation credentials are required"
                ))
                .into());
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(model = %request.options.model, messages = request.messages.len()))]
    fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.ensure_configured()?;

        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let stream_path = self
            .stream_dir
            .as_ref()
            .map(|dir| dir.join(format!("call-{call:04}.log")));
        let payload = self.stdin_payload(request)?;
        info!(call, bytes = payload.len(), "requesting completion");

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = run_command(
            self.build_command(request),
            Some(payload.as_bytes()),
            timeout,
            self.config.output_limit_bytes,
            stream_path.as_deref(),
        )
        .map_err(|err| GenerationServiceError::generic(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "generation timed out");
            return Err(GenerationServiceError::generic(format!(
                "generation command timed out after {}s",
                timeout.as_secs()
            ))
            .into());
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            let detail = if stderr.trim().is_empty() {
                format!("generation command exited with {:?}", output.status.code())
            } else {
                stderr.trim().to_string()
            };
            warn!(exit_code = ?output.status.code(), "generation command failed");
            return Err(GenerationServiceError::classify(detail).into());
        }

        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Err(
                GenerationServiceError::generic("generation command produced no output").into(),
            );
        }
        debug!(
            bytes = text.len(),
            truncated = output.stdout_truncated,
            "completion received"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationErrorKind, is_fatal};

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are a planner.".to_string(),
            messages: vec![Message::user("Build a todo app"), Message::assistant("ok")],
            options: GenerationOptions {
                provider: "openai".to_string(),
                model: "m".to_string(),
                temperature: 0.2,
            },
        }
    }

    fn config(command: &[&str]) -> GenerationConfig {
        GenerationConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 10,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn transcript_tags_each_message() {
        let text = request().to_transcript();
        assert!(text.starts_with("<system>\nYou are a planner.\n</system>\n"));
        assert!(text.contains("<user>\nBuild a todo app\n</user>"));
        assert!(text.contains("<assistant>\nok\n</assistant>"));
    }

    #[test]
    fn missing_api_key_is_configuration_error() {
        let mut cfg = config(&["cat"]);
        cfg.api_key_env = Some("FORGE_TEST_KEY_THAT_IS_NEVER_SET".to_string());
        let err = CommandGenerator::new(cfg).complete(&request()).unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
        assert!(is_fatal(&err));
    }

    #[cfg(unix)]
    #[test]
    fn stdout_becomes_completion() {
        let generator = CommandGenerator::new(config(&["cat"]));
        let text = generator.complete(&request()).expect("complete");
        assert!(text.contains("Build a todo app"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_classified_from_stderr() {
        let generator = CommandGenerator::new(config(&[
            "sh",
            "-c",
            "cat >/dev/null; echo 'Error: 429 Too Many Requests' >&2; exit 1",
        ]));
        let err = generator.complete(&request()).unwrap_err();
        let gen_err = err
            .downcast_ref::<GenerationServiceError>()
            .expect("generation error");
        assert_eq!(gen_err.kind, GenerationErrorKind::RateLimit);
    }

    #[cfg(unix)]
    #[test]
    fn stream_dir_receives_call_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = CommandGenerator::new(config(&["cat"])).with_stream_dir(temp.path());
        generator.complete(&request()).expect("complete");
        assert!(temp.path().join("call-0001.log").is_file());
    }
}
