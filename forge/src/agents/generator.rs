//! Code generator role: produce the files of one task as artifact actions.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::artifact::parse_actions;
use crate::core::store::ProjectFileStore;
use crate::core::types::{Action, Manifest, Task};
use crate::error::ExtractionError;
use crate::io::generation::GenerationService;

use super::RoleConfig;

/// Files committed by one generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedFiles {
    /// Normalized store keys, in action order, without duplicates.
    pub paths: Vec<String>,
    /// Exactly what was committed, keyed like `paths`.
    pub files: BTreeMap<String, String>,
    /// Shell actions are recorded, never executed.
    pub shell_commands: Vec<String>,
    /// The raw completion text.
    #[serde(skip)]
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct GeneratorAgent {
    config: RoleConfig,
}

impl GeneratorAgent {
    pub fn new(config: RoleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    /// Generate `task` and commit every file action into `store`.
    ///
    /// `extra_context` carries a fix strategy on heal attempts. Zero file
    /// actions is an [`ExtractionError`]; the store is then left untouched.
    #[instrument(skip_all, fields(task = %task.id, heal = extra_context.is_some()))]
    pub fn generate<G: GenerationService>(
        &self,
        service: &G,
        manifest: &Manifest,
        task: &Task,
        store: &mut ProjectFileStore,
        extra_context: Option<&str>,
    ) -> Result<GeneratedFiles> {
        let existing: BTreeMap<String, String> = store
            .iter()
            .filter(|(path, _)| !task.files.iter().any(|file| file == path))
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        let pack = self
            .config
            .prompts()
            .generator(manifest, task, &existing, extra_context)?;
        let raw = service
            .complete(&self.config.request(pack))
            .with_context(|| format!("generate task {}", task.id))?;

        let mut generated = commit_actions(&raw, store);
        if generated.paths.is_empty() {
            return Err(ExtractionError {
                what: format!("files for task {}", task.id),
                detail: "response contained no file actions".to_string(),
            }
            .into());
        }
        let unexpected: Vec<_> = generated
            .paths
            .iter()
            .filter(|path| !task.files.contains(path))
            .collect();
        if !unexpected.is_empty() {
            debug!(?unexpected, "generation wrote files outside the task");
        }
        info!(
            files = generated.paths.len(),
            shell = generated.shell_commands.len(),
            "task files generated"
        );
        generated.raw = raw;
        Ok(generated)
    }
}

fn commit_actions(raw: &str, store: &mut ProjectFileStore) -> GeneratedFiles {
    let mut generated = GeneratedFiles::default();
    for action in parse_actions(raw) {
        match action {
            Action::File { path, content } => {
                let Some(key) = store.commit(&path, content.clone()) else {
                    warn!(path = %path, "dropping file action with an empty path");
                    continue;
                };
                if !generated.paths.contains(&key) {
                    generated.paths.push(key.clone());
                }
                generated.files.insert(key, content);
            }
            Action::Shell { content } => generated.shell_commands.push(content),
        }
    }
    generated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ForgeConfig;
    use crate::test_support::{ScriptedGenerator, artifact_reply, sample_manifest, task};

    fn agent() -> GeneratorAgent {
        GeneratorAgent::new(RoleConfig::from_config(&ForgeConfig::default(), 0.2))
    }

    #[test]
    fn commits_normalized_paths_and_records_shell() {
        let mut reply = artifact_reply("task-1", &[("./src/App.tsx", "export default 1;")]);
        reply.push_str(
            "<forgeArtifact id=\"extra\">\n<forgeAction type=\"shell\">\nnpm install\n</forgeAction>\n</forgeArtifact>\n",
        );
        let service = ScriptedGenerator::new([reply]);
        let mut store = ProjectFileStore::new();

        let got = agent()
            .generate(
                &service,
                &sample_manifest(),
                &task("task-1", &["src/app.tsx"]),
                &mut store,
                None,
            )
            .expect("generate");

        assert_eq!(got.paths, vec!["src/app.tsx"]);
        assert_eq!(got.files["src/app.tsx"], "export default 1;");
        assert_eq!(got.shell_commands, vec!["npm install"]);
        assert_eq!(store.get("src/app.tsx"), Some("export default 1;"));
    }

    #[test]
    fn other_tasks_files_are_sent_as_context() {
        let service = ScriptedGenerator::new([artifact_reply("task-2", &[("src/app.tsx", "b")])]);
        let mut store = ProjectFileStore::new();
        store.commit("src/types.ts", "export type Id = string;");
        store.commit("src/app.tsx", "old");

        agent()
            .generate(
                &service,
                &sample_manifest(),
                &task("task-2", &["src/app.tsx"]),
                &mut store,
                Some("Root cause: missing export"),
            )
            .expect("generate");

        let user = &service.requests()[0].messages[0].content;
        assert!(user.contains("--- src/types.ts ---"));
        assert!(!user.contains("--- src/app.tsx ---"));
        assert!(user.contains("Root cause: missing export"));
    }

    #[test]
    fn reply_without_file_actions_is_extraction_error() {
        let service = ScriptedGenerator::new(["Sorry, here is some prose."]);
        let mut store = ProjectFileStore::new();
        let err = agent()
            .generate(
                &service,
                &sample_manifest(),
                &task("task-1", &["src/app.tsx"]),
                &mut store,
                None,
            )
            .unwrap_err();
        assert!(err.downcast_ref::<ExtractionError>().is_some());
        assert!(store.is_empty());
    }
}
