//! Orchestration controller: plan, scaffold, decompose, then drive every task
//! through generate → evaluate → heal until it completes or escalates.
//!
//! Each task follows the pure transitions in [`crate::core::state_machine`].
//! Progress goes to the event sink as it happens; per-attempt artifacts go to
//! `.forge/runs/<run_id>/`; committed files are written through to the
//! durable store after every change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::agents::Roles;
use crate::core::scaffold::scaffold;
use crate::core::state_machine::{TaskEvent, TaskPhase, Transition, transition};
use crate::core::store::ProjectFileStore;
use crate::core::task_board::TaskBoard;
use crate::core::types::{EvaluationResult, FixStrategy, Manifest, Task, TaskStatus};
use crate::error::{ExtractionError, GenerationServiceError, is_fatal};
use crate::io::config::ForgeConfig;
use crate::io::durable::{DurableStore, persist_paths, validate_id};
use crate::io::events::{EventSink, FanoutSink, JsonlSink, LogLevel, RunEvent, RunOutcome};
use crate::io::generation::GenerationService;
use crate::io::run_log::{AttemptRecord, RunPaths, write_attempt};

/// Per-task line of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    /// Heal cycles spent; `max_retries + 1` for an escalated task.
    pub retries: u32,
    /// Generate/evaluate attempts made.
    pub attempts: u32,
}

/// Outcome of one run, also written as `summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub project_id: String,
    pub outcome: RunOutcome,
    pub tasks: Vec<TaskReport>,
    /// Every path in the project store at the end of the run.
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn escalated(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Escalated)
    }
}

/// Drives runs for one configuration and generation backend.
pub struct Controller<G> {
    roles: Roles,
    service: G,
    durable: Arc<dyn DurableStore>,
    sink: Arc<dyn EventSink>,
    root: PathBuf,
    owner: String,
    max_retries: u32,
}

/// Mutable state of a run in flight.
struct RunContext {
    run_id: String,
    project_id: String,
    paths: RunPaths,
    events: FanoutSink,
    store: ProjectFileStore,
    tasks: Vec<TaskReport>,
}

impl RunContext {
    fn emit(&self, event: RunEvent) {
        self.events.emit(&self.run_id, &event);
    }
}

impl<G: GenerationService> Controller<G> {
    /// `root` is the project root holding `.forge/runs/`.
    pub fn new(
        config: &ForgeConfig,
        root: impl Into<PathBuf>,
        service: G,
        durable: Arc<dyn DurableStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        Ok(Self {
            roles: Roles::from_config(config)?,
            service,
            durable,
            sink,
            root: root.into(),
            owner: config.store.owner.clone(),
            max_retries: config.orchestration.max_retries,
        })
    }

    /// Run `prompt` for `project_id` under a fresh run id.
    pub fn run(&self, project_id: &str, prompt: &str) -> Result<RunReport> {
        self.run_with_id(&new_run_id(), project_id, prompt)
    }

    /// Run under a caller-chosen id.
    ///
    /// Fatal errors and planning failures end the run: a `done` event with
    /// outcome `failed` is emitted, the summary is written, and the error is
    /// returned. Escalated tasks are an outcome, not an error.
    #[instrument(skip_all, fields(run_id = %run_id, project = %project_id))]
    pub fn run_with_id(&self, run_id: &str, project_id: &str, prompt: &str) -> Result<RunReport> {
        validate_id("project", project_id)?;
        let paths = RunPaths::new(&self.root, run_id);
        let journal = JsonlSink::new(paths.events_path.clone())?;
        let mut ctx = RunContext {
            run_id: run_id.to_string(),
            project_id: project_id.to_string(),
            paths,
            events: FanoutSink::new().with(Arc::clone(&self.sink)).with(journal),
            store: ProjectFileStore::new(),
            tasks: Vec::new(),
        };

        let result = self.execute(&mut ctx, prompt);
        let (outcome, error) = match &result {
            Ok(()) if ctx.tasks.iter().all(|task| task.status == TaskStatus::Complete) => {
                (RunOutcome::Completed, None)
            }
            Ok(()) => (RunOutcome::CompletedWithEscalations, None),
            Err(err) => (RunOutcome::Failed, Some(describe_failure(err))),
        };
        if let Some(message) = &error {
            ctx.emit(RunEvent::Log {
                level: LogLevel::Error,
                message: message.clone(),
            });
        }
        ctx.emit(RunEvent::Done {
            outcome,
            message: error.clone(),
        });

        let report = RunReport {
            run_id: ctx.run_id.clone(),
            project_id: ctx.project_id.clone(),
            outcome,
            tasks: ctx.tasks,
            files: ctx.store.paths().map(str::to_string).collect(),
            error,
        };
        ctx.paths.write_summary(&report)?;
        info!(outcome = ?report.outcome, tasks = report.tasks.len(), "run finished");
        result.map(|()| report)
    }

    fn execute(&self, ctx: &mut RunContext, prompt: &str) -> Result<()> {
        ctx.emit(RunEvent::phase(None, "planning"));
        let manifest =
            self.roles
                .planner
                .generate(&self.service, prompt, None, Some(&ctx.paths))?;
        ctx.emit(RunEvent::info(format!(
            "planned {} with {} files",
            manifest.project_name,
            manifest.files.len()
        )));

        ctx.emit(RunEvent::phase(None, "scaffolding"));
        let scaffolded = scaffold(&manifest);
        let mut committed = Vec::new();
        for (path, content) in scaffolded.unlisted_files(&manifest) {
            if let Some(key) = ctx.store.commit(path, content.clone()) {
                committed.push(key);
            }
        }
        self.write_through(ctx, &committed)?;

        ctx.emit(RunEvent::phase(None, "decomposing"));
        let tasks = self
            .roles
            .decomposer
            .decompose(&self.service, &manifest, Some(&ctx.paths))?;
        ctx.emit(RunEvent::info(format!("decomposed into {} tasks", tasks.len())));

        let mut board = TaskBoard::new(tasks);
        while let Some(task) = board.get_next_task() {
            let report = self.run_task(ctx, &manifest, &task)?;
            let resolved = match report.status {
                TaskStatus::Complete => board.mark_complete(&task.id),
                _ => board.escalate(&task.id),
            };
            if !resolved {
                return Err(anyhow!("task board refused to resolve {}", task.id));
            }
            ctx.tasks.push(report);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(task = %task.id))]
    fn run_task(&self, ctx: &mut RunContext, manifest: &Manifest, task: &Task) -> Result<TaskReport> {
        let step = |phase, event, retries| -> Result<Transition> {
            transition(phase, event, retries, self.max_retries).map_err(|err| anyhow!(err))
        };
        let mut state = step(TaskPhase::Pending, TaskEvent::Start, 0)?;
        let mut attempts = 0;
        let mut fix: Option<FixStrategy> = None;

        loop {
            attempts += 1;
            ctx.emit(RunEvent::phase(Some(&task.id), state.phase.label()));
            let heal_context = fix.as_ref().map(FixStrategy::as_context);
            let generated = self.roles.generator.generate(
                &self.service,
                manifest,
                task,
                &mut ctx.store,
                heal_context.as_deref(),
            );

            let (raw, evaluation) = match generated {
                Ok(generated) => {
                    self.write_through(ctx, &generated.paths)?;
                    state = step(state.phase, TaskEvent::Generated, state.retries)?;
                    ctx.emit(RunEvent::phase(Some(&task.id), state.phase.label()));
                    let evaluation = self
                        .roles
                        .evaluator
                        .evaluate(&self.service, task, &ctx.store)
                        .or_else(|err| absorb(err, "evaluation failed"))?;
                    (Some(generated.raw), evaluation)
                }
                Err(err) => (None, absorb(err, "generation produced no files")?),
            };

            ctx.emit(RunEvent::BuildStatus {
                task_id: task.id.clone(),
                attempt: attempts,
                passed: evaluation.passed(),
                errors: evaluation.errors.clone(),
            });
            let mut record = AttemptRecord {
                task_id: &task.id,
                attempt: attempts,
                raw: raw.as_deref(),
                evaluation: Some(&evaluation),
                fix: None,
            };

            if evaluation.passed() {
                state = step(state.phase, TaskEvent::Passed, state.retries)?;
                write_attempt(&ctx.paths, &record)?;
                ctx.emit(RunEvent::phase(Some(&task.id), state.phase.label()));
                return Ok(task_report(task, TaskStatus::Complete, state.retries, attempts));
            }

            state = step(state.phase, TaskEvent::Failed, state.retries)?;
            if state.phase == TaskPhase::Escalated {
                write_attempt(&ctx.paths, &record)?;
                warn!(retries = state.retries, "task escalated");
                ctx.emit(RunEvent::EscalationAlert {
                    task_id: task.id.clone(),
                    retries: state.retries,
                    errors: evaluation.errors.clone(),
                });
                ctx.emit(RunEvent::phase(Some(&task.id), state.phase.label()));
                return Ok(task_report(task, TaskStatus::Escalated, state.retries, attempts));
            }

            ctx.emit(RunEvent::phase(Some(&task.id), state.phase.label()));
            let current_code = ctx.store.snapshot(&task.files);
            let strategy = self.roles.debugger.analyze_and_fix(
                &self.service,
                &evaluation.errors,
                &current_code,
                manifest,
            );
            record.fix = Some(&strategy);
            write_attempt(&ctx.paths, &record)?;
            fix = Some(strategy);
            state = step(state.phase, TaskEvent::FixReady, state.retries)?;
        }
    }

    fn write_through(&self, ctx: &RunContext, paths: &[String]) -> Result<()> {
        persist_paths(
            self.durable.as_ref(),
            &self.owner,
            &ctx.project_id,
            &ctx.store,
            paths,
        )?;
        for path in paths {
            let bytes = ctx.store.get(path).map_or(0, str::len);
            ctx.emit(RunEvent::FileCommitted {
                path: path.clone(),
                bytes,
            });
        }
        Ok(())
    }
}

pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fold a non-fatal error into a failed evaluation; fatal errors propagate.
fn absorb(err: anyhow::Error, summary: &str) -> Result<EvaluationResult> {
    if is_fatal(&err) {
        return Err(err);
    }
    let detail = match err.downcast_ref::<ExtractionError>() {
        Some(extraction) => extraction.to_string(),
        None => format!("{err:#}"),
    };
    warn!(detail = %detail, "{summary}");
    Ok(EvaluationResult::fail(
        vec![detail],
        "Reply with one forgeArtifact containing a file action with the complete content of every task file.",
    ))
}

fn task_report(task: &Task, status: TaskStatus, retries: u32, attempts: u32) -> TaskReport {
    TaskReport {
        id: task.id.clone(),
        name: task.name.clone(),
        status,
        retries,
        attempts,
    }
}

fn describe_failure(err: &anyhow::Error) -> String {
    match err.downcast_ref::<GenerationServiceError>() {
        Some(gen_err) => format!("{}: {}", gen_err.user_message(), gen_err.message),
        None => format!("{err:#}"),
    }
}
