//! Run-level lifecycle tests: plan → scaffold → decompose → heal loop.
//!
//! Every test scripts the generation service reply by reply, so the order of
//! calls the controller makes is part of what is verified.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use forge::controller::{Controller, RunReport};
use forge::core::types::{ManifestFile, TaskStatus};
use forge::io::config::ForgeConfig;
use forge::io::durable::{LocalDurableStore, load_project};
use forge::io::events::{RunEvent, RunOutcome};
use forge::test_support::{
    RecordingSink, ScriptedGenerator, artifact_reply, fail_reply, fix_reply, manifest_reply,
    pass_reply, sample_manifest, tasks_reply,
};

const APP: &str = "src/App.tsx";
const BUTTON: &str = "src/components/ui/button.tsx";
const TYPES: &str = "src/types.ts";

fn controller(
    root: &Path,
    config: &ForgeConfig,
    service: ScriptedGenerator,
    sink: Arc<RecordingSink>,
) -> Controller<ScriptedGenerator> {
    let durable = Arc::new(LocalDurableStore::new(root.join("store")));
    Controller::new(config, root, service, durable, sink).expect("controller")
}

fn plan_replies(service: &ScriptedGenerator) {
    service.push(manifest_reply(&sample_manifest()));
    service.push(tasks_reply(&[("task-1", &[APP]), ("task-2", &[TYPES, BUTTON])]));
}

fn second_task_passes(service: &ScriptedGenerator) {
    service.push(artifact_reply(
        "task-2",
        &[
            (TYPES, "export type Id = string;"),
            (BUTTON, "export const Button = (p) => <button {...p} />;"),
        ],
    ));
    service.push(pass_reply());
}

fn read_summary(root: &Path, run_id: &str) -> RunReport {
    let path = root.join(".forge/runs").join(run_id).join("summary.json");
    serde_json::from_str(&fs::read_to_string(path).expect("summary")).expect("parse summary")
}

/// A task failing evaluation on attempts 1-4 escalates after the fourth
/// failure; the run moves on to the next task and still finishes.
#[test]
fn failing_task_escalates_and_run_continues() {
    let temp = tempfile::tempdir().expect("tempdir");
    let service = ScriptedGenerator::default();
    plan_replies(&service);
    for attempt in 1..=4 {
        service.push(artifact_reply("task-1", &[(APP, "export default () => null;")]));
        service.push(fail_reply(&format!("App renders nothing (attempt {attempt})")));
        if attempt < 4 {
            service.push(fix_reply("empty render", "render the todo list"));
        }
    }
    second_task_passes(&service);

    let sink = Arc::new(RecordingSink::default());
    let ctl = controller(temp.path(), &ForgeConfig::default(), service, sink.clone());
    let report = ctl
        .run_with_id("run-esc", "demo", "Build a todo app")
        .expect("run");

    assert_eq!(report.outcome, RunOutcome::CompletedWithEscalations);
    assert_eq!(report.tasks.len(), 2);
    let first = &report.tasks[0];
    assert_eq!(first.status, TaskStatus::Escalated);
    assert_eq!(first.attempts, 4);
    assert_eq!(first.retries, 4);
    assert_eq!(report.tasks[1].status, TaskStatus::Complete);
    assert_eq!(report.escalated().count(), 1);

    let alerts: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|(_, event)| match event {
            RunEvent::EscalationAlert {
                task_id, retries, ..
            } => Some((task_id, retries)),
            _ => None,
        })
        .collect();
    assert_eq!(alerts, vec![("task-1".to_string(), 4)]);

    let run_dir = temp.path().join(".forge/runs/run-esc");
    for attempt in 1..=3 {
        assert!(run_dir.join(format!("task-1/{attempt}/fix.json")).is_file());
    }
    assert!(run_dir.join("task-1/4/evaluation.json").is_file());
    assert!(!run_dir.join("task-1/4/fix.json").exists());
    assert_eq!(read_summary(temp.path(), "run-esc"), report);
}

/// Phase A clean plus an unparseable Phase B reply is a pass with no errors.
#[test]
fn unparseable_review_counts_as_pass() {
    let temp = tempfile::tempdir().expect("tempdir");
    let service = ScriptedGenerator::default();
    plan_replies(&service);
    service.push(artifact_reply("task-1", &[(APP, "export default () => null;")]));
    service.push("Honestly this looks fine to me.");
    second_task_passes(&service);

    let sink = Arc::new(RecordingSink::default());
    let ctl = controller(temp.path(), &ForgeConfig::default(), service, sink.clone());
    let report = ctl.run("demo", "Build a todo app").expect("run");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.tasks.iter().all(|task| task.attempts == 1));
    let statuses: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|(_, event)| match event {
            RunEvent::BuildStatus { passed, errors, .. } => Some((passed, errors.len())),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![(true, 0), (true, 0)]);
}

/// The retry ceiling is configurable: with `max_retries = 1` a task gets two
/// attempts. A reply with no file actions counts as a failed attempt.
#[test]
fn replies_without_files_fail_within_configured_ceiling() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = ForgeConfig::default();
    config.orchestration.max_retries = 1;

    let service = ScriptedGenerator::default();
    plan_replies(&service);
    service.push("I will write the app later.");
    service.push(fix_reply("no artifact", "emit a forgeArtifact"));
    service.push("Still no code, sorry.");
    second_task_passes(&service);

    let sink = Arc::new(RecordingSink::default());
    let ctl = controller(temp.path(), &config, service, sink.clone());
    let report = ctl.run("demo", "Build a todo app").expect("run");

    let first = &report.tasks[0];
    assert_eq!(first.status, TaskStatus::Escalated);
    assert_eq!(first.attempts, 2);
    assert_eq!(first.retries, 2);
    assert_eq!(report.tasks[1].status, TaskStatus::Complete);
}

/// A task file that the scaffold would also produce (`src/main.tsx`) is not
/// pre-committed, so a reply that never writes it fails the existence check.
#[test]
fn listed_entry_file_must_come_from_the_generator() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = ForgeConfig::default();
    config.orchestration.max_retries = 1;

    let mut manifest = sample_manifest();
    manifest.files.push(ManifestFile {
        path: "src/main.tsx".to_string(),
        description: "entry".to_string(),
    });
    let service = ScriptedGenerator::default();
    service.push(manifest_reply(&manifest));
    service.push(tasks_reply(&[
        ("task-1", &[APP, "src/main.tsx"]),
        ("task-2", &[TYPES, BUTTON]),
    ]));
    service.push(artifact_reply("task-1", &[(APP, "export default () => null;")]));
    service.push(fix_reply("src/main.tsx missing", "write the entry file"));
    service.push(artifact_reply("task-1", &[(APP, "export default () => null;")]));
    second_task_passes(&service);

    let sink = Arc::new(RecordingSink::default());
    let ctl = controller(temp.path(), &config, service, sink.clone());
    let report = ctl.run("demo", "Build a todo app").expect("run");

    assert_eq!(report.tasks[0].status, TaskStatus::Escalated);
    assert_eq!(report.tasks[0].attempts, 2);
    assert_eq!(report.tasks[1].status, TaskStatus::Complete);

    let durable = LocalDurableStore::new(temp.path().join("store"));
    let stored = load_project(&durable, "local", "demo").expect("load");
    assert!(stored.get("src/main.tsx").is_none());
    assert!(stored.get("src/index.css").is_some());
}

/// Scaffold and generated files are written through to the durable store.
#[test]
fn committed_files_reach_the_durable_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let service = ScriptedGenerator::default();
    plan_replies(&service);
    service.push(artifact_reply("task-1", &[(APP, "export default () => null;")]));
    service.push(pass_reply());
    second_task_passes(&service);

    let sink = Arc::new(RecordingSink::default());
    let ctl = controller(temp.path(), &ForgeConfig::default(), service, sink.clone());
    let report = ctl.run("demo", "Build a todo app").expect("run");

    let durable = LocalDurableStore::new(temp.path().join("store"));
    let stored = load_project(&durable, "local", "demo").expect("load");
    let stored_paths: Vec<_> = stored.paths().map(str::to_string).collect();
    assert_eq!(stored_paths, report.files);
    assert!(stored.get("package.json").is_some());
    assert_eq!(stored.get("src/app.tsx"), Some("export default () => null;"));

    let kinds = sink.kinds();
    assert_eq!(kinds.first().copied(), Some("phase_change"));
    assert_eq!(kinds.last().copied(), Some("done"));
    assert!(kinds.contains(&"file_committed"));
}
