//! `forge` command-line interface.
//!
//! Turns a prompt into a project under `.forge/store/`, plus the pure helpers
//! (scaffold, path normalization, UI validation) as standalone commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use forge::controller::{Controller, RunReport, new_run_id};
use forge::core::path::normalize_path;
use forge::core::scaffold::scaffold;
use forge::core::types::Manifest;
use forge::core::ui_schema::validate_str;
use forge::error::GenerationServiceError;
use forge::exit_codes;
use forge::io::config::{ForgeConfig, load_config};
use forge::io::durable::{LocalDurableStore, validate_id};
use forge::io::events::{RunOutcome, TracingSink};
use forge::io::generation::CommandGenerator;
use forge::io::init::{ForgePaths, InitOptions, init_forge};
use forge::io::run_log::RunPaths;
use forge::logging;
use forge::registry::ProjectLock;
use forge::ui_pipeline::{UiPipeline, load_catalog};

#[derive(Parser)]
#[command(name = "forge", version, about = "Prompt-to-codebase generation pipeline")]
struct Cli {
    /// Project root holding `.forge/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.forge/` with a default config and component catalog.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan, scaffold and generate a project from a prompt.
    Run {
        /// Project id the generated files are stored under.
        #[arg(long)]
        project: String,
        /// Prompt text, or `@path` to read it from a file.
        #[arg(long)]
        prompt: String,
    },
    /// Print (or write) the scaffold derived from a manifest JSON file.
    Scaffold {
        manifest: PathBuf,
        /// Write the scaffold files under this directory instead of printing JSON.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the normalized form of each path.
    Normalize {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Validate a UI document JSON file against the component catalog.
    ValidateUi { file: PathBuf },
    /// Generate a catalog-constrained UI document from a prompt.
    Ui {
        /// Prompt text, or `@path` to read it from a file.
        #[arg(long)]
        prompt: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = ForgePaths::new(&cli.root);
    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Run { project, prompt } => cmd_run(&paths, &project, &read_prompt(&prompt)?),
        Command::Scaffold { manifest, out } => cmd_scaffold(&manifest, out.as_deref()),
        Command::Normalize { paths } => cmd_normalize(&paths),
        Command::ValidateUi { file } => cmd_validate_ui(&paths, &file),
        Command::Ui { prompt } => cmd_ui(&paths, &read_prompt(&prompt)?),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<GenerationServiceError>().is_some() {
        exit_codes::GENERATION_FAILED
    } else {
        exit_codes::INVALID
    }
}

fn read_prompt(arg: &str) -> Result<String> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("read prompt {path}"))?,
        None => arg.to_string(),
    };
    if text.trim().is_empty() {
        bail!("prompt is empty");
    }
    Ok(text)
}

fn load(paths: &ForgePaths) -> Result<ForgeConfig> {
    load_config(&paths.config_path)
}

fn cmd_init(paths: &ForgePaths, force: bool) -> Result<i32> {
    let paths = init_forge(&paths.root, InitOptions { force })?;
    println!("initialized {}", paths.forge_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(paths: &ForgePaths, project: &str, prompt: &str) -> Result<i32> {
    let config = load(paths)?;
    let store_root = paths.resolve(&config.store.root);
    validate_id("owner", &config.store.owner)?;
    let _lock = ProjectLock::acquire(&store_root.join(&config.store.owner), project)?;
    let run_id = new_run_id();
    let run_paths = RunPaths::new(&paths.root, &run_id);
    let service = CommandGenerator::new(config.generation.clone()).with_stream_dir(run_paths.stream_dir);
    let durable = Arc::new(LocalDurableStore::new(store_root));
    let controller = Controller::new(&config, &paths.root, service, durable, Arc::new(TracingSink))?;

    let report = controller.run_with_id(&run_id, project, prompt)?;
    print_json(&report)?;
    Ok(run_exit_code(&report))
}

fn run_exit_code(report: &RunReport) -> i32 {
    match report.outcome {
        RunOutcome::Completed => exit_codes::OK,
        RunOutcome::CompletedWithEscalations => exit_codes::ESCALATED,
        RunOutcome::Failed => exit_codes::INVALID,
    }
}

fn cmd_scaffold(manifest_path: &Path, out: Option<&Path>) -> Result<i32> {
    let text = fs::read_to_string(manifest_path)
        .with_context(|| format!("read {}", manifest_path.display()))?;
    let manifest: Manifest = serde_json::from_str(&text)
        .with_context(|| format!("parse manifest {}", manifest_path.display()))?;
    let scaffolded = scaffold(&manifest);

    let Some(out) = out else {
        print_json(&scaffolded)?;
        return Ok(exit_codes::OK);
    };
    for dir in &scaffolded.directories {
        let dir = out.join(dir);
        fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;
    }
    for (path, content) in scaffolded.files() {
        let target = out.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&target, content).with_context(|| format!("write {}", target.display()))?;
    }
    println!(
        "wrote {} files under {}",
        scaffolded.file_count(),
        out.display()
    );
    Ok(exit_codes::OK)
}

fn cmd_normalize(paths: &[String]) -> Result<i32> {
    for path in paths {
        println!("{}", normalize_path(path));
    }
    Ok(exit_codes::OK)
}

fn cmd_validate_ui(paths: &ForgePaths, file: &Path) -> Result<i32> {
    let config = load(paths)?;
    let catalog_path = config.ui.catalog_path.as_deref().map(|p| paths.resolve(p));
    let catalog = load_catalog(catalog_path.as_deref())?;
    let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;

    let validation = validate_str(&text, &catalog);
    if validation.ok {
        println!("ok");
        return Ok(exit_codes::OK);
    }
    print!("{}", validation.diagnostic);
    Ok(exit_codes::INVALID)
}

fn cmd_ui(paths: &ForgePaths, prompt: &str) -> Result<i32> {
    let config = load(paths)?;
    let catalog_path = config.ui.catalog_path.as_deref().map(|p| paths.resolve(p));
    let catalog = load_catalog(catalog_path.as_deref())?;
    let pipeline = UiPipeline::from_config(&config, catalog);
    let service = CommandGenerator::new(config.generation.clone());

    let outcome = pipeline.run(&service, prompt)?;
    print_json(&outcome)?;
    Ok(if outcome.ok {
        exit_codes::OK
    } else {
        exit_codes::ESCALATED
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serialize json")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["forge", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_run_with_root() {
        let cli = Cli::parse_from([
            "forge", "run", "--project", "demo", "--prompt", "todo app", "--root", "/tmp/x",
        ]);
        match cli.command {
            Command::Run { project, prompt } => {
                assert_eq!(project, "demo");
                assert_eq!(prompt, "todo app");
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.root, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn parse_validate_ui() {
        let cli = Cli::parse_from(["forge", "validate-ui", "doc.json"]);
        assert!(matches!(cli.command, Command::ValidateUi { .. }));
    }

    #[test]
    fn normalize_requires_a_path() {
        assert!(Cli::try_parse_from(["forge", "normalize"]).is_err());
    }

    #[test]
    fn prompt_file_is_read() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("prompt.txt");
        fs::write(&path, "build a blog").expect("write");
        let arg = format!("@{}", path.display());
        assert_eq!(read_prompt(&arg).expect("read"), "build a blog");
        assert!(read_prompt("   ").is_err());
    }

    #[test]
    fn generation_failures_map_to_their_own_exit_code() {
        let err = anyhow::Error::new(GenerationServiceError::generic("down")).context("run");
        assert_eq!(exit_code_for(&err), exit_codes::GENERATION_FAILED);
        assert_eq!(exit_code_for(&anyhow::anyhow!("bad")), exit_codes::INVALID);
    }
}
