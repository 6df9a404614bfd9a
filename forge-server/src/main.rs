//! forge-server: starts runs over HTTP and streams their progress.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use forge::io::config::load_config;
use forge::io::durable::LocalDurableStore;
use forge::io::generation::CommandGenerator;
use forge::io::init::ForgePaths;
use forge::io::run_log::RunPaths;
use forge::ui_pipeline::load_catalog;
use tracing::info;

use crate::state::{AppState, ServiceFactory, SharedService};

#[derive(Parser)]
#[command(name = "forge-server")]
#[command(about = "HTTP server for forge runs")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Project root (contains .forge/)
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("forge_server=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let root = args.root.canonicalize().unwrap_or(args.root);
    info!(root = %root.display(), "starting forge-server");

    let paths = ForgePaths::new(&root);
    let config = load_config(&paths.config_path)?;
    let catalog_path = config.ui.catalog_path.as_deref().map(|p| paths.resolve(p));
    let catalog = load_catalog(catalog_path.as_deref())?;
    let durable = Arc::new(LocalDurableStore::new(paths.resolve(&config.store.root)));

    let generation = config.generation.clone();
    let services: ServiceFactory = Arc::new(move |run: &RunPaths| -> SharedService {
        Arc::new(CommandGenerator::new(generation.clone()).with_stream_dir(run.stream_dir.clone()))
    });

    let state = AppState::new(root, config, catalog, durable, services);
    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
