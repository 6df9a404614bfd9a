//! Shared application state for the run server.

use std::path::PathBuf;
use std::sync::Arc;

use forge::core::ui_schema::ComponentCatalog;
use forge::io::config::ForgeConfig;
use forge::io::durable::DurableStore;
use forge::io::events::{EventSink, RunEvent, RunEventRecord};
use forge::io::generation::GenerationService;
use forge::io::run_log::RunPaths;
use forge::registry::RunRegistry;
use tokio::sync::broadcast;

pub type SharedService = Arc<dyn GenerationService + Send + Sync>;

/// Builds the generation backend for one run.
pub type ServiceFactory = Arc<dyn Fn(&RunPaths) -> SharedService + Send + Sync>;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Project root holding `.forge/`.
    pub root: PathBuf,
    pub config: Arc<ForgeConfig>,
    pub catalog: Arc<ComponentCatalog>,
    pub durable: Arc<dyn DurableStore>,
    pub registry: RunRegistry,
    pub services: ServiceFactory,
    /// Run events for attached SSE clients.
    pub event_tx: Arc<broadcast::Sender<RunEventRecord>>,
}

impl AppState {
    pub fn new(
        root: PathBuf,
        config: ForgeConfig,
        catalog: ComponentCatalog,
        durable: Arc<dyn DurableStore>,
        services: ServiceFactory,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            root,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            durable,
            registry: RunRegistry::new(),
            services,
            event_tx: Arc::new(event_tx),
        }
    }

    pub fn sink(&self) -> BroadcastSink {
        BroadcastSink {
            tx: Arc::clone(&self.event_tx),
        }
    }
}

/// Forwards run events to whoever is subscribed right now.
pub struct BroadcastSink {
    tx: Arc<broadcast::Sender<RunEventRecord>>,
}

impl EventSink for BroadcastSink {
    fn emit(&self, run_id: &str, event: &RunEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(RunEventRecord::new(run_id, event));
    }
}
