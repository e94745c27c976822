//! Server startup: store, job context, cadence and dispatcher wiring.

use std::sync::Arc;

use tracing::{info, warn};

use logwarden_core::Config;
use logwarden_rules::{CadenceTable, Dispatcher, JobRunner, Thresholds};
use logwarden_storage::{open_store, IssueStore};

use crate::jobs::JobContext;
use crate::runners::{LocalRunner, RemoteRunner};
use crate::state::AppState;

/// Connect the store and build the shared state from config.
pub async fn build_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = open_store(&config.postgres).await?;
    info!(backend = store.backend_name(), "issue store ready");
    assemble(config, store)
}

/// Build the shared state around an already opened store.
pub fn assemble(config: Config, store: Arc<dyn IssueStore>) -> anyhow::Result<Arc<AppState>> {
    let thresholds = Thresholds::load_or_default(config.server.rules_file.as_deref())?;
    let offset = config.scheduler.offset()?;
    let cadence = CadenceTable::standard(offset)?;

    let jobs = Arc::new(JobContext::from_config(config.clone(), store, thresholds)?);
    if jobs.analyzer.is_none() {
        warn!("GENAI_AGENT_URL not set; analyze-logs will skip and E2E issues use the fallback");
    }

    let runner: Arc<dyn JobRunner> = if config.invoker.is_remote() {
        Arc::new(RemoteRunner::from_config(&config.invoker)?)
    } else {
        Arc::new(LocalRunner::new(jobs.clone()))
    };
    info!(runner = runner.name(), "job runner selected");

    Ok(Arc::new(AppState {
        runbooks_dir: config.server.runbooks_dir.clone(),
        config,
        jobs,
        cadence,
        dispatcher: Dispatcher::new(runner),
    }))
}
