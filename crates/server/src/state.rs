use std::path::PathBuf;
use std::sync::Arc;

use logwarden_core::Config;
use logwarden_rules::{CadenceTable, Dispatcher};
use logwarden_storage::IssueStore;

use crate::jobs::SharedJobs;

pub struct AppState {
    pub config: Config,
    pub jobs: SharedJobs,
    pub cadence: CadenceTable,
    pub dispatcher: Dispatcher,
    pub runbooks_dir: PathBuf,
}

impl AppState {
    pub fn store(&self) -> &Arc<dyn IssueStore> {
        &self.jobs.store
    }
}
