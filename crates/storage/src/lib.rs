//! Persistence for collected log entries and detected issues.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

use std::sync::Arc;

use tracing::{info, warn};

use logwarden_core::config::PostgresConfig;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{DigestStats, IssueStore};

/// Pick the store for this process: PostgreSQL when configured, otherwise an
/// in-process store that forgets everything on exit.
pub async fn open_store(config: &PostgresConfig) -> Result<Arc<dyn IssueStore>, StorageError> {
    if config.is_configured() {
        let store = PgStore::connect(config).await?;
        Ok(Arc::new(store))
    } else {
        warn!("PostgreSQL not configured; using in-memory store");
        let store = MemoryStore::new();
        info!(backend = store.backend_name(), "store ready");
        Ok(Arc::new(store))
    }
}
