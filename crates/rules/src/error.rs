use logwarden_core::JobName;

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("invalid cron expression '{expr}' for {job}: {reason}")]
    InvalidCron {
        job: JobName,
        expr: String,
        reason: String,
    },

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("failed to read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rules file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("storage error: {0}")]
    Storage(#[from] logwarden_storage::StorageError),
}
