use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("unknown issue status: {0}")]
    UnknownStatus(String),

    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
