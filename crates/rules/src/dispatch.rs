//! Runs the jobs a tick selected, one after another.
//!
//! A job failure is recorded in that job's [`JobResult`] and never stops the
//! remaining jobs. There is no retry within a tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use logwarden_core::JobName;

use crate::cadence::CadenceTable;

/// What a runner got back from a job invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl RunnerResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Missing credentials or endpoint. The job is skipped, not failed.
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

/// Executes one job, locally or by invoking a remote function.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Short name for logs ("local", "remote").
    fn name(&self) -> &str;

    async fn run(&self, job: JobName) -> Result<RunnerResponse, RunnerError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Invoked {
        code: u16,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        error: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(rename = "function")]
    pub job: JobName,
    #[serde(flatten)]
    pub status: JobStatus,
    pub elapsed_ms: u64,
}

impl JobResult {
    pub fn is_invoked(&self) -> bool {
        matches!(self.status, JobStatus::Invoked { .. })
    }
}

/// Response of one scheduler tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub invoked: Vec<JobResult>,
}

pub struct Dispatcher {
    runner: Arc<dyn JobRunner>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self { runner }
    }

    pub fn runner_name(&self) -> &str {
        self.runner.name()
    }

    /// Run `jobs` sequentially in the given order.
    pub async fn dispatch(&self, jobs: &[JobName]) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(jobs.len());
        for &job in jobs {
            results.push(self.dispatch_one(job).await);
        }
        results
    }

    pub async fn dispatch_one(&self, job: JobName) -> JobResult {
        let start = Instant::now();
        let outcome = self.runner.run(job).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let status = match outcome {
            Ok(resp) if resp.is_success() => {
                info!(job = %job, code = resp.status_code, elapsed_ms, "job invoked");
                JobStatus::Invoked {
                    code: resp.status_code,
                }
            }
            Ok(resp) => {
                warn!(job = %job, code = resp.status_code, elapsed_ms, "job returned error status");
                let error = resp
                    .body
                    .get("error")
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}", resp.status_code));
                JobStatus::Error {
                    code: Some(resp.status_code),
                    error,
                }
            }
            Err(RunnerError::NotConfigured(reason)) => {
                info!(job = %job, %reason, "skipping job");
                JobStatus::Skipped { reason }
            }
            Err(e) => {
                warn!(job = %job, error = %e, elapsed_ms, "job invocation failed");
                JobStatus::Error {
                    code: None,
                    error: e.to_string(),
                }
            }
        };

        JobResult {
            job,
            status,
            elapsed_ms,
        }
    }

    /// Select the jobs due at `now` and run them.
    pub async fn tick(&self, table: &CadenceTable, now: DateTime<Utc>) -> TickSummary {
        let due = table.due(now);
        info!(
            at = %now.to_rfc3339(),
            due = ?due.iter().map(JobName::as_str).collect::<Vec<_>>(),
            runner = self.runner.name(),
            "scheduler tick"
        );
        TickSummary {
            success: true,
            timestamp: now,
            invoked: self.dispatch(&due).await,
        }
    }
}
