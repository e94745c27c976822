//! The monitoring jobs and the context they share.
//!
//! Every job returns a [`JobReport`]. Errors inside a job are caught at
//! [`JobContext::run`] and turned into `{success: false, error}`, so a
//! failing job never takes the tick or the HTTP handler down with it.

mod analyze;
mod cleanup;
mod collect;
mod detect;
mod digest;
mod e2e;
mod predict;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use logwarden_core::{Config, JobName};
use logwarden_llm::{IssueAnalyzer, LlmError};
use logwarden_notify::{
    Broadcaster, EmailNotifier, GithubIssueNotifier, NotifyError, TemplateRenderer,
    WebhookNotifier,
};
use logwarden_rules::{Reconciler, RulesError, RunnerResponse, Thresholds};
use logwarden_storage::{IssueStore, StorageError};

pub use collect::RemoteLog;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("rules error: {0}")]
    Rules(#[from] RulesError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Body returned by every job: `success` plus job-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub success: bool,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl JobReport {
    /// Successful report; `body` must be a JSON object; anything else is
    /// stored under `result`.
    pub fn ok(body: Value) -> Self {
        let body = match body {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self { success: true, body }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(error.to_string()));
        Self {
            success: false,
            body,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn status_code(&self) -> u16 {
        if self.success {
            200
        } else {
            500
        }
    }

    pub fn into_response(self) -> RunnerResponse {
        RunnerResponse {
            status_code: self.status_code(),
            body: serde_json::to_value(&self).unwrap_or(Value::Null),
        }
    }
}

/// Everything a job needs: the store, thresholds, AI and delivery channels.
pub struct JobContext {
    pub config: Config,
    pub store: Arc<dyn IssueStore>,
    pub reconciler: Reconciler,
    pub thresholds: Thresholds,
    pub analyzer: Option<IssueAnalyzer>,
    pub digest_channels: Broadcaster,
    pub github: Option<GithubIssueNotifier>,
    pub renderer: TemplateRenderer,
    pub http: reqwest::Client,
}

impl JobContext {
    /// Wire up the optional collaborators from config. Missing or broken
    /// channel configuration only disables that channel.
    pub fn from_config(
        config: Config,
        store: Arc<dyn IssueStore>,
        thresholds: Thresholds,
    ) -> Result<Self, JobError> {
        let analyzer = match IssueAnalyzer::from_config(&config.genai) {
            Ok(analyzer) => Some(analyzer),
            Err(LlmError::NotConfigured(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let mut digest_channels = Broadcaster::empty();
        if config.digest.email_configured() {
            match EmailNotifier::from_config(&config.digest) {
                Ok(email) => digest_channels.push(Box::new(email)),
                Err(e) => warn!(error = %e, "email channel disabled"),
            }
        }
        if let Some(url) = &config.digest.webhook_url {
            match WebhookNotifier::post(url) {
                Ok(webhook) => digest_channels.push(Box::new(webhook)),
                Err(e) => warn!(error = %e, "webhook channel disabled"),
            }
        }

        let github = if config.github.is_configured() {
            match GithubIssueNotifier::from_config(&config.github) {
                Ok(github) => Some(github),
                Err(e) => {
                    warn!(error = %e, "GitHub alerts disabled");
                    None
                }
            }
        } else {
            None
        };

        let http = reqwest::Client::builder()
            .timeout(config.sources.timeout())
            .build()?;

        Ok(Self {
            reconciler: Reconciler::new(store.clone()),
            config,
            store,
            thresholds,
            analyzer,
            digest_channels,
            github,
            renderer: TemplateRenderer::new(),
            http,
        })
    }

    /// Bare context around a store: no AI, no channels.
    pub fn new(config: Config, store: Arc<dyn IssueStore>, thresholds: Thresholds) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            config,
            store,
            thresholds,
            analyzer: None,
            digest_channels: Broadcaster::empty(),
            github: None,
            renderer: TemplateRenderer::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Run one job to completion. `payload` is only read by
    /// `analyze-e2e-results`.
    pub async fn run(&self, job: JobName, payload: Option<Value>, now: DateTime<Utc>) -> JobReport {
        info!(job = %job, "job started");
        let outcome = match job {
            JobName::CollectLogs => collect::run(self, now).await,
            JobName::AnalyzeLogs => analyze::run(self, now).await,
            JobName::DetectIssues => detect::run(self, now).await,
            JobName::PredictIssues => predict::run(self, now).await,
            JobName::SendDigest => digest::run(self, now).await,
            JobName::CleanupData => cleanup::run(self, now).await,
            JobName::AnalyzeE2eResults => e2e::run(self, payload, now).await,
        };
        match outcome {
            Ok(report) => {
                info!(job = %job, success = report.success, "job finished");
                report
            }
            Err(e) => {
                error!(job = %job, error = %e, "job failed");
                JobReport::failed(e)
            }
        }
    }
}

/// Shared handle used by runners and HTTP handlers.
pub type SharedJobs = Arc<JobContext>;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use logwarden_llm::{LlmProvider, Message};
    use logwarden_storage::MemoryStore;

    pub fn context() -> (Arc<MemoryStore>, JobContext) {
        let store = Arc::new(MemoryStore::new());
        let ctx = JobContext::new(Config::for_profile(""), store.clone(), Thresholds::default());
        (store, ctx)
    }

    /// Agent that answers once with a fixed reply, then with empty text.
    struct CannedAgent {
        reply: Mutex<Option<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmProvider for CannedAgent {
        async fn complete(
            &self,
            _messages: Vec<Message>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, LlmError> {
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    pub fn analyzer(reply: Result<String, LlmError>) -> IssueAnalyzer {
        IssueAnalyzer::new(
            Box::new(CannedAgent {
                reply: Mutex::new(Some(reply)),
            }),
            &Config::for_profile("").genai,
        )
    }
}
