//! Job runners: in-process, or over HTTP against another instance.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use logwarden_core::config::InvokerConfig;
use logwarden_core::JobName;
use logwarden_rules::{JobRunner, RunnerError, RunnerResponse};

use crate::jobs::SharedJobs;

/// Runs jobs inside this process against the shared job context.
pub struct LocalRunner {
    jobs: SharedJobs,
}

impl LocalRunner {
    pub fn new(jobs: SharedJobs) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl JobRunner for LocalRunner {
    fn name(&self) -> &str {
        "local"
    }

    async fn run(&self, job: JobName) -> Result<RunnerResponse, RunnerError> {
        Ok(self.jobs.run(job, None, Utc::now()).await.into_response())
    }
}

/// Invokes `POST {api_host}/{namespace}/{job}` with HTTP basic auth.
pub struct RemoteRunner {
    client: reqwest::Client,
    api_host: Option<String>,
    api_key: Option<String>,
    namespace: String,
    timeout: std::time::Duration,
}

impl RemoteRunner {
    pub fn from_config(config: &InvokerConfig) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RunnerError::Other(e.to_string()))?;
        Ok(Self {
            client,
            api_host: config
                .api_host
                .as_ref()
                .map(|h| h.trim_end_matches('/').to_string()),
            api_key: config.api_key.clone(),
            namespace: config.namespace.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn job_url(&self, job: JobName) -> Option<String> {
        self.api_host
            .as_ref()
            .map(|host| format!("{}/{}/{}", host, self.namespace, job))
    }
}

/// Split a `user:password` key; a key without a colon is a bare username.
fn basic_credentials(key: &str) -> (&str, Option<&str>) {
    match key.split_once(':') {
        Some((user, password)) => (user, Some(password)),
        None => (key, None),
    }
}

#[async_trait]
impl JobRunner for RemoteRunner {
    fn name(&self) -> &str {
        "remote"
    }

    async fn run(&self, job: JobName) -> Result<RunnerResponse, RunnerError> {
        let (Some(url), Some(key)) = (self.job_url(job), self.api_key.as_deref()) else {
            return Err(RunnerError::NotConfigured("no credentials".into()));
        };
        let (user, password) = basic_credentials(key);

        let response = self
            .client
            .post(&url)
            .basic_auth(user, password)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RunnerError::Timeout(self.timeout)
                } else {
                    RunnerError::Transport(e.to_string())
                }
            })?;

        let status_code = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RunnerError::Transport(e.to_string()))?;
        debug!(job = %job, status_code, "remote invocation answered");

        // A remote instance answers with `{statusCode, body}`; unwrap it.
        let body = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Object(mut map)) if map.contains_key("body") => {
                map.remove("body").unwrap_or_default()
            }
            Ok(value) => value,
            Err(_) => serde_json::json!({ "raw": text }),
        };
        Ok(RunnerResponse { status_code, body })
    }
}
