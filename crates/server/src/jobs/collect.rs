//! collect-logs: pull recent entries from each application node.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use logwarden_core::{LogEntry, LogLevel};

use super::{JobContext, JobError, JobReport};

/// One entry as served by a node's `/api/logs` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLog {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default, alias = "msg")]
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

impl RemoteLog {
    /// Unknown levels are stored as `info`; a missing timestamp means "now".
    pub fn into_entry(self, node: &str, now: DateTime<Utc>) -> LogEntry {
        let level = self
            .level
            .as_deref()
            .and_then(|l| l.parse().ok())
            .unwrap_or(LogLevel::Info);
        let source = self
            .source
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| node.to_string());
        let mut entry = LogEntry::new(self.timestamp.unwrap_or(now), level, self.message, source);
        entry.hostname = self.hostname;
        if let Some(metadata) = self.metadata {
            entry = entry.with_metadata(metadata);
        }
        entry
    }
}

async fn fetch(
    ctx: &JobContext,
    host: &str,
    since: DateTime<Utc>,
    timeout: Duration,
) -> Result<Vec<RemoteLog>, String> {
    let url = format!(
        "http://{}:{}/api/logs",
        host, ctx.config.sources.port
    );
    let request = ctx
        .http
        .get(&url)
        .query(&[("since", since.to_rfc3339())])
        .timeout(timeout)
        .send();

    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| format!("timed out after {}s", timeout.as_secs()))?
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }
    response.json().await.map_err(|e| e.to_string())
}

async fn collect_node(
    ctx: &JobContext,
    node: &'static str,
    host: Option<&str>,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Value {
    let Some(host) = host else {
        return json!({ "source": node, "error": "Host not configured" });
    };

    let logs = match fetch(ctx, host, since, ctx.config.sources.timeout()).await {
        Ok(logs) => logs,
        Err(error) => {
            warn!(source = node, %error, "log collection failed");
            return json!({ "source": node, "error": error });
        }
    };

    let collected = logs.len();
    let entries: Vec<LogEntry> = logs
        .into_iter()
        .map(|log| log.into_entry(node, now))
        .collect();
    match ctx.store.insert_logs(&entries).await {
        Ok(stored) => {
            info!(source = node, collected, stored, "logs collected");
            json!({ "source": node, "collected": collected, "stored": stored })
        }
        Err(e) => {
            warn!(source = node, error = %e, "storing collected logs failed");
            json!({ "source": node, "collected": collected, "stored": 0, "error": e.to_string() })
        }
    }
}

pub(super) async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<JobReport, JobError> {
    let since = now - chrono::Duration::minutes(ctx.config.sources.lookback_minutes);
    let nodes = ctx.config.sources.nodes();

    let results = futures::future::join_all(
        nodes
            .into_iter()
            .map(|(node, host)| collect_node(ctx, node, host, since, now)),
    )
    .await;

    Ok(JobReport::ok(json!({
        "timestamp": now.to_rfc3339(),
        "results": results,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 5, 0).unwrap()
    }

    #[test]
    fn remote_logs_default_source_and_level() {
        let log: RemoteLog = serde_json::from_value(json!({
            "level": "WARNING",
            "message": "slow query",
        }))
        .unwrap();
        let entry = log.into_entry("blue", now());
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.source, "blue");
        assert_eq!(entry.timestamp, now());
        assert!(!entry.analyzed);

        let log: RemoteLog = serde_json::from_value(json!({
            "timestamp": "2026-03-14T12:01:00Z",
            "level": "verbose",
            "msg": "hello",
            "source": "api",
            "hostname": "green-1",
        }))
        .unwrap();
        let entry = log.into_entry("green", now());
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.source, "api");
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.hostname.as_deref(), Some("green-1"));
    }

    #[tokio::test]
    async fn unconfigured_hosts_are_reported_per_source() {
        let (store, mut ctx) = testing::context();
        ctx.config.sources.blue_host = None;
        ctx.config.sources.green_host = None;

        let report = run(&ctx, now()).await.unwrap();

        assert!(report.success);
        let results = report.get("results").unwrap().as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], json!({ "source": "blue", "error": "Host not configured" }));
        assert_eq!(results[1]["source"], "green");
        assert_eq!(store.log_count().await, 0);
    }
}
