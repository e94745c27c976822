//! analyze-e2e-results: triage a deployment verification report.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use logwarden_core::{Candidate, E2eFailure, E2eReport, LogEntry, LogLevel, Severity};
use logwarden_notify::E2eIssueContext;
use logwarden_rules::e2e::{
    extract_failures, fallback_candidate, issue_metadata, E2E_FAILURE, E2E_SOURCE,
};
use logwarden_rules::Lookback;

use super::{JobContext, JobError, JobReport};

const E2E_HOSTNAME: &str = "github-actions";

/// Accept the report itself or an invocation envelope whose `body` holds it,
/// either as an object or as a JSON string.
pub(crate) fn parse_report(payload: Option<Value>) -> Result<E2eReport, JobError> {
    let payload =
        payload.ok_or_else(|| JobError::InvalidPayload("E2E report body required".into()))?;
    let body = match payload.get("body") {
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| JobError::InvalidPayload(format!("body is not JSON: {e}")))?,
        Some(inner @ Value::Object(_)) => inner.clone(),
        _ => payload,
    };
    if !body.is_object() {
        return Err(JobError::InvalidPayload("E2E report must be an object".into()));
    }
    serde_json::from_value(body).map_err(|e| JobError::InvalidPayload(e.to_string()))
}

fn workflow_label(report: &E2eReport) -> String {
    match &report.workflow_run {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

fn record_entry(report: &E2eReport, now: DateTime<Utc>) -> LogEntry {
    let passed = report.passed();
    let mut metadata = report.context();
    metadata.insert(
        "results".into(),
        serde_json::to_value(&report.results).unwrap_or(Value::Null),
    );
    let mut entry = LogEntry::new(
        report.timestamp.unwrap_or(now),
        if passed { LogLevel::Info } else { LogLevel::Error },
        format!(
            "E2E verification {} for {} v{}",
            if passed { "passed" } else { "failed" },
            report.environment(),
            report.version()
        ),
        E2E_SOURCE,
    )
    .with_metadata(metadata);
    entry.hostname = Some(E2E_HOSTNAME.to_string());
    entry.analyzed = true;
    entry
}

async fn ai_candidates(
    ctx: &JobContext,
    report: &E2eReport,
    failures: &[E2eFailure],
    entry: &LogEntry,
) -> Vec<Candidate> {
    let Some(analyzer) = &ctx.analyzer else {
        return Vec::new();
    };
    let issues = match analyzer.analyze_e2e(report, failures).await {
        Ok(issues) => issues,
        Err(e) => {
            warn!(error = %e, "GenAI E2E analysis failed");
            return Vec::new();
        }
    };

    let default_title = format!("E2E failure in {}", report.environment());
    let metadata = issue_metadata(report, failures);
    issues
        .into_iter()
        .map(|issue| {
            let mut candidate = issue
                .into_candidate(E2E_FAILURE, Severity::High, &default_title, E2E_SOURCE)
                .affected_logs([entry.id]);
            for (key, value) in &metadata {
                candidate = candidate.meta(key.clone(), value.clone());
            }
            candidate
        })
        .collect()
}

async fn open_github_issue(
    ctx: &JobContext,
    report: &E2eReport,
    failures: &[E2eFailure],
    now: DateTime<Utc>,
) -> Option<u64> {
    let github = ctx.github.as_ref()?;
    let issue_ctx = E2eIssueContext {
        workflow_run: workflow_label(report),
        environment: report.environment().to_string(),
        version: report.version().to_string(),
        commit_sha: report.commit_sha.clone().unwrap_or_else(|| "unknown".into()),
        date: now.format("%Y-%m-%d").to_string(),
        time: now.to_rfc3339(),
        failures: failures.to_vec(),
        results_json: serde_json::to_string_pretty(&report.results).unwrap_or_default(),
    };

    let notification = match ctx.renderer.e2e_issue(&issue_ctx) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "rendering GitHub issue failed");
            return None;
        }
    };
    let labels: Vec<String> = notification
        .metadata
        .get("labels")
        .map(|l| l.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    match github
        .create_issue(&notification.subject, &notification.body, &labels)
        .await
    {
        Ok(created) => {
            info!(number = created.number, "E2E failure reported on GitHub");
            Some(created.number)
        }
        Err(e) => {
            warn!(error = %e, "creating GitHub issue failed");
            None
        }
    }
}

pub(super) async fn run(
    ctx: &JobContext,
    payload: Option<Value>,
    now: DateTime<Utc>,
) -> Result<JobReport, JobError> {
    let report = parse_report(payload)?;
    info!(
        workflow = %workflow_label(&report),
        environment = report.environment(),
        version = report.version(),
        passed = report.passed(),
        "E2E report received"
    );

    let entry = record_entry(&report, now);
    ctx.store.insert_logs(std::slice::from_ref(&entry)).await?;

    if report.passed() {
        return Ok(JobReport::ok(json!({
            "status": "passed",
            "issuesCreated": 0,
        })));
    }

    let failures = extract_failures(&report.results);
    info!(failures = failures.len(), "E2E failures extracted");
    if failures.is_empty() {
        return Ok(JobReport::ok(json!({
            "status": "failed",
            "issuesCreated": 0,
            "failures": 0,
        })));
    }

    let mut candidates = ai_candidates(ctx, &report, &failures, &entry).await;
    if candidates.is_empty() {
        candidates.extend(fallback_candidate(&report, &failures, entry.id));
    }
    let summary = ctx
        .reconciler
        .reconcile_all(&candidates, Lookback::Reactive, now)
        .await?;

    let github_issue = open_github_issue(ctx, &report, &failures, now).await;

    Ok(JobReport::ok(json!({
        "status": "failed",
        "issuesCreated": summary.created,
        "issuesUpdated": summary.updated,
        "failures": failures.len(),
        "githubIssue": github_issue,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logwarden_storage::IssueStore;

    use crate::jobs::testing;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 16, 42, 0).unwrap()
    }

    fn failing_payload() -> Value {
        json!({
            "workflowRun": 4821,
            "environment": "production",
            "version": "1.4.2",
            "commitSha": "9f2c1e0",
            "results": {
                "allPassed": false,
                "blueHealth": "up",
                "greenHealth": "down",
                "greenVersion": "1.4.1",
                "webhookStatus": false,
            }
        })
    }

    #[test]
    fn envelope_forms_are_accepted() {
        let direct = parse_report(Some(failing_payload())).unwrap();
        assert_eq!(direct.environment(), "production");

        let nested = parse_report(Some(json!({ "body": failing_payload() }))).unwrap();
        assert_eq!(nested.version(), "1.4.2");

        let raw = failing_payload().to_string();
        let stringly = parse_report(Some(json!({ "body": raw }))).unwrap();
        assert_eq!(stringly.commit_sha.as_deref(), Some("9f2c1e0"));

        assert!(parse_report(None).is_err());
        assert!(parse_report(Some(json!([1, 2]))).is_err());
        assert!(parse_report(Some(json!({ "body": "{not json" }))).is_err());
    }

    #[tokio::test]
    async fn passing_run_is_recorded_only() {
        let (store, ctx) = testing::context();
        let payload = json!({
            "environment": "staging",
            "version": "2.0.0",
            "results": { "allPassed": true }
        });

        let report = run(&ctx, Some(payload), now()).await.unwrap();

        assert_eq!(report.get("status"), Some(&json!("passed")));
        assert_eq!(store.issue_count().await, 0);
        let logs = store.unanalyzed(10).await.unwrap();
        assert!(logs.is_empty(), "E2E entries are stored as analyzed");
        assert_eq!(store.log_count().await, 1);
    }

    #[tokio::test]
    async fn failing_run_without_agent_uses_fallback_issue() {
        let (store, ctx) = testing::context();

        let report = run(&ctx, Some(failing_payload()), now()).await.unwrap();

        assert_eq!(report.get("status"), Some(&json!("failed")));
        assert_eq!(report.get("failures"), Some(&json!(2)));
        assert_eq!(report.get("issuesCreated"), Some(&json!(1)));
        assert_eq!(report.get("githubIssue"), Some(&Value::Null));

        let issues = store.issues().await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, "e2e-health-check-failure");
        assert_eq!(issues[0].title, "E2E verification failed: green-health");
        assert_eq!(issues[0].source, "e2e-verification");
        assert_eq!(issues[0].affected_logs.len(), 1);
        assert_eq!(issues[0].metadata.get("workflowRun"), Some(&json!(4821)));
    }

    #[tokio::test]
    async fn agent_issues_replace_fallback() {
        let (store, mut ctx) = testing::context();
        ctx.analyzer = Some(testing::analyzer(Ok(r#"{"issues": [
            {"type": "e2e-webhook-failure", "severity": "critical", "title": "Webhook down"},
            {"description": "green node never came up"}
        ]}"#
        .to_string())));

        let report = run(&ctx, Some(failing_payload()), now()).await.unwrap();

        assert_eq!(report.get("issuesCreated"), Some(&json!(2)));
        let mut types: Vec<String> = store.issues().await.into_iter().map(|i| i.issue_type).collect();
        types.sort();
        assert_eq!(types, vec!["e2e-failure", "e2e-webhook-failure"]);
    }

    #[tokio::test]
    async fn repeated_failure_within_the_hour_updates() {
        let (store, ctx) = testing::context();
        run(&ctx, Some(failing_payload()), now()).await.unwrap();
        let second = run(&ctx, Some(failing_payload()), now() + chrono::Duration::minutes(20))
            .await
            .unwrap();

        assert_eq!(second.get("issuesCreated"), Some(&json!(0)));
        assert_eq!(second.get("issuesUpdated"), Some(&json!(1)));
        assert_eq!(store.issues().await[0].occurrences(), 2);
        assert_eq!(store.log_count().await, 2);
    }
}
