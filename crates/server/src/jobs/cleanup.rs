//! cleanup-data: retention for log entries and resolved issues.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use logwarden_core::config::RetentionConfig;

use super::{JobContext, JobError, JobReport};

pub(super) async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<JobReport, JobError> {
    let retention = RetentionConfig::current(&ctx.config.profile);
    purge(ctx, &retention, now).await
}

/// `now` minus `days`, or an error when the subtraction leaves chrono's range.
fn cutoff(now: DateTime<Utc>, days: u32, setting: &str) -> Result<DateTime<Utc>, JobError> {
    Duration::try_days(days.into())
        .and_then(|retention| now.checked_sub_signed(retention))
        .ok_or_else(|| JobError::InvalidConfig(format!("{setting}={days} is out of range")))
}

async fn purge(
    ctx: &JobContext,
    retention: &RetentionConfig,
    now: DateTime<Utc>,
) -> Result<JobReport, JobError> {
    let log_cutoff = cutoff(now, retention.log_days, "LOG_RETENTION_DAYS")?;
    let issue_cutoff = cutoff(now, retention.issue_days, "ISSUE_RETENTION_DAYS")?;

    let deleted_logs = ctx.store.delete_logs_before(log_cutoff).await?;
    let deleted_issues = ctx.store.delete_resolved_issues_before(issue_cutoff).await?;
    info!(deleted_logs, deleted_issues, "retention applied");

    Ok(JobReport::ok(json!({
        "deletedLogs": deleted_logs,
        "deletedIssues": deleted_issues,
        "retentionDays": {
            "logs": retention.log_days,
            "issues": retention.issue_days,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logwarden_core::{Candidate, LogEntry, LogLevel, Severity};
    use logwarden_rules::Lookback;
    use logwarden_storage::IssueStore;

    use crate::jobs::testing;

    #[tokio::test]
    async fn removes_expired_logs_and_old_resolved_issues() {
        let (store, ctx) = testing::context();
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 2, 0, 0).unwrap();
        store
            .insert_logs(&[
                LogEntry::new(now - Duration::days(31), LogLevel::Info, "old", "blue"),
                LogEntry::new(now - Duration::days(29), LogLevel::Info, "recent", "blue"),
            ])
            .await
            .unwrap();

        let stale = ctx
            .reconciler
            .reconcile(
                &Candidate::new("volume-spike", Severity::Medium, "Spike", "x"),
                Lookback::Predictive,
                now - Duration::days(120),
            )
            .await
            .unwrap();
        store
            .resolve_issue(stale.issue().id, now - Duration::days(91))
            .await
            .unwrap();
        ctx.reconciler
            .reconcile(
                &Candidate::new("issue-backlog", Severity::Low, "Backlog", "x"),
                Lookback::Predictive,
                now - Duration::days(200),
            )
            .await
            .unwrap();

        let retention = RetentionConfig::default();
        let report = purge(&ctx, &retention, now).await.unwrap();

        assert_eq!(report.get("deletedLogs"), Some(&json!(1)));
        assert_eq!(report.get("deletedIssues"), Some(&json!(1)));
        assert_eq!(
            report.get("retentionDays"),
            Some(&json!({ "logs": 30, "issues": 90 }))
        );
        assert_eq!(store.log_count().await, 1);
        // Open issues survive regardless of age.
        assert_eq!(store.issue_count().await, 1);
    }

    #[tokio::test]
    async fn unrepresentable_retention_fails_without_deleting() {
        let (store, ctx) = testing::context();
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 2, 0, 0).unwrap();
        store
            .insert_logs(&[LogEntry::new(now - Duration::days(400), LogLevel::Info, "old", "blue")])
            .await
            .unwrap();

        let retention = RetentionConfig {
            log_days: 200_000_000,
            issue_days: 90,
        };
        let err = purge(&ctx, &retention, now).await.unwrap_err();

        assert!(matches!(err, JobError::InvalidConfig(ref m) if m.contains("LOG_RETENTION_DAYS")));
        assert_eq!(store.log_count().await, 1);
    }
}
