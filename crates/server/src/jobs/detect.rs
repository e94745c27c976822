//! detect-issues: threshold rules over the last window.

use chrono::{DateTime, Utc};
use serde_json::json;

use logwarden_rules::detect::evaluate_reactive;
use logwarden_rules::thresholds::percent;
use logwarden_rules::Lookback;

use super::{JobContext, JobError, JobReport};

pub(super) async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<JobReport, JobError> {
    let report = evaluate_reactive(ctx.store.as_ref(), now, &ctx.thresholds).await?;
    let summary = ctx
        .reconciler
        .reconcile_all(&report.candidates, Lookback::Reactive, now)
        .await?;

    Ok(JobReport::ok(json!({
        "issuesDetected": report.candidates.len(),
        "errorRate": percent(report.stats.error_rate()),
        "logsAnalyzed": report.stats.total,
        "created": summary.created,
        "updated": summary.updated,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use logwarden_core::{LogEntry, LogLevel};
    use logwarden_storage::IssueStore;

    use crate::jobs::testing;

    #[tokio::test]
    async fn repeated_runs_update_instead_of_duplicating() {
        let (store, ctx) = testing::context();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 12, 5, 0).unwrap();
        let mut logs: Vec<LogEntry> = (0..18)
            .map(|_| LogEntry::new(t0 - Duration::minutes(1), LogLevel::Info, "ok", "blue"))
            .collect();
        logs.extend(
            (0..2).map(|_| LogEntry::new(t0 - Duration::minutes(1), LogLevel::Error, "boom", "blue")),
        );
        store.insert_logs(&logs).await.unwrap();

        let first = run(&ctx, t0).await.unwrap();
        assert_eq!(first.get("issuesDetected"), Some(&json!(1)));
        assert_eq!(first.get("errorRate"), Some(&json!("10.00%")));
        assert_eq!(first.get("created"), Some(&json!(1)));

        let second = run(&ctx, t0 + Duration::minutes(10)).await.unwrap();
        assert_eq!(second.get("created"), Some(&json!(0)));
        assert_eq!(second.get("updated"), Some(&json!(1)));

        let issues = store.issues().await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, "high-error-rate");
        assert_eq!(issues[0].occurrences(), 2);
    }
}
