//! send-digest: daily summary of the last 24 hours.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use logwarden_core::IssueStatus;
use logwarden_notify::templating::{DigestIssueLine, DigestSummary};
use logwarden_notify::DigestContext;

use logwarden_rules::thresholds::percent;
use super::{JobContext, JobError, JobReport};

/// Open issues listed in the digest body.
const DIGEST_ISSUE_LINES: usize = 10;

pub(super) async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<JobReport, JobError> {
    let since = now - Duration::hours(24);
    let stats = ctx.store.digest_stats(since).await?;
    let open = ctx
        .store
        .list_issues(Some(IssueStatus::Open), DIGEST_ISSUE_LINES)
        .await?;

    let digest = DigestContext {
        date: now.format("%Y-%m-%d").to_string(),
        summary: DigestSummary {
            total_logs: stats.total_logs,
            error_logs: stats.error_logs,
            error_rate: percent(stats.error_rate()),
            open_issues: stats.open_issues,
            resolved_issues: stats.resolved_issues,
        },
        open_issues: open
            .iter()
            .map(|issue| DigestIssueLine {
                severity: issue.severity.as_str().to_string(),
                title: issue.title.clone(),
                occurrences: issue.occurrences(),
            })
            .collect(),
    };

    let notification = ctx.renderer.digest(&digest)?;
    info!(subject = %notification.subject, "daily digest\n{}", notification.body);

    let deliveries = ctx.digest_channels.deliver(&notification).await;
    for failed in deliveries.iter().filter(|d| !d.success) {
        warn!(
            channel = %failed.channel,
            error = failed.error.as_deref().unwrap_or("unknown"),
            "digest delivery failed"
        );
    }

    Ok(JobReport::ok(json!({
        "digest": {
            "date": digest.date,
            "summary": digest.summary,
        },
        "deliveries": deliveries,
    })))
}
