//! predict-issues: trend, volume and backlog rules over hourly buckets.

use chrono::{DateTime, Utc};
use serde_json::json;

use logwarden_rules::detect::evaluate_predictive;
use logwarden_rules::Lookback;

use super::{JobContext, JobError, JobReport};

pub(super) async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<JobReport, JobError> {
    let report = evaluate_predictive(ctx.store.as_ref(), now, &ctx.thresholds).await?;
    let summary = ctx
        .reconciler
        .reconcile_all(&report.candidates, Lookback::Predictive, now)
        .await?;

    Ok(JobReport::ok(json!({
        "predictions": report.candidates.len(),
        "logsAnalyzed": report.logs_analyzed(),
        "openIssues": report.open_issues,
        "created": summary.created,
        "updated": summary.updated,
    })))
}
