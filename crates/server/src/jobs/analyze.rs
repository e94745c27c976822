//! analyze-logs: hand the oldest unanalyzed entries to the AI agent.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use logwarden_core::{JobName, LogId, Severity};
use logwarden_rules::Lookback;

use super::{JobContext, JobError, JobReport};

const AI_DEFAULT_TYPE: &str = "ai-detected";
const AI_DEFAULT_TITLE: &str = "AI-detected issue";

pub(super) async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<JobReport, JobError> {
    let batch = ctx.config.scheduler.analysis_batch;
    let entries = ctx.store.unanalyzed(batch).await?;
    if entries.is_empty() {
        return Ok(JobReport::ok(json!({ "analyzed": 0, "issuesDetected": 0 })));
    }

    let Some(analyzer) = &ctx.analyzer else {
        info!(pending = entries.len(), "GenAI agent not configured, skipping analysis");
        return Ok(JobReport::ok(json!({
            "analyzed": 0,
            "issuesDetected": 0,
            "skipped": true,
            "reason": "GENAI_AGENT_URL not set",
        })));
    };

    // Entries stay unanalyzed when the agent never answered.
    let issues = match analyzer.analyze_logs(&entries).await {
        Ok(issues) => issues,
        Err(e) => {
            warn!(error = %e, pending = entries.len(), "GenAI analysis failed");
            return Ok(JobReport::ok(json!({
                "analyzed": 0,
                "issuesDetected": 0,
                "aiError": e.to_string(),
            })));
        }
    };

    let ids: Vec<LogId> = entries.iter().map(|e| e.id).collect();
    let candidates: Vec<_> = issues
        .into_iter()
        .map(|issue| {
            issue
                .into_candidate(
                    AI_DEFAULT_TYPE,
                    Severity::Medium,
                    AI_DEFAULT_TITLE,
                    JobName::AnalyzeLogs.as_str(),
                )
                .affected_logs(ids.iter().copied())
        })
        .collect();

    let summary = ctx
        .reconciler
        .reconcile_all(&candidates, Lookback::Reactive, now)
        .await?;
    let analyzed = ctx.store.mark_analyzed(&ids).await?;

    Ok(JobReport::ok(json!({
        "analyzed": analyzed,
        "issuesDetected": candidates.len(),
        "created": summary.created,
        "updated": summary.updated,
    })))
}
