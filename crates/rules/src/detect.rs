//! Gathers the statistics each rule needs from the store and runs the rules.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use logwarden_core::{Candidate, ErrorStats, JobName};
use logwarden_storage::IssueStore;

use crate::error::RulesError;
use crate::thresholds::{self, Thresholds, REPEATED_ERROR_LEVELS};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactiveReport {
    pub stats: ErrorStats,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveReport {
    /// Oldest-first hourly buckets ending at `now`.
    pub hourly: Vec<ErrorStats>,
    pub open_issues: u64,
    pub candidates: Vec<Candidate>,
}

impl PredictiveReport {
    pub fn logs_analyzed(&self) -> u64 {
        self.hourly.iter().map(|h| h.total).sum()
    }
}

/// Error rate, repeated errors, memory and connection rules over the
/// trailing window.
pub async fn evaluate_reactive(
    store: &dyn IssueStore,
    now: DateTime<Utc>,
    t: &Thresholds,
) -> Result<ReactiveReport, RulesError> {
    t.validate()?;
    let since = t.window_start(now)?;
    let source = JobName::DetectIssues.as_str();

    let stats = store.error_stats(since, now).await?;
    let groups = store
        .repeated_messages(
            since,
            &REPEATED_ERROR_LEVELS,
            t.repeated_error_count,
            t.repeated_error_max_groups,
        )
        .await?;
    let memory = store.count_matching(since, &thresholds::memory_filter()).await?;
    let connections = store
        .count_matching(since, &thresholds::connection_filter())
        .await?;
    debug!(
        total = stats.total,
        errors = stats.errors,
        repeated_groups = groups.len(),
        memory,
        connections,
        "reactive statistics"
    );

    let mut candidates = Vec::new();
    candidates.extend(thresholds::high_error_rate(&stats, t));
    candidates.extend(thresholds::repeated_errors(&groups, t));
    candidates.extend(thresholds::memory_warning(memory, t));
    candidates.extend(thresholds::connection_failure(connections, t));

    Ok(ReactiveReport {
        stats,
        candidates: candidates.into_iter().map(|c| c.source(source)).collect(),
    })
}

/// Trend, volume spike and backlog rules over trailing hourly buckets.
pub async fn evaluate_predictive(
    store: &dyn IssueStore,
    now: DateTime<Utc>,
    t: &Thresholds,
) -> Result<PredictiveReport, RulesError> {
    t.validate()?;
    let hours = (t.trend_bucket_hours * 2).max(t.spike_baseline_hours + 1);
    let source = JobName::PredictIssues.as_str();
    let out_of_range = || RulesError::InvalidThresholds(format!("{hours} hourly buckets before {now}"));

    let mut hourly = Vec::with_capacity(hours);
    for back in (0..hours as i64).rev() {
        let to = now
            .checked_sub_signed(Duration::hours(back))
            .ok_or_else(out_of_range)?;
        let from = to
            .checked_sub_signed(Duration::hours(1))
            .ok_or_else(out_of_range)?;
        hourly.push(store.error_stats(from, to).await?);
    }
    let open_issues = store.count_open_issues().await?;

    let (current, earlier) = match hourly.split_last() {
        Some((current, earlier)) => (current.total, earlier),
        None => (0, &[][..]),
    };
    let baseline: Vec<u64> = earlier
        .iter()
        .rev()
        .take(t.spike_baseline_hours)
        .map(|h| h.total)
        .collect();

    let mut candidates = Vec::new();
    candidates.extend(thresholds::error_rate_trend(&hourly, t));
    candidates.extend(thresholds::volume_spike(current, &baseline, t));
    candidates.extend(thresholds::issue_backlog(open_issues, t));

    Ok(PredictiveReport {
        hourly,
        open_issues,
        candidates: candidates.into_iter().map(|c| c.source(source)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logwarden_core::{LogEntry, LogLevel};
    use logwarden_storage::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn entries(n: usize, level: LogLevel, message: &str, minutes_ago: i64) -> Vec<LogEntry> {
        (0..n)
            .map(|_| LogEntry::new(now() - Duration::minutes(minutes_ago), level, message, "blue"))
            .collect()
    }

    #[tokio::test]
    async fn reactive_rules_fire_from_stored_logs() {
        let store = MemoryStore::new();
        let mut logs = entries(14, LogLevel::Info, "ok", 3);
        logs.extend(entries(6, LogLevel::Error, "connect ECONNREFUSED db:5432", 2));
        logs.extend(entries(4, LogLevel::Warn, "Memory usage at 93%", 1));
        // Outside the window.
        logs.extend(entries(50, LogLevel::Error, "old failure", 30));
        store.insert_logs(&logs).await.unwrap();

        let report = evaluate_reactive(&store, now(), &Thresholds::default())
            .await
            .unwrap();

        assert_eq!(report.stats, ErrorStats { total: 24, errors: 6 });
        let types: Vec<&str> = report.candidates.iter().map(|c| c.issue_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["high-error-rate", "repeated-error", "memory-warning", "connection-failure"]
        );
        assert!(report.candidates.iter().all(|c| c.source == "detect-issues"));
    }

    #[tokio::test]
    async fn quiet_window_produces_nothing() {
        let store = MemoryStore::new();
        store
            .insert_logs(&entries(40, LogLevel::Info, "ok", 5))
            .await
            .unwrap();
        let report = evaluate_reactive(&store, now(), &Thresholds::default())
            .await
            .unwrap();
        assert!(report.candidates.is_empty());
    }

    #[tokio::test]
    async fn repeated_error_groups_only_error_and_fatal_entries() {
        let store = MemoryStore::new();
        let mut logs = entries(8, LogLevel::Info, "cache miss", 2);
        logs.extend(entries(8, LogLevel::Warn, "slow query", 2));
        logs.extend(entries(6, LogLevel::Fatal, "worker crashed", 1));
        store.insert_logs(&logs).await.unwrap();

        let report = evaluate_reactive(&store, now(), &Thresholds::default())
            .await
            .unwrap();

        let repeated: Vec<&Candidate> = report
            .candidates
            .iter()
            .filter(|c| c.issue_type == "repeated-error")
            .collect();
        assert_eq!(repeated.len(), 1);
        assert_eq!(repeated[0].fingerprint.as_deref(), Some("worker crashed"));
    }

    #[tokio::test]
    async fn out_of_range_thresholds_are_errors() {
        let store = MemoryStore::new();
        let huge_window = Thresholds {
            window_minutes: 10_000_000_000_000,
            ..Thresholds::default()
        };
        assert!(matches!(
            evaluate_reactive(&store, now(), &huge_window).await,
            Err(RulesError::InvalidThresholds(_))
        ));

        let huge_buckets = Thresholds {
            trend_bucket_hours: usize::MAX / 4,
            ..Thresholds::default()
        };
        assert!(matches!(
            evaluate_predictive(&store, now(), &huge_buckets).await,
            Err(RulesError::InvalidThresholds(_))
        ));
    }

    #[tokio::test]
    async fn predictive_rules_see_hourly_buckets() {
        let store = MemoryStore::new();
        let mut logs = Vec::new();
        // Five quiet hours, then a noisy one.
        for h in 1..=5 {
            logs.extend(entries(20, LogLevel::Info, "ok", h * 60 + 10));
        }
        logs.extend(entries(150, LogLevel::Info, "ok", 10));
        store.insert_logs(&logs).await.unwrap();

        let report = evaluate_predictive(&store, now(), &Thresholds::default())
            .await
            .unwrap();

        assert_eq!(report.hourly.len(), 6);
        assert_eq!(report.hourly.last().unwrap().total, 150);
        assert_eq!(report.logs_analyzed(), 250);
        let types: Vec<&str> = report.candidates.iter().map(|c| c.issue_type.as_str()).collect();
        assert_eq!(types, vec!["volume-spike"]);
        assert_eq!(report.candidates[0].source, "predict-issues");
    }
}
