//! Threshold rules that turn log statistics into candidate issues.
//!
//! Every rule here is a pure function of counts the store already computed;
//! the store queries live in [`crate::detect`].

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use logwarden_core::{Candidate, ErrorStats, LogLevel, MessageFilter, MessageGroup, Severity};

use crate::error::RulesError;

pub const HIGH_ERROR_RATE: &str = "high-error-rate";
pub const REPEATED_ERROR: &str = "repeated-error";
pub const MEMORY_WARNING: &str = "memory-warning";
pub const CONNECTION_FAILURE: &str = "connection-failure";
pub const ERROR_RATE_TREND: &str = "error-rate-trend";
pub const VOLUME_SPIKE: &str = "volume-spike";
pub const ISSUE_BACKLOG: &str = "issue-backlog";

/// Longest message prefix used in a repeated-error title.
const TITLE_MESSAGE_CHARS: usize = 80;

/// Largest reactive window a rules file may ask for (one day).
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;

/// Largest trend bucket or spike baseline, in hours (one week).
pub const MAX_BUCKET_HOURS: usize = 24 * 7;

/// Tunable limits. All comparisons are strict (`>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Window for the reactive rules.
    pub window_minutes: i64,
    pub error_rate: f64,
    pub error_rate_min_total: u64,
    pub repeated_error_count: u64,
    pub repeated_error_max_groups: usize,
    pub memory_warning_count: u64,
    pub connection_failure_count: u64,
    /// Hourly buckets on each side of the trend comparison.
    pub trend_bucket_hours: usize,
    pub trend_ratio: f64,
    pub trend_min_rate: f64,
    /// Hours averaged for the volume baseline.
    pub spike_baseline_hours: usize,
    pub spike_ratio: f64,
    pub spike_min_volume: u64,
    pub backlog_open_issues: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            error_rate: 0.05,
            error_rate_min_total: 10,
            repeated_error_count: 5,
            repeated_error_max_groups: 5,
            memory_warning_count: 3,
            connection_failure_count: 0,
            trend_bucket_hours: 3,
            trend_ratio: 1.5,
            trend_min_rate: 0.02,
            spike_baseline_hours: 5,
            spike_ratio: 2.0,
            spike_min_volume: 100,
            backlog_open_issues: 10,
        }
    }
}

impl Thresholds {
    /// Load overrides from YAML; keys left out keep their defaults.
    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let raw = std::fs::read_to_string(path)?;
        let thresholds: Thresholds = serde_yaml::from_str(&raw)?;
        thresholds.validate()?;
        info!(path = %path.display(), "loaded threshold overrides");
        Ok(thresholds)
    }

    /// Defaults, or the YAML at `path` when one is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, RulesError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), RulesError> {
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.window_minutes) {
            return Err(RulesError::InvalidThresholds(format!(
                "window_minutes must be between 1 and {MAX_WINDOW_MINUTES}, got {}",
                self.window_minutes
            )));
        }
        if !(0.0..=1.0).contains(&self.error_rate) || !(0.0..=1.0).contains(&self.trend_min_rate) {
            return Err(RulesError::InvalidThresholds(
                "rates are fractions between 0 and 1".into(),
            ));
        }
        let hours = 1..=MAX_BUCKET_HOURS;
        if !hours.contains(&self.trend_bucket_hours) || !hours.contains(&self.spike_baseline_hours) {
            return Err(RulesError::InvalidThresholds(format!(
                "trend_bucket_hours and spike_baseline_hours must be between 1 and {MAX_BUCKET_HOURS}"
            )));
        }
        if self.trend_ratio <= 0.0 || self.spike_ratio <= 0.0 {
            return Err(RulesError::InvalidThresholds("ratios must be positive".into()));
        }
        Ok(())
    }

    /// Start of the reactive window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, RulesError> {
        chrono::Duration::try_minutes(self.window_minutes)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                RulesError::InvalidThresholds(format!(
                    "window_minutes {} is out of range",
                    self.window_minutes
                ))
            })
    }
}

/// `0.0417` -> `"4.17%"`.
pub fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn truncate(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        message.to_string()
    } else {
        let cut: String = message.chars().take(max).collect();
        format!("{cut}…")
    }
}

// ── Reactive rules ────────────────────────────────────────────

pub fn high_error_rate(stats: &ErrorStats, t: &Thresholds) -> Option<Candidate> {
    let rate = stats.error_rate();
    if rate <= t.error_rate || stats.total <= t.error_rate_min_total {
        return None;
    }
    Some(
        Candidate::new(
            HIGH_ERROR_RATE,
            Severity::High,
            "High error rate detected",
            format!(
                "{} of {} log entries in the last {} minutes were errors ({})",
                stats.errors,
                stats.total,
                t.window_minutes,
                percent(rate)
            ),
        )
        .recommendation("Check recent deployments and the repeated-error issues for the dominant failure.")
        .meta("errorRate", rate)
        .meta("errors", stats.errors)
        .meta("total", stats.total),
    )
}

/// Messages seen more than the limit, largest groups first, ties by message.
pub fn repeated_errors(groups: &[MessageGroup], t: &Thresholds) -> Vec<Candidate> {
    let mut hits: Vec<&MessageGroup> = groups
        .iter()
        .filter(|g| g.count > t.repeated_error_count)
        .collect();
    hits.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    hits.truncate(t.repeated_error_max_groups);

    hits.into_iter()
        .map(|g| {
            Candidate::new(
                REPEATED_ERROR,
                Severity::Medium,
                format!("Repeated error: {}", truncate(&g.message, TITLE_MESSAGE_CHARS)),
                format!(
                    "The same error was logged {} times in the last {} minutes",
                    g.count, t.window_minutes
                ),
            )
            .fingerprint(g.message.clone())
            .meta("message", g.message.clone())
            .meta("count", g.count)
        })
        .collect()
}

/// Levels considered by the repeated-error rule.
pub const REPEATED_ERROR_LEVELS: [LogLevel; 2] = [LogLevel::Error, LogLevel::Fatal];

pub fn memory_filter() -> MessageFilter {
    MessageFilter {
        levels: vec![LogLevel::Warn, LogLevel::Error],
        needles: vec!["memory".to_string()],
        case_insensitive: true,
    }
}

pub fn memory_warning(count: u64, t: &Thresholds) -> Option<Candidate> {
    (count > t.memory_warning_count).then(|| {
        Candidate::new(
            MEMORY_WARNING,
            Severity::Medium,
            "Memory pressure warnings",
            format!(
                "{count} warnings or errors mentioning memory in the last {} minutes",
                t.window_minutes
            ),
        )
        .recommendation("Inspect heap usage on both nodes and look for leaks or oversized caches.")
        .meta("count", count)
    })
}

pub fn connection_filter() -> MessageFilter {
    MessageFilter {
        levels: Vec::new(),
        needles: vec!["ECONNREFUSED".to_string(), "ETIMEDOUT".to_string()],
        case_insensitive: false,
    }
}

pub fn connection_failure(count: u64, t: &Thresholds) -> Option<Candidate> {
    (count > t.connection_failure_count).then(|| {
        Candidate::new(
            CONNECTION_FAILURE,
            Severity::High,
            "Connection failures detected",
            format!(
                "{count} refused or timed-out connections in the last {} minutes",
                t.window_minutes
            ),
        )
        .recommendation("Verify the database and upstream services are reachable from both nodes.")
        .meta("count", count)
    })
}

// ── Predictive rules ──────────────────────────────────────────

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// `hourly` holds oldest-first hourly buckets; the newest
/// `trend_bucket_hours` are compared with the ones before them.
pub fn error_rate_trend(hourly: &[ErrorStats], t: &Thresholds) -> Option<Candidate> {
    let span = t.trend_bucket_hours;
    if hourly.len() < span * 2 {
        return None;
    }
    let tail = &hourly[hourly.len() - span * 2..];
    let (older, recent) = tail.split_at(span);
    let older_rate = mean(older.iter().map(ErrorStats::error_rate));
    let recent_rate = mean(recent.iter().map(ErrorStats::error_rate));

    if recent_rate <= older_rate * t.trend_ratio || recent_rate <= t.trend_min_rate {
        return None;
    }
    Some(
        Candidate::new(
            ERROR_RATE_TREND,
            Severity::Medium,
            "Error rate trending up",
            format!(
                "Error rate rose from {} to {} over the last {} hours",
                percent(older_rate),
                percent(recent_rate),
                span * 2
            ),
        )
        .recommendation("Investigate before the trend turns into an outage.")
        .meta("olderRate", older_rate)
        .meta("recentRate", recent_rate),
    )
}

/// `baseline` holds the hourly volumes before the current hour.
pub fn volume_spike(current: u64, baseline: &[u64], t: &Thresholds) -> Option<Candidate> {
    if baseline.is_empty() {
        return None;
    }
    let avg = mean(baseline.iter().map(|&v| v as f64));
    if (current as f64) <= avg * t.spike_ratio || current <= t.spike_min_volume {
        return None;
    }
    Some(
        Candidate::new(
            VOLUME_SPIKE,
            Severity::Medium,
            "Log volume spike",
            format!(
                "{current} entries in the last hour against an average of {avg:.0} over the previous {} hours",
                baseline.len()
            ),
        )
        .recommendation("Check for retry storms, noisy debug logging or a traffic surge.")
        .meta("currentHour", current)
        .meta("baselineAverage", avg),
    )
}

pub fn issue_backlog(open_issues: u64, t: &Thresholds) -> Option<Candidate> {
    (open_issues > t.backlog_open_issues).then(|| {
        Candidate::new(
            ISSUE_BACKLOG,
            Severity::Low,
            "Open issue backlog growing",
            format!("{open_issues} issues are open"),
        )
        .recommendation("Triage and resolve stale issues.")
        .meta("openIssues", open_issues)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> Thresholds {
        Thresholds::default()
    }

    fn group(message: &str, count: u64) -> MessageGroup {
        MessageGroup {
            message: message.to_string(),
            count,
        }
    }

    fn hour(total: u64, errors: u64) -> ErrorStats {
        ErrorStats { total, errors }
    }

    #[test]
    fn percent_has_two_decimals() {
        assert_eq!(percent(0.0), "0.00%");
        assert_eq!(percent(1.0 / 24.0), "4.17%");
    }

    #[test]
    fn high_error_rate_needs_rate_and_volume() {
        let fired = high_error_rate(&hour(20, 2), &t()).unwrap();
        assert_eq!(fired.issue_type, HIGH_ERROR_RATE);
        assert_eq!(fired.severity, Severity::High);
        assert_eq!(fired.metadata["errorRate"], serde_json::json!(0.1));

        // 100% errors but too few entries.
        assert!(high_error_rate(&hour(5, 5), &t()).is_none());
        // Exactly 5% is not above the threshold.
        assert!(high_error_rate(&hour(100, 5), &t()).is_none());
        assert!(high_error_rate(&hour(0, 0), &t()).is_none());
    }

    #[test]
    fn repeated_error_threshold_is_strict() {
        let fired = repeated_errors(&[group("db timeout", 6)], &t());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].metadata["count"], 6);
        assert_eq!(fired[0].dedup_key(), "db timeout");

        assert!(repeated_errors(&[group("db timeout", 5)], &t()).is_empty());
    }

    #[test]
    fn repeated_errors_keep_top_five_with_stable_ties() {
        let groups = vec![
            group("e", 9),
            group("a", 7),
            group("b", 7),
            group("c", 20),
            group("d", 6),
            group("f", 8),
            group("g", 3),
        ];
        let fired = repeated_errors(&groups, &t());
        let keys: Vec<&str> = fired.iter().map(|c| c.dedup_key()).collect();
        assert_eq!(keys, vec!["c", "e", "f", "a", "b"]);
    }

    #[test]
    fn long_messages_are_truncated_in_titles_only() {
        let long = "x".repeat(200);
        let fired = repeated_errors(&[group(&long, 10)], &t());
        assert!(fired[0].title.chars().count() < 100);
        assert_eq!(fired[0].dedup_key(), long);
    }

    #[test]
    fn keyword_rules() {
        assert!(memory_warning(3, &t()).is_none());
        assert!(memory_warning(4, &t()).is_some());
        assert!(connection_failure(0, &t()).is_none());
        assert_eq!(
            connection_failure(1, &t()).unwrap().severity,
            Severity::High
        );
    }

    #[test]
    fn filters_match_expected_entries() {
        use chrono::Utc;
        use logwarden_core::LogEntry;

        let mem = memory_filter();
        assert!(mem.matches(&LogEntry::new(Utc::now(), LogLevel::Warn, "Out of MEMORY", "blue")));
        assert!(!mem.matches(&LogEntry::new(Utc::now(), LogLevel::Info, "memory ok", "blue")));

        let conn = connection_filter();
        assert!(conn.matches(&LogEntry::new(
            Utc::now(),
            LogLevel::Info,
            "connect ECONNREFUSED 10.0.0.5:5432",
            "green"
        )));
        assert!(!conn.matches(&LogEntry::new(Utc::now(), LogLevel::Error, "econnrefused", "green")));
    }

    #[test]
    fn trend_compares_recent_against_older_buckets() {
        // older 1% average, recent 4% average.
        let rising = [hour(100, 1), hour(100, 1), hour(100, 1), hour(100, 3), hour(100, 4), hour(100, 5)];
        let fired = error_rate_trend(&rising, &t()).unwrap();
        assert_eq!(fired.issue_type, ERROR_RATE_TREND);

        // Rising but still under 2%.
        let low = [hour(100, 0), hour(100, 0), hour(100, 1), hour(100, 1), hour(100, 1), hour(100, 1)];
        assert!(error_rate_trend(&low, &t()).is_none());

        // High but flat.
        let flat = [hour(100, 10); 6];
        assert!(error_rate_trend(&flat, &t()).is_none());

        // Not enough history.
        assert!(error_rate_trend(&rising[..5], &t()).is_none());
    }

    #[test]
    fn spike_needs_ratio_and_volume() {
        assert!(volume_spike(250, &[100, 100, 100, 100, 100], &t()).is_some());
        assert!(volume_spike(200, &[100, 100, 100, 100, 100], &t()).is_none());
        assert!(volume_spike(90, &[10, 10, 10, 10, 10], &t()).is_none());
        assert!(volume_spike(500, &[], &t()).is_none());
    }

    #[test]
    fn backlog_threshold() {
        assert!(issue_backlog(10, &t()).is_none());
        assert_eq!(issue_backlog(11, &t()).unwrap().severity, Severity::Low);
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.yaml");
        std::fs::write(&path, "error_rate: 0.1\nbacklog_open_issues: 25\n").unwrap();

        let loaded = Thresholds::load(&path).unwrap();
        assert_eq!(loaded.error_rate, 0.1);
        assert_eq!(loaded.backlog_open_issues, 25);
        assert_eq!(loaded.repeated_error_count, 5);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "error_rate: 5\n").unwrap();
        assert!(matches!(
            Thresholds::load(&path),
            Err(RulesError::InvalidThresholds(_))
        ));

        std::fs::write(&path, "error_rate: [nope]\n").unwrap();
        assert!(matches!(Thresholds::load(&path), Err(RulesError::Yaml(_))));
    }

    #[test]
    fn huge_windows_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.yaml");
        std::fs::write(&path, "window_minutes: 10000000000000\n").unwrap();
        assert!(matches!(
            Thresholds::load(&path),
            Err(RulesError::InvalidThresholds(_))
        ));

        for body in ["trend_bucket_hours: 100000000\n", "spike_baseline_hours: 169\n"] {
            std::fs::write(&path, body).unwrap();
            assert!(
                matches!(Thresholds::load(&path), Err(RulesError::InvalidThresholds(_))),
                "{body}"
            );
        }

        std::fs::write(&path, "window_minutes: 1440\nspike_baseline_hours: 168\n").unwrap();
        assert!(Thresholds::load(&path).is_ok());
    }

    #[test]
    fn window_start_never_overflows() {
        let now = Utc::now();
        assert_eq!(
            t().window_start(now).unwrap(),
            now - chrono::Duration::minutes(15)
        );

        let unchecked = Thresholds {
            window_minutes: i64::MAX,
            ..t()
        };
        assert!(unchecked.window_start(now).is_err());
    }
}
