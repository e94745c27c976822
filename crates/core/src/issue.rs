use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::log::LogId;

pub type IssueId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(CoreError::UnknownSeverity(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(IssueStatus::Open),
            "resolved" => Ok(IssueStatus::Resolved),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

fn default_occurrences() -> u64 {
    1
}

/// Issue metadata with explicit merge semantics.
///
/// `extra` keys are last-writer-wins; `occurrences` only ever grows by one
/// per absorbed candidate; `last_seen` tracks the latest absorb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueMetadata {
    #[serde(default = "default_occurrences")]
    pub occurrences: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for IssueMetadata {
    fn default() -> Self {
        Self {
            occurrences: default_occurrences(),
            last_seen: None,
            extra: BTreeMap::new(),
        }
    }
}

impl IssueMetadata {
    pub fn from_extra(extra: BTreeMap<String, serde_json::Value>) -> Self {
        let mut meta = Self::default();
        meta.merge_patch(&extra);
        meta
    }

    /// Overwrite keys from `patch`, keeping every other prior key.
    ///
    /// `occurrences` and `lastSeen` inside the patch are ignored; they are
    /// owned by [`record_occurrence`](Self::record_occurrence).
    pub fn merge_patch(&mut self, patch: &BTreeMap<String, serde_json::Value>) {
        for (key, value) in patch {
            if key == "occurrences" || key == "lastSeen" {
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
    }

    pub fn record_occurrence(&mut self, now: DateTime<Utc>) -> u64 {
        self.occurrences += 1;
        self.last_seen = Some(now);
        self.occurrences
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

/// A detector's proposed problem report, before deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(rename = "type")]
    pub issue_type: String,
    /// Dedup discriminator inside `issue_type`; the type itself when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    pub source: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub affected_logs: Vec<LogId>,
}

impl Candidate {
    pub fn new(
        issue_type: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            issue_type: issue_type.into(),
            fingerprint: None,
            severity,
            title: title.into(),
            description: description.into(),
            root_cause: None,
            recommendation: None,
            source: String::new(),
            metadata: BTreeMap::new(),
            affected_logs: Vec::new(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = Some(root_cause.into());
        self
    }

    pub fn recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn affected_logs(mut self, ids: impl IntoIterator<Item = LogId>) -> Self {
        self.affected_logs.extend(ids);
        self
    }

    pub fn dedup_key(&self) -> &str {
        self.fingerprint.as_deref().unwrap_or(&self.issue_type)
    }
}

/// A tracked problem, deduplicated per `(issue_type, fingerprint)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogIssue {
    pub id: IssueId,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub fingerprint: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub root_cause: Option<String>,
    pub recommendation: Option<String>,
    pub source: String,
    pub status: IssueStatus,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: IssueMetadata,
    pub affected_logs: Vec<LogId>,
}

impl LogIssue {
    /// Open a fresh issue from a candidate that matched nothing.
    pub fn from_candidate(candidate: &Candidate, now: DateTime<Utc>) -> Self {
        let mut affected_logs = Vec::with_capacity(candidate.affected_logs.len());
        for id in &candidate.affected_logs {
            if !affected_logs.contains(id) {
                affected_logs.push(*id);
            }
        }
        Self {
            id: Uuid::new_v4(),
            issue_type: candidate.issue_type.clone(),
            fingerprint: candidate.dedup_key().to_string(),
            severity: candidate.severity,
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            root_cause: candidate.root_cause.clone(),
            recommendation: candidate.recommendation.clone(),
            source: candidate.source.clone(),
            status: IssueStatus::Open,
            detected_at: now,
            updated_at: now,
            resolved_at: None,
            metadata: IssueMetadata::from_extra(candidate.metadata.clone()),
            affected_logs,
        }
    }

    /// Fold a repeat candidate into this issue and return the new occurrence count.
    ///
    /// Only metadata, affected logs and `updated_at` change; the first
    /// occurrence's severity and text are kept.
    pub fn absorb(&mut self, candidate: &Candidate, now: DateTime<Utc>) -> u64 {
        self.metadata.merge_patch(&candidate.metadata);
        for id in &candidate.affected_logs {
            if !self.affected_logs.contains(id) {
                self.affected_logs.push(*id);
            }
        }
        self.updated_at = now;
        self.metadata.record_occurrence(now)
    }

    /// Whether a candidate detected at or after `since` should fold into this issue.
    pub fn accepts(&self, candidate: &Candidate, since: DateTime<Utc>) -> bool {
        self.status == IssueStatus::Open
            && self.issue_type == candidate.issue_type
            && self.fingerprint == candidate.dedup_key()
            && self.detected_at >= since
    }

    pub fn occurrences(&self) -> u64 {
        self.metadata.occurrences
    }
}

/// Outcome of passing a candidate through the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Reconciliation {
    Created { issue: LogIssue },
    Updated { issue: LogIssue, occurrences: u64 },
}

impl Reconciliation {
    pub fn issue(&self) -> &LogIssue {
        match self {
            Reconciliation::Created { issue } | Reconciliation::Updated { issue, .. } => issue,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Reconciliation::Created { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate() -> Candidate {
        Candidate::new("high-error-rate", Severity::High, "High error rate", "12% errors")
            .source("detect-issues")
            .meta("errorRate", 0.12)
    }

    #[test]
    fn new_issue_starts_with_one_occurrence() {
        let now = Utc::now();
        let issue = LogIssue::from_candidate(&candidate(), now);
        assert_eq!(issue.status, IssueStatus::Open);
        assert_eq!(issue.fingerprint, "high-error-rate");
        assert_eq!(issue.occurrences(), 1);
        assert_eq!(issue.detected_at, now);
        assert_eq!(issue.updated_at, now);
        assert!(issue.metadata.last_seen.is_none());
    }

    #[test]
    fn absorb_keeps_first_text_and_merges_metadata() {
        let t0 = Utc::now();
        let mut issue = LogIssue::from_candidate(&candidate().meta("node", "blue"), t0);

        let mut repeat = candidate().meta("errorRate", 0.3);
        repeat.severity = Severity::Critical;
        repeat.title = "Something else".to_string();

        let t1 = t0 + Duration::minutes(10);
        let occurrences = issue.absorb(&repeat, t1);

        assert_eq!(occurrences, 2);
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.title, "High error rate");
        assert_eq!(issue.metadata.get("errorRate"), Some(&serde_json::json!(0.3)));
        assert_eq!(issue.metadata.get("node"), Some(&serde_json::json!("blue")));
        assert_eq!(issue.metadata.last_seen, Some(t1));
        assert_eq!(issue.updated_at, t1);
        assert_eq!(issue.detected_at, t0);
    }

    #[test]
    fn patch_cannot_clobber_occurrence_counter() {
        let mut meta = IssueMetadata::default();
        let mut patch = BTreeMap::new();
        patch.insert("occurrences".to_string(), serde_json::json!(99));
        meta.merge_patch(&patch);
        assert_eq!(meta.occurrences, 1);
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn metadata_serializes_flat() {
        let mut meta = IssueMetadata::default();
        meta.extra.insert("count".to_string(), serde_json::json!(6));
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value, serde_json::json!({ "occurrences": 1, "count": 6 }));

        let back: IssueMetadata = serde_json::from_value(serde_json::json!({ "count": 6 })).unwrap();
        assert_eq!(back.occurrences, 1);
        assert_eq!(back.get("count"), Some(&serde_json::json!(6)));
    }

    #[test]
    fn accepts_only_open_matching_issues_inside_window() {
        let now = Utc::now();
        let mut issue = LogIssue::from_candidate(&candidate(), now - Duration::minutes(30));
        let c = candidate();
        assert!(issue.accepts(&c, now - Duration::hours(1)));
        assert!(!issue.accepts(&c, now - Duration::minutes(10)));
        assert!(!issue.accepts(&c.clone().fingerprint("other"), now - Duration::hours(1)));
        issue.status = IssueStatus::Resolved;
        assert!(!issue.accepts(&c, now - Duration::hours(1)));
    }

    #[test]
    fn affected_logs_are_deduplicated() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut issue = LogIssue::from_candidate(&candidate().affected_logs([id, id]), now);
        assert_eq!(issue.affected_logs, vec![id]);
        issue.absorb(&candidate().affected_logs([id, Uuid::new_v4()]), now);
        assert_eq!(issue.affected_logs.len(), 2);
    }
}
