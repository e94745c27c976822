//! The persistence seam shared by every job.
//!
//! Jobs never talk to a database directly; they receive an
//! `Arc<dyn IssueStore>`. [`MemoryStore`](crate::MemoryStore) backs tests and
//! local runs, [`PgStore`](crate::PgStore) backs deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logwarden_core::{
    Candidate, ErrorStats, IssueId, IssueStatus, LogEntry, LogId, LogIssue, LogLevel,
    MessageFilter, MessageGroup, Reconciliation,
};

use crate::error::StorageError;

/// Aggregate counts for the daily digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestStats {
    pub total_logs: u64,
    pub error_logs: u64,
    /// Issues detected in the window that are not resolved.
    pub open_issues: u64,
    /// Issues resolved in the window.
    pub resolved_issues: u64,
}

impl DigestStats {
    pub fn error_rate(&self) -> f64 {
        ErrorStats {
            total: self.total_logs,
            errors: self.error_logs,
        }
        .error_rate()
    }
}

#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Human-readable backend name for logs.
    fn backend_name(&self) -> &str;

    // ── Log entries ───────────────────────────────────────────

    /// Store collected entries; ids already present are skipped.
    async fn insert_logs(&self, entries: &[LogEntry]) -> Result<u64, StorageError>;

    /// Oldest-first entries whose `analyzed` flag is still false.
    async fn unanalyzed(&self, limit: u32) -> Result<Vec<LogEntry>, StorageError>;

    async fn mark_analyzed(&self, ids: &[LogId]) -> Result<u64, StorageError>;

    /// Counts over the half-open range `[from, to)`.
    async fn error_stats(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ErrorStats, StorageError>;

    /// Message groups at the given levels seen more than `more_than` times
    /// since `since`, largest first, at most `limit` groups.
    async fn repeated_messages(
        &self,
        since: DateTime<Utc>,
        levels: &[LogLevel],
        more_than: u64,
        limit: usize,
    ) -> Result<Vec<MessageGroup>, StorageError>;

    async fn count_matching(
        &self,
        since: DateTime<Utc>,
        filter: &MessageFilter,
    ) -> Result<u64, StorageError>;

    // ── Issues ────────────────────────────────────────────────

    async fn count_open_issues(&self) -> Result<u64, StorageError>;

    /// Most recently detected open issue with this type and fingerprint
    /// detected at or after `since`.
    async fn find_open_issue(
        &self,
        issue_type: &str,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError>;

    async fn create_issue(&self, issue: &LogIssue) -> Result<(), StorageError>;

    /// Last-writer-wins merge of `patch` into the issue's metadata.
    async fn update_issue_metadata(
        &self,
        id: IssueId,
        patch: &BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError>;

    /// Atomically fold `candidate` into a matching open issue detected at or
    /// after `since`, or create a new one.
    ///
    /// Implementations must not let two concurrent calls for the same
    /// `(type, fingerprint)` both create an issue.
    async fn reconcile(
        &self,
        candidate: &Candidate,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, StorageError>;

    async fn get_issue(&self, id: IssueId) -> Result<Option<LogIssue>, StorageError>;

    /// Manual resolution; returns `None` for unknown ids.
    async fn resolve_issue(
        &self,
        id: IssueId,
        now: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError>;

    /// Newest-first issues, optionally filtered by status.
    async fn list_issues(
        &self,
        status: Option<IssueStatus>,
        limit: usize,
    ) -> Result<Vec<LogIssue>, StorageError>;

    /// Resolved issues whose title, description or root cause mention
    /// `keywords` (case-insensitive), most recently resolved first.
    async fn search_resolved(
        &self,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<LogIssue>, StorageError>;

    async fn digest_stats(&self, since: DateTime<Utc>) -> Result<DigestStats, StorageError>;

    // ── Retention ─────────────────────────────────────────────

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    /// Delete resolved issues resolved before `cutoff`. Open issues are kept.
    async fn delete_resolved_issues_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}
