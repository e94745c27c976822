//! In-process store used by tests and local runs without PostgreSQL.
//!
//! All state sits behind one `tokio::sync::RwLock`, so `reconcile` holds the
//! write lock across its find and its write.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use logwarden_core::{
    Candidate, ErrorStats, IssueId, IssueStatus, LogEntry, LogId, LogIssue, LogLevel,
    MessageFilter, MessageGroup, Reconciliation,
};

use crate::error::StorageError;
use crate::store::{DigestStats, IssueStore};

#[derive(Default)]
struct Tables {
    logs: Vec<LogEntry>,
    issues: Vec<LogIssue>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn log_count(&self) -> usize {
        self.tables.read().await.logs.len()
    }

    pub async fn issue_count(&self) -> usize {
        self.tables.read().await.issues.len()
    }

    /// Snapshot of every issue, in insertion order.
    pub async fn issues(&self) -> Vec<LogIssue> {
        self.tables.read().await.issues.clone()
    }
}

fn find_open<'a>(
    issues: &'a mut [LogIssue],
    candidate: &Candidate,
    since: DateTime<Utc>,
) -> Option<&'a mut LogIssue> {
    issues
        .iter_mut()
        .filter(|issue| issue.accepts(candidate, since))
        .max_by_key(|issue| issue.detected_at)
}

#[async_trait]
impl IssueStore for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn insert_logs(&self, entries: &[LogEntry]) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let mut inserted = 0;
        for entry in entries {
            if tables.logs.iter().any(|e| e.id == entry.id) {
                continue;
            }
            tables.logs.push(entry.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn unanalyzed(&self, limit: u32) -> Result<Vec<LogEntry>, StorageError> {
        let tables = self.tables.read().await;
        let mut pending: Vec<LogEntry> =
            tables.logs.iter().filter(|e| !e.analyzed).cloned().collect();
        pending.sort_by_key(|e| e.timestamp);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_analyzed(&self, ids: &[LogId]) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let mut marked = 0;
        for entry in tables.logs.iter_mut() {
            if !entry.analyzed && ids.contains(&entry.id) {
                entry.analyzed = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn error_stats(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ErrorStats, StorageError> {
        let tables = self.tables.read().await;
        let mut stats = ErrorStats::default();
        for entry in tables.logs.iter().filter(|e| e.timestamp >= from && e.timestamp < to) {
            stats.total += 1;
            if entry.level.is_error() {
                stats.errors += 1;
            }
        }
        Ok(stats)
    }

    async fn repeated_messages(
        &self,
        since: DateTime<Utc>,
        levels: &[LogLevel],
        more_than: u64,
        limit: usize,
    ) -> Result<Vec<MessageGroup>, StorageError> {
        let tables = self.tables.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for entry in tables
            .logs
            .iter()
            .filter(|e| e.timestamp >= since && (levels.is_empty() || levels.contains(&e.level)))
        {
            *counts.entry(entry.message.as_str()).or_default() += 1;
        }
        let mut groups: Vec<MessageGroup> = counts
            .into_iter()
            .filter(|(_, count)| *count > more_than)
            .map(|(message, count)| MessageGroup {
                message: message.to_string(),
                count,
            })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
        groups.truncate(limit);
        Ok(groups)
    }

    async fn count_matching(
        &self,
        since: DateTime<Utc>,
        filter: &MessageFilter,
    ) -> Result<u64, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .logs
            .iter()
            .filter(|e| e.timestamp >= since && filter.matches(e))
            .count() as u64)
    }

    async fn count_open_issues(&self) -> Result<u64, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .issues
            .iter()
            .filter(|i| i.status == IssueStatus::Open)
            .count() as u64)
    }

    async fn find_open_issue(
        &self,
        issue_type: &str,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .issues
            .iter()
            .filter(|i| {
                i.status == IssueStatus::Open
                    && i.issue_type == issue_type
                    && i.fingerprint == fingerprint
                    && i.detected_at >= since
            })
            .max_by_key(|i| i.detected_at)
            .cloned())
    }

    async fn create_issue(&self, issue: &LogIssue) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.issues.iter().any(|i| i.id == issue.id) {
            return Err(StorageError::Other(format!("issue {} already exists", issue.id)));
        }
        tables.issues.push(issue.clone());
        Ok(())
    }

    async fn update_issue_metadata(
        &self,
        id: IssueId,
        patch: &BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError> {
        let mut tables = self.tables.write().await;
        Ok(tables.issues.iter_mut().find(|i| i.id == id).map(|issue| {
            issue.metadata.merge_patch(patch);
            issue.updated_at = now;
            issue.clone()
        }))
    }

    async fn reconcile(
        &self,
        candidate: &Candidate,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, StorageError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = find_open(&mut tables.issues, candidate, since) {
            let occurrences = existing.absorb(candidate, now);
            return Ok(Reconciliation::Updated {
                issue: existing.clone(),
                occurrences,
            });
        }
        let issue = LogIssue::from_candidate(candidate, now);
        tables.issues.push(issue.clone());
        Ok(Reconciliation::Created { issue })
    }

    async fn get_issue(&self, id: IssueId) -> Result<Option<LogIssue>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.issues.iter().find(|i| i.id == id).cloned())
    }

    async fn resolve_issue(
        &self,
        id: IssueId,
        now: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError> {
        let mut tables = self.tables.write().await;
        Ok(tables.issues.iter_mut().find(|i| i.id == id).map(|issue| {
            if issue.status != IssueStatus::Resolved {
                issue.status = IssueStatus::Resolved;
                issue.resolved_at = Some(now);
                issue.updated_at = now;
            }
            issue.clone()
        }))
    }

    async fn list_issues(
        &self,
        status: Option<IssueStatus>,
        limit: usize,
    ) -> Result<Vec<LogIssue>, StorageError> {
        let tables = self.tables.read().await;
        let mut issues: Vec<LogIssue> = tables
            .issues
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        issues.truncate(limit);
        Ok(issues)
    }

    async fn search_resolved(
        &self,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<LogIssue>, StorageError> {
        let needle = keywords.to_lowercase();
        let tables = self.tables.read().await;
        let mut hits: Vec<LogIssue> = tables
            .issues
            .iter()
            .filter(|i| i.status == IssueStatus::Resolved)
            .filter(|i| {
                i.title.to_lowercase().contains(&needle)
                    || i.description.to_lowercase().contains(&needle)
                    || i
                        .root_cause
                        .as_deref()
                        .is_some_and(|r| r.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.resolved_at.cmp(&a.resolved_at));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn digest_stats(&self, since: DateTime<Utc>) -> Result<DigestStats, StorageError> {
        let tables = self.tables.read().await;
        let mut stats = DigestStats::default();
        for entry in tables.logs.iter().filter(|e| e.timestamp >= since) {
            stats.total_logs += 1;
            if entry.level.is_error() {
                stats.error_logs += 1;
            }
        }
        for issue in &tables.issues {
            if issue.detected_at >= since && issue.status != IssueStatus::Resolved {
                stats.open_issues += 1;
            }
            if issue.resolved_at.is_some_and(|at| at >= since) {
                stats.resolved_issues += 1;
            }
        }
        Ok(stats)
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let before = tables.logs.len();
        tables.logs.retain(|e| e.timestamp >= cutoff);
        Ok((before - tables.logs.len()) as u64)
    }

    async fn delete_resolved_issues_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let before = tables.issues.len();
        tables.issues.retain(|i| {
            i.status != IssueStatus::Resolved || i.resolved_at.unwrap_or(i.updated_at) >= cutoff
        });
        Ok((before - tables.issues.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use logwarden_core::Severity;
    use std::sync::Arc;

    fn entry(at: DateTime<Utc>, level: LogLevel, message: &str) -> LogEntry {
        LogEntry::new(at, level, message, "blue")
    }

    fn candidate(kind: &str) -> Candidate {
        Candidate::new(kind, Severity::High, "title", "description").source("test")
    }

    #[tokio::test]
    async fn insert_skips_duplicate_ids() {
        let store = MemoryStore::new();
        let e = entry(Utc::now(), LogLevel::Info, "hello");
        assert_eq!(store.insert_logs(&[e.clone(), e.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_logs(&[e]).await.unwrap(), 0);
        assert_eq!(store.log_count().await, 1);
    }

    #[tokio::test]
    async fn unanalyzed_is_oldest_first_and_marking_is_one_way() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let newer = entry(now, LogLevel::Info, "b");
        let older = entry(now - Duration::minutes(1), LogLevel::Info, "a");
        store.insert_logs(&[newer.clone(), older.clone()]).await.unwrap();

        let pending = store.unanalyzed(1).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, older.id);

        assert_eq!(store.mark_analyzed(&[older.id]).await.unwrap(), 1);
        assert_eq!(store.mark_analyzed(&[older.id]).await.unwrap(), 0);
        let pending = store.unanalyzed(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, newer.id);
    }

    #[tokio::test]
    async fn error_stats_uses_half_open_range() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_logs(&[
                entry(now - Duration::minutes(20), LogLevel::Error, "old"),
                entry(now - Duration::minutes(5), LogLevel::Error, "e"),
                entry(now - Duration::minutes(5), LogLevel::Fatal, "f"),
                entry(now - Duration::minutes(5), LogLevel::Info, "i"),
                entry(now, LogLevel::Error, "edge"),
            ])
            .await
            .unwrap();
        let stats = store.error_stats(now - Duration::minutes(15), now).await.unwrap();
        assert_eq!(stats, ErrorStats { total: 3, errors: 2 });
    }

    #[tokio::test]
    async fn repeated_messages_sorted_and_capped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut batch = Vec::new();
        for _ in 0..7 {
            batch.push(entry(now, LogLevel::Error, "db down"));
        }
        for _ in 0..6 {
            batch.push(entry(now, LogLevel::Error, "cache miss"));
        }
        for _ in 0..9 {
            batch.push(entry(now, LogLevel::Info, "heartbeat"));
        }
        store.insert_logs(&batch).await.unwrap();

        let groups = store
            .repeated_messages(now - Duration::minutes(15), &[LogLevel::Error], 5, 1)
            .await
            .unwrap();
        assert_eq!(
            groups,
            vec![MessageGroup {
                message: "db down".to_string(),
                count: 7
            }]
        );
    }

    #[tokio::test]
    async fn reconcile_folds_then_expires() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let first = store
            .reconcile(&candidate("x"), t0 - Duration::hours(1), t0)
            .await
            .unwrap();
        assert!(first.is_created());

        let t1 = t0 + Duration::minutes(30);
        match store
            .reconcile(&candidate("x"), t1 - Duration::hours(1), t1)
            .await
            .unwrap()
        {
            Reconciliation::Updated { occurrences, .. } => assert_eq!(occurrences, 2),
            other => panic!("expected update, got {other:?}"),
        }

        let t2 = t0 + Duration::minutes(61);
        let third = store
            .reconcile(&candidate("x"), t2 - Duration::hours(1), t2)
            .await
            .unwrap();
        assert!(third.is_created());
        assert_eq!(store.issue_count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_reconcile_creates_one_issue() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .reconcile(&candidate("race"), now - Duration::hours(1), now)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let issues = store.issues().await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].occurrences(), 8);
    }

    #[tokio::test]
    async fn retention_keeps_open_issues() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::days(100);

        let open = LogIssue::from_candidate(&candidate("open"), old);
        let resolved = LogIssue::from_candidate(&candidate("done"), old);
        store.create_issue(&open).await.unwrap();
        store.create_issue(&resolved).await.unwrap();
        store.resolve_issue(resolved.id, old).await.unwrap();

        let deleted = store
            .delete_resolved_issues_before(now - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_issue(open.id).await.unwrap().is_some());
        assert!(store.get_issue(resolved.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_resolved_matches_root_cause() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let issue = LogIssue::from_candidate(
            &candidate("connection-failure").root_cause("Postgres ECONNREFUSED on failover"),
            now,
        );
        store.create_issue(&issue).await.unwrap();
        assert!(store.search_resolved("econnrefused", 5).await.unwrap().is_empty());

        store.resolve_issue(issue.id, now).await.unwrap();
        let hits = store.search_resolved("econnrefused", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, issue.id);
    }

    #[tokio::test]
    async fn update_metadata_is_last_writer_wins() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let issue = LogIssue::from_candidate(&candidate("x").meta("a", 1).meta("b", 1), now);
        store.create_issue(&issue).await.unwrap();

        let mut patch = BTreeMap::new();
        patch.insert("b".to_string(), serde_json::json!(2));
        let updated = store
            .update_issue_metadata(issue.id, &patch, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.metadata.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(updated.metadata.get("b"), Some(&serde_json::json!(2)));
        assert_eq!(updated.occurrences(), 1);
    }
}
