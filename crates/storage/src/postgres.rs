//! PostgreSQL-backed store.
//!
//! Every query borrows a connection from the shared [`PgPool`] only for its
//! own duration; transactions return theirs on commit or drop.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use logwarden_core::config::PostgresConfig;
use logwarden_core::{
    Candidate, ErrorStats, IssueId, IssueMetadata, IssueStatus, LogEntry, LogId, LogIssue,
    LogLevel, MessageFilter, MessageGroup, Reconciliation,
};

use crate::error::StorageError;
use crate::store::{DigestStats, IssueStore};

const ISSUE_COLUMNS: &str = "id, type AS issue_type, fingerprint, severity, title, description, \
     root_cause, recommendation, source, status, detected_at, updated_at, resolved_at, \
     metadata, affected_logs";

const LOG_COLUMNS: &str = "id, timestamp, level, message, source, hostname, metadata, analyzed";

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    timestamp: DateTime<Utc>,
    level: String,
    message: String,
    source: String,
    hostname: Option<String>,
    metadata: serde_json::Value,
    analyzed: bool,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = StorageError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let metadata = match row.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(StorageError::Corrupt(format!(
                    "log {} metadata is not an object: {other}",
                    row.id
                )))
            }
        };
        Ok(LogEntry {
            id: row.id,
            timestamp: row.timestamp,
            level: row.level.parse()?,
            message: row.message,
            source: row.source,
            hostname: row.hostname,
            metadata,
            analyzed: row.analyzed,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IssueRow {
    id: Uuid,
    issue_type: String,
    fingerprint: String,
    severity: String,
    title: String,
    description: String,
    root_cause: Option<String>,
    recommendation: Option<String>,
    source: String,
    status: String,
    detected_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    affected_logs: Vec<Uuid>,
}

impl TryFrom<IssueRow> for LogIssue {
    type Error = StorageError;

    fn try_from(row: IssueRow) -> Result<Self, Self::Error> {
        let metadata: IssueMetadata = serde_json::from_value(row.metadata)
            .map_err(|e| StorageError::Corrupt(format!("issue {} metadata: {e}", row.id)))?;
        Ok(LogIssue {
            id: row.id,
            issue_type: row.issue_type,
            fingerprint: row.fingerprint,
            severity: row.severity.parse()?,
            title: row.title,
            description: row.description,
            root_cause: row.root_cause,
            recommendation: row.recommendation,
            source: row.source,
            status: row.status.parse()?,
            detected_at: row.detected_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
            metadata,
            affected_logs: row.affected_logs,
        })
    }
}

fn metadata_json(metadata: &IssueMetadata) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(metadata).map_err(|e| StorageError::Other(e.to_string()))
}

fn level_names(levels: &[LogLevel]) -> Option<Vec<String>> {
    if levels.is_empty() {
        None
    } else {
        Some(levels.iter().map(|l| l.as_str().to_string()).collect())
    }
}

/// Escape LIKE wildcards so needles match literally.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, apply migrations, and return the store.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StorageError> {
        if !config.is_configured() {
            return Err(StorageError::NotConfigured(
                "DATABASE_URL or PG_USERNAME must be set".into(),
            ));
        }
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!("PostgreSQL connected: {}", config.host);
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("Database migrations applied successfully");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_issue(
        tx: &mut Transaction<'_, Postgres>,
        issue: &LogIssue,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO log_issues (id, type, fingerprint, severity, title, description,
                 root_cause, recommendation, source, status, detected_at, updated_at,
                 resolved_at, metadata, affected_logs)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(issue.id)
        .bind(&issue.issue_type)
        .bind(&issue.fingerprint)
        .bind(issue.severity.as_str())
        .bind(&issue.title)
        .bind(&issue.description)
        .bind(&issue.root_cause)
        .bind(&issue.recommendation)
        .bind(&issue.source)
        .bind(issue.status.as_str())
        .bind(issue.detected_at)
        .bind(issue.updated_at)
        .bind(issue.resolved_at)
        .bind(metadata_json(&issue.metadata)?)
        .bind(&issue.affected_logs)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IssueStore for PgStore {
    fn backend_name(&self) -> &str {
        "postgres"
    }

    async fn insert_logs(&self, entries: &[LogEntry]) -> Result<u64, StorageError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for entry in entries {
            let result = sqlx::query(
                "INSERT INTO log_entries (id, timestamp, level, message, source, hostname, metadata, analyzed)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(entry.id)
            .bind(entry.timestamp)
            .bind(entry.level.as_str())
            .bind(&entry.message)
            .bind(&entry.source)
            .bind(&entry.hostname)
            .bind(serde_json::Value::Object(entry.metadata.clone()))
            .bind(entry.analyzed)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        debug!(inserted, "log entries stored");
        Ok(inserted)
    }

    async fn unanalyzed(&self, limit: u32) -> Result<Vec<LogEntry>, StorageError> {
        let rows = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM log_entries
             WHERE NOT analyzed
             ORDER BY timestamp ASC
             LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogEntry::try_from).collect()
    }

    async fn mark_analyzed(&self, ids: &[LogId]) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE log_entries SET analyzed = TRUE WHERE id = ANY($1) AND NOT analyzed",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn error_stats(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ErrorStats, StorageError> {
        let (total, errors): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE level IN ('error', 'fatal'))
             FROM log_entries
             WHERE timestamp >= $1 AND timestamp < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(ErrorStats {
            total: total as u64,
            errors: errors as u64,
        })
    }

    async fn repeated_messages(
        &self,
        since: DateTime<Utc>,
        levels: &[LogLevel],
        more_than: u64,
        limit: usize,
    ) -> Result<Vec<MessageGroup>, StorageError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT message, COUNT(*) AS count
             FROM log_entries
             WHERE timestamp >= $1
               AND ($2::text[] IS NULL OR level = ANY($2))
             GROUP BY message
             HAVING COUNT(*) > $3
             ORDER BY count DESC, message ASC
             LIMIT $4",
        )
        .bind(since)
        .bind(level_names(levels))
        .bind(more_than as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(message, count)| MessageGroup {
                message,
                count: count as u64,
            })
            .collect())
    }

    async fn count_matching(
        &self,
        since: DateTime<Utc>,
        filter: &MessageFilter,
    ) -> Result<u64, StorageError> {
        if filter.needles.is_empty() {
            return Ok(0);
        }
        let patterns: Vec<String> = filter.needles.iter().map(|n| like_pattern(n)).collect();
        let op = if filter.case_insensitive { "ILIKE" } else { "LIKE" };
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM log_entries
             WHERE timestamp >= $1
               AND ($2::text[] IS NULL OR level = ANY($2))
               AND message {op} ANY($3)"
        ))
        .bind(since)
        .bind(level_names(&filter.levels))
        .bind(patterns)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn count_open_issues(&self) -> Result<u64, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM log_issues WHERE status = 'open'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn find_open_issue(
        &self,
        issue_type: &str,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError> {
        let row = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM log_issues
             WHERE type = $1 AND fingerprint = $2 AND status = 'open' AND detected_at >= $3
             ORDER BY detected_at DESC
             LIMIT 1"
        ))
        .bind(issue_type)
        .bind(fingerprint)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LogIssue::try_from).transpose()
    }

    async fn create_issue(&self, issue: &LogIssue) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        Self::insert_issue(&mut tx, issue).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_issue_metadata(
        &self,
        id: IssueId,
        patch: &BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM log_issues WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut issue = LogIssue::try_from(row)?;
        issue.metadata.merge_patch(patch);
        issue.updated_at = now;
        sqlx::query("UPDATE log_issues SET metadata = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(metadata_json(&issue.metadata)?)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(issue))
    }

    async fn reconcile(
        &self,
        candidate: &Candidate,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, StorageError> {
        let mut tx = self.pool.begin().await?;

        // Serializes reconcilers of the same key until commit, including the
        // create path where no row exists yet to lock.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}\u{1f}{}", candidate.issue_type, candidate.dedup_key()))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM log_issues
             WHERE type = $1 AND fingerprint = $2 AND status = 'open' AND detected_at >= $3
             ORDER BY detected_at DESC
             LIMIT 1
             FOR UPDATE"
        ))
        .bind(&candidate.issue_type)
        .bind(candidate.dedup_key())
        .bind(since)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match row {
            Some(row) => {
                let mut issue = LogIssue::try_from(row)?;
                let occurrences = issue.absorb(candidate, now);
                sqlx::query(
                    "UPDATE log_issues
                     SET metadata = $2, affected_logs = $3, updated_at = $4
                     WHERE id = $1",
                )
                .bind(issue.id)
                .bind(metadata_json(&issue.metadata)?)
                .bind(&issue.affected_logs)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                Reconciliation::Updated { issue, occurrences }
            }
            None => {
                let issue = LogIssue::from_candidate(candidate, now);
                Self::insert_issue(&mut tx, &issue).await?;
                Reconciliation::Created { issue }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_issue(&self, id: IssueId) -> Result<Option<LogIssue>, StorageError> {
        let row = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM log_issues WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LogIssue::try_from).transpose()
    }

    async fn resolve_issue(
        &self,
        id: IssueId,
        now: DateTime<Utc>,
    ) -> Result<Option<LogIssue>, StorageError> {
        let row = sqlx::query_as::<_, IssueRow>(&format!(
            "UPDATE log_issues
             SET status = 'resolved',
                 resolved_at = COALESCE(resolved_at, $2),
                 updated_at = CASE WHEN status = 'resolved' THEN updated_at ELSE $2 END
             WHERE id = $1
             RETURNING {ISSUE_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LogIssue::try_from).transpose()
    }

    async fn list_issues(
        &self,
        status: Option<IssueStatus>,
        limit: usize,
    ) -> Result<Vec<LogIssue>, StorageError> {
        let rows = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM log_issues
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY detected_at DESC
             LIMIT $2"
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogIssue::try_from).collect()
    }

    async fn search_resolved(
        &self,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<LogIssue>, StorageError> {
        let rows = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM log_issues
             WHERE status = 'resolved'
               AND (title ILIKE $1 OR description ILIKE $1 OR root_cause ILIKE $1)
             ORDER BY resolved_at DESC NULLS LAST
             LIMIT $2"
        ))
        .bind(like_pattern(keywords))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogIssue::try_from).collect()
    }

    async fn digest_stats(&self, since: DateTime<Utc>) -> Result<DigestStats, StorageError> {
        let (total_logs, error_logs): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE level IN ('error', 'fatal'))
             FROM log_entries WHERE timestamp >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        let (open_issues, resolved_issues): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE detected_at >= $1 AND status <> 'resolved'),
                    COUNT(*) FILTER (WHERE resolved_at >= $1)
             FROM log_issues",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(DigestStats {
            total_logs: total_logs as u64,
            error_logs: error_logs as u64,
            open_issues: open_issues as u64,
            resolved_issues: resolved_issues as u64,
        })
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM log_entries WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_resolved_issues_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM log_issues
             WHERE status = 'resolved' AND COALESCE(resolved_at, updated_at) < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("memory"), "%memory%");
        assert_eq!(like_pattern("50%_done"), "%50\\%\\_done%");
    }

    #[test]
    fn issue_row_converts_and_defaults_occurrences() {
        let now = Utc::now();
        let row = IssueRow {
            id: Uuid::new_v4(),
            issue_type: "volume-spike".to_string(),
            fingerprint: "volume-spike".to_string(),
            severity: "medium".to_string(),
            title: "Log volume spike".to_string(),
            description: "3x".to_string(),
            root_cause: None,
            recommendation: None,
            source: "predict-issues".to_string(),
            status: "open".to_string(),
            detected_at: now,
            updated_at: now,
            resolved_at: None,
            metadata: serde_json::json!({ "currentHour": 400 }),
            affected_logs: vec![],
        };
        let issue = LogIssue::try_from(row).unwrap();
        assert_eq!(issue.occurrences(), 1);
        assert_eq!(issue.status, IssueStatus::Open);
        assert_eq!(issue.metadata.get("currentHour"), Some(&serde_json::json!(400)));
    }

    #[test]
    fn log_row_rejects_non_object_metadata() {
        let row = LogRow {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: "error".to_string(),
            message: "boom".to_string(),
            source: "blue".to_string(),
            hostname: None,
            metadata: serde_json::json!([1, 2]),
            analyzed: false,
        };
        assert!(matches!(LogEntry::try_from(row), Err(StorageError::Corrupt(_))));
    }
}
