//! Folds candidates into existing open issues or opens new ones.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use logwarden_core::{Candidate, Reconciliation};
use logwarden_storage::{IssueStore, StorageError};

/// How far back an open issue still absorbs a repeat candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    /// detect-issues, analyze-logs, analyze-e2e-results.
    Reactive,
    /// predict-issues.
    Predictive,
}

impl Lookback {
    pub fn duration(&self) -> Duration {
        match self {
            Lookback::Reactive => Duration::hours(1),
            Lookback::Predictive => Duration::hours(6),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub outcomes: Vec<Reconciliation>,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn IssueStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn IssueStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        candidate: &Candidate,
        lookback: Lookback,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, StorageError> {
        let since = now - lookback.duration();
        let outcome = self.store.reconcile(candidate, since, now).await?;
        match &outcome {
            Reconciliation::Created { issue } => info!(
                issue_type = %issue.issue_type,
                id = %issue.id,
                severity = %issue.severity,
                "issue created"
            ),
            Reconciliation::Updated { issue, occurrences } => info!(
                issue_type = %issue.issue_type,
                id = %issue.id,
                occurrences,
                "issue updated"
            ),
        }
        Ok(outcome)
    }

    /// Reconcile candidates in order, stopping at the first store error.
    pub async fn reconcile_all(
        &self,
        candidates: &[Candidate],
        lookback: Lookback,
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, StorageError> {
        let mut summary = ReconcileSummary::default();
        for candidate in candidates {
            let outcome = self.reconcile(candidate, lookback, now).await?;
            if outcome.is_created() {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
            summary.outcomes.push(outcome);
        }
        Ok(summary)
    }
}
