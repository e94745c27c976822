//! Detection through reconciliation against the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use logwarden_core::{IssueStatus, LogEntry, LogLevel};
use logwarden_rules::detect::{evaluate_predictive, evaluate_reactive};
use logwarden_rules::{Lookback, Reconciler, Thresholds};
use logwarden_storage::{IssueStore, MemoryStore};

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

fn burst(at: DateTime<Utc>, n: usize, level: LogLevel, message: &str) -> Vec<LogEntry> {
    (0..n)
        .map(|_| LogEntry::new(at, level, message, "green"))
        .collect()
}

#[tokio::test]
async fn consecutive_detect_runs_fold_into_existing_issues() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Reconciler::new(store.clone());
    let thresholds = Thresholds::default();

    // 12:05 run sees a burst of the same failure.
    let first_run = noon() + Duration::minutes(5);
    store
        .insert_logs(&burst(first_run - Duration::minutes(2), 8, LogLevel::Error, "payment gateway timeout"))
        .await
        .unwrap();
    store
        .insert_logs(&burst(first_run - Duration::minutes(2), 12, LogLevel::Info, "ok"))
        .await
        .unwrap();

    let report = evaluate_reactive(store.as_ref(), first_run, &thresholds).await.unwrap();
    let summary = reconciler
        .reconcile_all(&report.candidates, Lookback::Reactive, first_run)
        .await
        .unwrap();
    assert_eq!(summary.created, 2); // high-error-rate + repeated-error

    // 12:20 run: the failure continues.
    let second_run = noon() + Duration::minutes(20);
    store
        .insert_logs(&burst(second_run - Duration::minutes(1), 7, LogLevel::Error, "payment gateway timeout"))
        .await
        .unwrap();
    store
        .insert_logs(&burst(second_run - Duration::minutes(1), 10, LogLevel::Info, "ok"))
        .await
        .unwrap();
    let report = evaluate_reactive(store.as_ref(), second_run, &thresholds).await.unwrap();
    let summary = reconciler
        .reconcile_all(&report.candidates, Lookback::Reactive, second_run)
        .await
        .unwrap();
    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 2);

    let issues = store.list_issues(Some(IssueStatus::Open), 10).await.unwrap();
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().all(|i| i.occurrences() == 2));
    let repeated = issues
        .iter()
        .find(|i| i.issue_type == "repeated-error")
        .unwrap();
    assert_eq!(repeated.fingerprint, "payment gateway timeout");
    assert_eq!(repeated.metadata.get("count"), Some(&serde_json::json!(7)));
}

#[tokio::test]
async fn resolved_issue_is_not_reused() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Reconciler::new(store.clone());
    let thresholds = Thresholds::default();

    store
        .insert_logs(&burst(noon() - Duration::minutes(1), 2, LogLevel::Error, "connect ETIMEDOUT 10.0.0.9:443"))
        .await
        .unwrap();
    let report = evaluate_reactive(store.as_ref(), noon(), &thresholds).await.unwrap();
    let first = reconciler
        .reconcile_all(&report.candidates, Lookback::Reactive, noon())
        .await
        .unwrap();
    let issue_id = first.outcomes[0].issue().id;
    store
        .resolve_issue(issue_id, noon() + Duration::minutes(1))
        .await
        .unwrap();

    let later = noon() + Duration::minutes(5);
    let report = evaluate_reactive(store.as_ref(), later, &thresholds).await.unwrap();
    let second = reconciler
        .reconcile_all(&report.candidates, Lookback::Reactive, later)
        .await
        .unwrap();
    assert_eq!(second.created, 1);
    assert_ne!(second.outcomes[0].issue().id, issue_id);
}

#[tokio::test]
async fn backlog_prediction_deduplicates_over_six_hours() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Reconciler::new(store.clone());
    let thresholds = Thresholds {
        backlog_open_issues: 1,
        ..Thresholds::default()
    };

    for name in ["a", "b"] {
        let c = logwarden_core::Candidate::new("repeated-error", logwarden_core::Severity::Medium, name, "x")
            .fingerprint(name);
        reconciler.reconcile(&c, Lookback::Reactive, noon()).await.unwrap();
    }

    for hour in 0..3 {
        let now = noon() + Duration::hours(hour);
        let report = evaluate_predictive(store.as_ref(), now, &thresholds).await.unwrap();
        reconciler
            .reconcile_all(&report.candidates, Lookback::Predictive, now)
            .await
            .unwrap();
    }

    let backlog: Vec<_> = store
        .issues()
        .await
        .into_iter()
        .filter(|i| i.issue_type == "issue-backlog")
        .collect();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].occurrences(), 3);
}
