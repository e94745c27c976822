//! Health and schedule endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logwarden_core::JobName;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: String,
    pub runner: String,
    pub genai: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store().backend_name().to_string(),
        runner: state.dispatcher.runner_name().to_string(),
        genai: state.jobs.analyzer.is_some(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ScheduleParams {
    pub at: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub job: JobName,
    pub cron: String,
    pub next_fire: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct UpcomingRun {
    pub at: DateTime<Utc>,
    pub job: JobName,
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub offset: String,
    pub now: DateTime<Utc>,
    pub due: Vec<JobName>,
    pub jobs: Vec<ScheduledJob>,
    pub upcoming: Vec<UpcomingRun>,
}

/// Cadence table with the jobs due now and the next few runs.
pub async fn schedule(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScheduleParams>,
) -> Json<ScheduleResponse> {
    let now = params.at.unwrap_or_else(Utc::now);
    let table = &state.cadence;
    Json(ScheduleResponse {
        offset: table.offset().to_string(),
        now,
        due: table.due(now),
        jobs: table
            .entries()
            .iter()
            .map(|e| ScheduledJob {
                job: e.job,
                cron: e.cron.clone(),
                next_fire: table.next_fire(e.job, now),
            })
            .collect(),
        upcoming: table
            .upcoming(now, params.limit.unwrap_or(10).min(100))
            .into_iter()
            .map(|(at, job)| UpcomingRun { at, job })
            .collect(),
    })
}
