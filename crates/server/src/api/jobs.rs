//! Job invocation and manual ticks.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use logwarden_core::JobName;
use logwarden_rules::{RunnerResponse, TickSummary};

use crate::state::AppState;

use super::{api_error, ApiError};

/// `POST /{namespace}/{job}`: run one job in this process.
///
/// The body is optional; only `analyze-e2e-results` reads it.
pub async fn invoke_job(
    State(state): State<Arc<AppState>>,
    Path((namespace, job)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<RunnerResponse>), ApiError> {
    if namespace != state.config.server.namespace {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("unknown namespace '{namespace}'"),
        ));
    }
    let job: JobName = job
        .parse()
        .map_err(|e: logwarden_core::CoreError| api_error(StatusCode::NOT_FOUND, e.to_string()))?;

    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(
            serde_json::from_slice(&body)
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}")))?,
        )
    };

    let response = state.jobs.run(job, payload, Utc::now()).await.into_response();
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct TickParams {
    pub at: Option<DateTime<Utc>>,
}

/// `POST /tick`: evaluate the cadence now (or at `?at=`) and dispatch.
pub async fn tick(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TickParams>,
) -> Json<TickSummary> {
    let now = params.at.unwrap_or_else(Utc::now);
    Json(state.dispatcher.tick(&state.cadence, now).await)
}
