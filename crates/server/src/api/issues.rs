//! Issue listing and manual resolution.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use logwarden_core::{IssueStatus, LogIssue};

use crate::state::AppState;

use super::{api_error, internal, ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_issues(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<LogIssue>>, ApiError> {
    let status = match params.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(s) => Some(
            s.parse::<IssueStatus>()
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        ),
    };
    let limit = params.limit.unwrap_or(50).min(500);
    state
        .store()
        .list_issues(status, limit)
        .await
        .map(Json)
        .map_err(internal)
}

pub async fn resolve_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LogIssue>, ApiError> {
    match state.store().resolve_issue(id, Utc::now()).await {
        Ok(Some(issue)) => {
            tracing::info!(id = %issue.id, issue_type = %issue.issue_type, "issue resolved");
            Ok(Json(issue))
        }
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, format!("issue {id} not found"))),
        Err(e) => Err(internal(e)),
    }
}
