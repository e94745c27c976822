//! Lookups the AI agent calls while analyzing: runbooks, past incidents and
//! closed GitHub issues.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logwarden_notify::github::ClosedIssue;
use logwarden_notify::NotifyError;

use crate::state::AppState;

use super::{api_error, internal, ApiError};

#[derive(Debug, Serialize, PartialEq)]
pub struct RunbookResponse {
    pub runbook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Issue types are kebab-case identifiers; anything else could escape the
/// runbook directory.
fn valid_issue_type(issue_type: &str) -> bool {
    !issue_type.is_empty()
        && issue_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

pub async fn get_runbook(
    State(state): State<Arc<AppState>>,
    Path(issue_type): Path<String>,
) -> Result<Json<RunbookResponse>, ApiError> {
    if !valid_issue_type(&issue_type) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid issue type '{issue_type}'"),
        ));
    }
    let path = state.runbooks_dir.join(format!("{issue_type}.md"));
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            tracing::debug!(issue_type = %issue_type, chars = content.len(), "runbook served");
            Ok(Json(RunbookResponse {
                runbook: Some(content),
                message: None,
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Json(RunbookResponse {
            runbook: None,
            message: Some(format!("No runbook for {issue_type}")),
        })),
        Err(e) => Err(internal(e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct IncidentParams {
    pub keywords: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub title: String,
    pub root_cause: Option<String>,
    pub recommendation: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct IncidentsResponse {
    pub incidents: Vec<Incident>,
}

/// Non-blank keywords and a limit clamped to `1..=50`.
fn search_terms(params: IncidentParams) -> Result<(String, usize), ApiError> {
    let keywords = params
        .keywords
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "keywords parameter required"))?;
    Ok((keywords, params.limit.unwrap_or(5).clamp(1, 50)))
}

pub async fn search_incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IncidentParams>,
) -> Result<Json<IncidentsResponse>, ApiError> {
    let (keywords, limit) = search_terms(params)?;

    let issues = state
        .store()
        .search_resolved(keywords.trim(), limit)
        .await
        .map_err(internal)?;
    Ok(Json(IncidentsResponse {
        incidents: issues
            .into_iter()
            .map(|i| Incident {
                issue_type: i.issue_type,
                title: i.title,
                root_cause: i.root_cause,
                recommendation: i.recommendation,
                resolved_at: i.resolved_at,
            })
            .collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct GithubIssuesResponse {
    pub issues: Vec<ClosedIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn search_github_issues(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IncidentParams>,
) -> Result<Json<GithubIssuesResponse>, ApiError> {
    let (keywords, limit) = search_terms(params)?;
    let Some(github) = state.jobs.github.as_ref() else {
        return Ok(Json(GithubIssuesResponse {
            issues: Vec::new(),
            message: Some("GitHub not configured".into()),
            error: None,
        }));
    };

    match github.search_issues(&keywords, limit).await {
        Ok(issues) => Ok(Json(GithubIssuesResponse {
            issues,
            message: None,
            error: None,
        })),
        Err(NotifyError::Rejected { status, .. }) => {
            tracing::warn!(status, "GitHub issue search rejected");
            Ok(Json(GithubIssuesResponse {
                issues: Vec::new(),
                message: None,
                error: Some(format!("GitHub API error: {status}")),
            }))
        }
        Err(e) => Err(api_error(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}
