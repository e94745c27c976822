//! HTTP endpoint modules.
//!
//! Each sub-module owns a single responsibility area. Shared error types
//! live here.

mod agent;
mod health;
mod issues;
mod jobs;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub(crate) fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ── Re-exports ───────────────────────────────────────────────────

pub use agent::{get_runbook, search_github_issues, search_incidents};
pub use health::{health, schedule};
pub use issues::{list_issues, resolve_issue};
pub use jobs::{invoke_job, tick};
