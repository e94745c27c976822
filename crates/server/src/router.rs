//! HTTP router construction.
//!
//! Assembles all Axum routes and middleware into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            tracing::warn!(origin, "invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
    }
}

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/health", get(api::health))
        .route("/schedule", get(api::schedule))
        .route("/tick", post(api::tick))
        .route("/issues", get(api::list_issues))
        .route("/issues/{id}/resolve", post(api::resolve_issue))
        // Agent helpers: static first segments win over the job route below.
        .route("/runbooks/{issue_type}", get(api::get_runbook))
        .route("/incidents/search", get(api::search_incidents))
        .route("/github-issues/search", get(api::search_github_issues))
        .route("/{namespace}/{job}", post(api::invoke_job))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
