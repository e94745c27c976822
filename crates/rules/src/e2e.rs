//! Turning an E2E verification report into failed checks and issues.

use logwarden_core::{Candidate, E2eFailure, E2eReport, E2eResults, LogId, Severity};

/// Source recorded on E2E-derived log entries and issues.
pub const E2E_SOURCE: &str = "e2e-verification";

/// Fallback type when a failed check has no specific mapping.
pub const E2E_FAILURE: &str = "e2e-failure";

const FALLBACK_RECOMMENDATION: &str =
    "Check deployment logs and infrastructure status. SSH to affected server for investigation.";

fn failure(check: impl Into<String>, message: impl Into<String>, details: Option<String>) -> E2eFailure {
    E2eFailure {
        check: check.into(),
        message: message.into(),
        details,
    }
}

/// Failed checks in a fixed order: node health, version, HTTPS, webhook,
/// HAProxy, then individual endpoints.
pub fn extract_failures(results: &E2eResults) -> Vec<E2eFailure> {
    let mut failures = Vec::new();

    if results.blue_health.as_deref() == Some("down") {
        failures.push(failure(
            "blue-health",
            "Blue node health check failed",
            results.blue_version.clone(),
        ));
    }
    if results.green_health.as_deref() == Some("down") {
        failures.push(failure(
            "green-health",
            "Green node health check failed",
            results.green_version.clone(),
        ));
    }
    if results.version_verified == Some(false) {
        failures.push(failure(
            "version-mismatch",
            "Deployed version does not match expected",
            Some(format!(
                "expected: {}, got: {}",
                results.expected_version.as_deref().unwrap_or("unknown"),
                results.deployed_version.as_deref().unwrap_or("unknown")
            )),
        ));
    }
    if results.https_health == Some(false) {
        failures.push(failure("https-health", "HTTPS health endpoint failed", None));
    }
    if results.https_graphql == Some(false) {
        failures.push(failure("https-graphql", "HTTPS GraphQL endpoint failed", None));
    }
    if results.webhook_status == Some(false) {
        failures.push(failure("webhook", "Webhook endpoint not accessible", None));
    }
    if results.haproxy_state.as_deref() == Some("error") {
        failures.push(failure(
            "haproxy",
            "HAProxy backend state error",
            results.haproxy_details.clone(),
        ));
    }
    if let Some(tests) = &results.endpoint_tests {
        for endpoint in &tests.failed {
            failures.push(failure(
                format!("endpoint-{}", endpoint.name),
                format!("Endpoint test failed: {}", endpoint.name),
                endpoint.error.clone(),
            ));
        }
    }

    failures
}

/// Issue type for a failed check.
pub fn map_failure_to_type(check: &str) -> &'static str {
    match check {
        "blue-health" | "green-health" | "https-health" => "e2e-health-check-failure",
        "version-mismatch" => "e2e-version-mismatch",
        "https-graphql" => "e2e-endpoint-failure",
        "webhook" => "e2e-webhook-failure",
        "haproxy" => "e2e-haproxy-routing",
        _ => E2E_FAILURE,
    }
}

/// Metadata attached to every issue raised for this run.
pub fn issue_metadata(report: &E2eReport, failures: &[E2eFailure]) -> Vec<(String, serde_json::Value)> {
    let mut meta: Vec<(String, serde_json::Value)> = report.context().into_iter().collect();
    meta.push((
        "failures".to_string(),
        serde_json::to_value(failures).unwrap_or(serde_json::Value::Null),
    ));
    meta
}

/// The single issue raised when the AI produced none: typed after the first
/// failed check.
pub fn fallback_candidate(
    report: &E2eReport,
    failures: &[E2eFailure],
    log_id: LogId,
) -> Option<Candidate> {
    let primary = failures.first()?;
    let mut candidate = Candidate::new(
        map_failure_to_type(&primary.check),
        Severity::High,
        format!("E2E verification failed: {}", primary.check),
        format!(
            "{} check(s) failed during deployment verification of {} v{}",
            failures.len(),
            report.environment(),
            report.version()
        ),
    )
    .source(E2E_SOURCE)
    .root_cause(primary.message.clone())
    .recommendation(FALLBACK_RECOMMENDATION)
    .affected_logs([log_id]);
    for (key, value) in issue_metadata(report, failures) {
        candidate = candidate.meta(key, value);
    }
    Some(candidate)
}
