//! Payload posted by the deployment pipeline after an end-to-end
//! verification run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct E2eReport {
    /// Run number or URL; GitHub sends either.
    pub workflow_run: Option<serde_json::Value>,
    pub environment: Option<String>,
    pub version: Option<String>,
    pub commit_sha: Option<String>,
    pub results: E2eResults,
    pub timestamp: Option<DateTime<Utc>>,
}

impl E2eReport {
    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or("unknown")
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("unknown")
    }

    pub fn passed(&self) -> bool {
        self.results.all_passed.unwrap_or(false)
    }

    /// Context carried into issue and log metadata.
    pub fn context(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert(
            "workflowRun".into(),
            self.workflow_run.clone().unwrap_or(serde_json::Value::Null),
        );
        map.insert("environment".into(), self.environment.clone().into());
        map.insert("version".into(), self.version.clone().into());
        map.insert("commitSha".into(), self.commit_sha.clone().into());
        map
    }
}

/// Individual check outcomes. Unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct E2eResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub green_health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub green_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_health: Option<bool>,
    #[serde(rename = "httpsGraphQL", skip_serializing_if = "Option::is_none")]
    pub https_graphql: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub haproxy_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub haproxy_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_tests: Option<EndpointTests>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointTests {
    pub failed: Vec<EndpointFailure>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointFailure {
    pub name: String,
    pub error: Option<String>,
}

/// One failed check extracted from [`E2eResults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eFailure {
    pub check: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl std::fmt::Display for E2eFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.check,
            self.message,
            self.details.as_deref().unwrap_or("no details")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipeline_payload_and_keeps_unknown_keys() {
        let report: E2eReport = serde_json::from_value(serde_json::json!({
            "workflowRun": 4711,
            "environment": "production",
            "version": "1.4.2",
            "commitSha": "abc123",
            "results": {
                "allPassed": false,
                "blueHealth": "down",
                "httpsGraphQL": false,
                "endpointTests": { "failed": [{ "name": "login", "error": "500" }], "passed": 3 },
                "durationMs": 5100
            }
        }))
        .unwrap();

        assert!(!report.passed());
        assert_eq!(report.results.blue_health.as_deref(), Some("down"));
        assert_eq!(report.results.https_graphql, Some(false));
        assert_eq!(report.results.extra["durationMs"], 5100);
        let tests = report.results.endpoint_tests.as_ref().unwrap();
        assert_eq!(tests.failed[0].name, "login");
        assert_eq!(report.context()["workflowRun"], 4711);
    }

    #[test]
    fn empty_body_is_a_non_passing_report() {
        let report: E2eReport = serde_json::from_str("{}").unwrap();
        assert!(!report.passed());
        assert_eq!(report.environment(), "unknown");
    }
}
