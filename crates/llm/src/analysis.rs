//! Prompting the GenAI agent for issues and reading its answer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use logwarden_core::config::GenAiConfig;
use logwarden_core::{Candidate, E2eFailure, E2eReport, LogEntry, Severity};

use crate::provider::{LlmError, LlmProvider, Message};

const LOG_ANALYSIS_PROMPT: &str = "You are a log analysis assistant for a blue/green deployed web application.

Review the log entries and report concrete operational problems only. Ignore noise.

Return a JSON object with an \"issues\" array containing objects with:
- type: short kebab-case identifier (e.g. high-error-rate, connection-failure, memory-warning)
- severity: low/medium/high/critical
- title: brief summary
- description: what is happening and why it matters
- rootCause: likely cause
- recommendation: specific next steps

Return {\"issues\": []} when nothing needs attention.";

const E2E_ANALYSIS_PROMPT: &str = "You are an E2E deployment verification analyst.

Helpers available to operators:
- get_runbook(issue_type) for e2e-health-check-failure, e2e-version-mismatch, e2e-webhook-failure, e2e-haproxy-routing, high-error-rate, connection-failure
- search_incidents(keywords) for similar resolved incidents
- search_github_issues(keywords) for closed alert issues and how they were resolved

Analyze the E2E test failures and provide actionable remediation steps.

Return a JSON object with an \"issues\" array containing objects with:
- type: e2e-health-check-failure | e2e-version-mismatch | e2e-webhook-failure | e2e-haproxy-routing | e2e-endpoint-failure
- severity: low/medium/high/critical
- title: brief summary
- description: what failed and why it matters
- rootCause: likely cause based on failure pattern
- recommendation: specific steps to remediate";

/// One issue as reported by the agent. Every field is optional; callers
/// fill gaps through [`AiIssue::into_candidate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiIssue {
    #[serde(rename = "type")]
    pub issue_type: Option<String>,
    pub severity: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub root_cause: Option<String>,
    pub recommendation: Option<String>,
}

impl AiIssue {
    /// Build a candidate, falling back to the given type, severity and title
    /// when the agent left them out or sent something unparseable.
    pub fn into_candidate(
        self,
        default_type: &str,
        default_severity: Severity,
        default_title: &str,
        source: &str,
    ) -> Candidate {
        let issue_type = self
            .issue_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_type.to_string());
        let severity = self
            .severity
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_severity);
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_title.to_string());

        let mut candidate = Candidate::new(
            issue_type,
            severity,
            title,
            self.description.unwrap_or_default(),
        )
        .source(source);
        candidate.root_cause = self.root_cause;
        candidate.recommendation = self.recommendation;
        candidate
    }
}

/// Asks the agent about log batches and E2E failures.
pub struct IssueAnalyzer {
    provider: Box<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
    analysis_timeout: Duration,
    e2e_timeout: Duration,
}

impl IssueAnalyzer {
    pub fn new(provider: Box<dyn LlmProvider>, config: &GenAiConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            analysis_timeout: config.analysis_timeout(),
            e2e_timeout: config.e2e_timeout(),
        }
    }

    /// Build from config, or `NotConfigured` without an agent URL.
    pub fn from_config(config: &GenAiConfig) -> Result<Self, LlmError> {
        let provider = crate::providers::create_provider(config)?;
        Ok(Self::new(provider, config))
    }

    pub async fn analyze_logs(&self, entries: &[LogEntry]) -> Result<Vec<AiIssue>, LlmError> {
        let mut listing = String::new();
        for entry in entries {
            listing.push_str(&format!(
                "[{}] {} {}: {}\n",
                entry.timestamp.to_rfc3339(),
                entry.level.as_str().to_uppercase(),
                entry.source,
                entry.message
            ));
        }
        let user = format!(
            "Analyze these {} log entries:\n\n{}",
            entries.len(),
            listing
        );

        info!(entries = entries.len(), "requesting log analysis");
        let reply = self
            .ask(LOG_ANALYSIS_PROMPT, user, self.analysis_timeout)
            .await?;
        Ok(parse_issues(&reply))
    }

    pub async fn analyze_e2e(
        &self,
        report: &E2eReport,
        failures: &[E2eFailure],
    ) -> Result<Vec<AiIssue>, LlmError> {
        let failure_lines: Vec<String> = failures.iter().map(|f| format!("- {f}")).collect();
        let results = serde_json::to_string_pretty(&report.results)
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        let user = format!(
            "Analyze these E2E verification failures:\n\n\
             Environment: {}\nExpected Version: {}\nCommit: {}\n\n\
             Failures:\n{}\n\nFull results:\n{}",
            report.environment(),
            report.version(),
            report.commit_sha.as_deref().unwrap_or("unknown"),
            failure_lines.join("\n"),
            results
        );

        info!(failures = failures.len(), "requesting E2E failure analysis");
        let reply = self.ask(E2E_ANALYSIS_PROMPT, user, self.e2e_timeout).await?;
        Ok(parse_issues(&reply))
    }

    async fn ask(
        &self,
        system: &str,
        user: String,
        limit: Duration,
    ) -> Result<String, LlmError> {
        let messages = vec![Message::system(system), Message::user(user)];
        let reply = tokio::time::timeout(
            limit,
            self.provider
                .complete(messages, self.temperature, self.max_tokens),
        )
        .await
        .map_err(|_| LlmError::Timeout(limit))??;
        debug!("LLM response: {}", reply);
        Ok(reply)
    }
}

/// Read the `issues` array out of an agent reply.
///
/// Replies may be wrapped in markdown fences or prose. Anything that does not
/// yield an `issues` array is treated as "no issues"; array elements that are
/// not objects are skipped.
pub fn parse_issues(reply: &str) -> Vec<AiIssue> {
    let json_str = extract_json(reply);
    let value: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse GenAI response: {e}");
            return Vec::new();
        }
    };
    let Some(items) = value.get("issues").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

/// Strip fences, then take the outermost `{ ... }` span.
fn extract_json(response: &str) -> &str {
    let mut trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        trimmed = rest.trim_start();
    }
    if let Some(rest) = trimmed.strip_suffix("```") {
        trimmed = rest.trim_end();
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
