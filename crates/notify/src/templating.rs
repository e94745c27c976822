//! Minijinja rendering for the daily digest and E2E failure reports.
//!
//! Templates are plain strings, so a fresh [`minijinja::Environment`] is
//! created per render call.

use serde::Serialize;

use logwarden_core::E2eFailure;

use crate::traits::{Notification, NotifyError};

pub const DIGEST_SUBJECT: &str =
    "[logwarden] Daily digest {{ date }}: {{ summary.errorRate }} errors, {{ summary.openIssues }} open issues";

pub const DIGEST_BODY: &str = "Daily Digest for {{ date }}

Logs (last 24h):       {{ summary.totalLogs }}
Errors:                {{ summary.errorLogs }} ({{ summary.errorRate }})
New open issues:       {{ summary.openIssues }}
Resolved issues:       {{ summary.resolvedIssues }}
{% if openIssues %}
Open issues:
{% for issue in openIssues %}- [{{ issue.severity | upper }}] {{ issue.title }} (x{{ issue.occurrences }})
{% endfor %}{% endif %}";

pub const E2E_ISSUE_TITLE: &str =
    "E2E Verification Failed - {{ environment }} v{{ version }} - {{ date }}";

pub const E2E_ISSUE_BODY: &str = "## E2E Verification Failure Report

**Workflow Run:** {{ workflowRun }}
**Environment:** {{ environment }}
**Version:** {{ version }}
**Commit:** {{ commitSha }}
**Time:** {{ time }}

### Failures

{% for f in failures %}- **{{ f.check }}**: {{ f.message }}{% if f.details %} ({{ f.details }}){% endif %}
{% endfor %}
### Full Results

<details>
<summary>Click to expand</summary>

```json
{{ resultsJson }}
```

</details>
";

/// Labels attached to E2E failure issues.
pub const E2E_ISSUE_LABELS: &str = "e2e-failure,automated,deployment";

/// Counts shown in the digest. Also returned as the digest job's body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestSummary {
    pub total_logs: u64,
    pub error_logs: u64,
    /// Percentage with two decimals, e.g. `"4.17%"`.
    pub error_rate: String,
    pub open_issues: u64,
    pub resolved_issues: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestIssueLine {
    pub severity: String,
    pub title: String,
    pub occurrences: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestContext {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub summary: DigestSummary,
    pub open_issues: Vec<DigestIssueLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct E2eIssueContext {
    pub workflow_run: String,
    pub environment: String,
    pub version: String,
    pub commit_sha: String,
    pub date: String,
    pub time: String,
    pub failures: Vec<E2eFailure>,
    pub results_json: String,
}

/// Renders notification templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("upper", upper_filter);
        env
    }

    /// Render a template string with any serializable context.
    pub fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check template syntax without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    pub fn digest(&self, ctx: &DigestContext) -> Result<Notification, NotifyError> {
        Ok(Notification::new(
            self.render(DIGEST_SUBJECT, ctx)?,
            self.render(DIGEST_BODY, ctx)?,
        )
        .with_meta("kind", "digest"))
    }

    pub fn e2e_issue(&self, ctx: &E2eIssueContext) -> Result<Notification, NotifyError> {
        Ok(Notification::new(
            self.render(E2E_ISSUE_TITLE, ctx)?,
            self.render(E2E_ISSUE_BODY, ctx)?,
        )
        .with_meta("kind", "e2e-failure")
        .with_meta("labels", E2E_ISSUE_LABELS))
    }
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}
