//! Opens GitHub issues in the alerts repository and searches closed ones.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logwarden_core::config::GithubConfig;

use crate::traits::{Notification, Notifier, NotifyError};

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("logwarden/", env!("CARGO_PKG_VERSION"));

/// Files each notification as an issue in `owner/name`.
///
/// Labels come from the notification's `labels` metadata entry
/// (comma separated).
#[derive(Debug)]
pub struct GithubIssueNotifier {
    owner: String,
    repo: String,
    token: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Search bodies are cut to this many characters.
const SEARCH_BODY_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<SearchLabel>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    html_url: String,
    comments_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueComment {
    #[serde(default)]
    body: Option<String>,
}

/// A closed alerts-repo issue, with its last comment as the resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedIssue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub url: String,
    pub resolution: Option<String>,
}

impl GithubIssueNotifier {
    pub fn new(repo: &str, token: &str) -> Result<Self, NotifyError> {
        let (owner, name) = repo
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| {
                NotifyError::Config(format!("ALERTS_REPO must be owner/name, got '{repo}'"))
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            owner: owner.to_string(),
            repo: name.to_string(),
            token: token.to_string(),
            api_base: GITHUB_API.to_string(),
            client,
        })
    }

    pub fn from_config(config: &GithubConfig) -> Result<Self, NotifyError> {
        match (&config.alerts_repo, &config.token) {
            (Some(repo), Some(token)) => Self::new(repo, token),
            _ => Err(NotifyError::Config("ALERTS_REPO and GH_TOKEN must be set".into())),
        }
    }

    /// Point at a different API host (GitHub Enterprise).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn issues_url(&self) -> String {
        format!("{}/repos/{}/{}/issues", self.api_base, self.owner, self.repo)
    }

    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn search_request(&self, keywords: &str, limit: usize) -> reqwest::RequestBuilder {
        let query = format!("repo:{} is:issue is:closed {}", self.repo_slug(), keywords.trim());
        let per_page = limit.to_string();
        self.client
            .get(format!("{}/search/issues", self.api_base))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .query(&[
                ("q", query.as_str()),
                ("per_page", per_page.as_str()),
                ("sort", "updated"),
                ("order", "desc"),
            ])
    }

    /// Closed issues in the alerts repo matching `keywords`, most recently
    /// updated first.
    pub async fn search_issues(
        &self,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<ClosedIssue>, NotifyError> {
        let response = self.search_request(keywords, limit).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                channel: "github",
                status: status.as_u16(),
                body,
            });
        }

        let page: SearchPage = response.json().await?;
        let mut issues = Vec::with_capacity(page.items.len());
        for item in page.items {
            let resolution = self.last_comment(&item.comments_url).await;
            issues.push(ClosedIssue {
                number: item.number,
                title: item.title,
                body: item
                    .body
                    .unwrap_or_default()
                    .chars()
                    .take(SEARCH_BODY_CHARS)
                    .collect(),
                labels: item.labels.into_iter().map(|l| l.name).collect(),
                closed_at: item.closed_at,
                url: item.html_url,
                resolution,
            });
        }
        tracing::debug!(repo = %self.repo_slug(), found = issues.len(), "GitHub issues searched");
        Ok(issues)
    }

    async fn last_comment(&self, comments_url: &str) -> Option<String> {
        let result = async {
            let comments: Vec<IssueComment> = self
                .client
                .get(comments_url)
                .bearer_auth(&self.token)
                .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok::<_, reqwest::Error>(comments.into_iter().last().and_then(|c| c.body))
        }
        .await;
        result.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "issue comments unavailable");
            None
        })
    }

    pub async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<CreatedIssue, NotifyError> {
        let response = self
            .client
            .post(self.issues_url())
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .json(&serde_json::json!({
                "title": title,
                "body": body,
                "labels": labels,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                channel: "github",
                status: status.as_u16(),
                body,
            });
        }

        let issue: CreatedIssue = response.json().await?;
        tracing::info!(
            repo = %self.repo_slug(),
            number = issue.number,
            "GitHub issue created"
        );
        Ok(issue)
    }
}

fn labels_from(notification: &Notification) -> Vec<String> {
    notification
        .metadata
        .get("labels")
        .map(|raw| {
            raw.split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Notifier for GithubIssueNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.create_issue(
            &notification.subject,
            &notification.body,
            &labels_from(notification),
        )
        .await
        .map(|_| ())
    }

    fn channel_name(&self) -> &str {
        "github"
    }
}
