//! Generic HTTP webhook notifier.
//!
//! Delivers notifications as JSON payloads to a configured URL with
//! optional custom headers.

use std::collections::HashMap;
use std::time::Duration;

use crate::traits::{Notification, Notifier, NotifyError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers notifications as JSON over HTTP to a configured endpoint.
///
/// The payload carries `subject`, `body` and `metadata`, plus a `text` field
/// joining subject and body for chat-style receivers. Environment variable
/// references (`${VAR_NAME}`) in the URL and header values are resolved at
/// construction time.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(
        url: &str,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let resolved_url = resolve_env_vars(url)?;

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            url: resolved_url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers: resolved_headers,
            client,
        })
    }

    /// POST webhook without custom headers.
    pub fn post(url: &str) -> Result<Self, NotifyError> {
        Self::new(url, None, HashMap::new())
    }

    fn payload(notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "subject": notification.subject,
            "body": notification.body,
            "metadata": notification.metadata,
            "text": format!("{}\n\n{}", notification.subject, notification.body),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .json(&Self::payload(notification));

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Rejected {
                channel: "webhook",
                status: status.as_u16(),
                body: body_text,
            });
        }

        tracing::debug!(
            url = %self.url,
            method = %self.method,
            status = %status,
            "webhook notification delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                NotifyError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_substitutes() {
        std::env::set_var("LW_WEBHOOK_TEST_HOST", "hooks.example.com");
        let result = resolve_env_vars("https://${LW_WEBHOOK_TEST_HOST}/digest").unwrap();
        assert_eq!(result, "https://hooks.example.com/digest");
        std::env::remove_var("LW_WEBHOOK_TEST_HOST");
    }

    #[test]
    fn resolve_env_vars_missing_or_unclosed() {
        match resolve_env_vars("https://${LW_ABSOLUTELY_NOT_SET_12345}/hook").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("LW_ABSOLUTELY_NOT_SET_12345")),
            other => panic!("expected Config error, got: {other:?}"),
        }
        match resolve_env_vars("https://${UNCLOSED/hook").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("unclosed")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_vars_plain_url_unchanged() {
        let result = resolve_env_vars("https://plain.example.com/hook").unwrap();
        assert_eq!(result, "https://plain.example.com/hook");
    }

    #[test]
    fn post_defaults() {
        let notifier = WebhookNotifier::post("https://example.com/hook").unwrap();
        assert_eq!(notifier.method, reqwest::Method::POST);
        assert!(notifier.headers.is_empty());
        assert_eq!(notifier.channel_name(), "webhook");
    }

    #[test]
    fn header_values_resolve_env() {
        std::env::set_var("LW_WT_API_KEY", "secret-key-123");
        let headers = HashMap::from([
            ("X-Api-Key".to_string(), "${LW_WT_API_KEY}".to_string()),
            ("X-Static".to_string(), "fixed-value".to_string()),
        ]);
        let notifier = WebhookNotifier::new("https://example.com", None, headers).unwrap();
        assert_eq!(notifier.headers["X-Api-Key"], "secret-key-123");
        assert_eq!(notifier.headers["X-Static"], "fixed-value");
        std::env::remove_var("LW_WT_API_KEY");
    }

    #[test]
    fn payload_has_text_field() {
        let n = Notification::new("Daily digest", "12 errors").with_meta("kind", "digest");
        let payload = WebhookNotifier::payload(&n);
        assert_eq!(payload["text"], "Daily digest\n\n12 errors");
        assert_eq!(payload["metadata"]["kind"], "digest");
    }
}
