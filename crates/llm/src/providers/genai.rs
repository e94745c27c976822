use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::provider::{LlmError, LlmProvider, Message};

/// OpenAI-compatible chat completions served by the GenAI agent.
pub struct GenAiProvider {
    client: reqwest::Client,
    agent_url: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl GenAiProvider {
    pub fn new(agent_url: String, api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            agent_url: agent_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/api/v1/chat/completions", self.agent_url)
    }

    fn request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "messages": api_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        if let Some(model) = &self.model {
            body["model"] = json!(model);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for GenAiProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = self.completions_url();
        let body = self.request_body(&messages, temperature, max_tokens);

        debug!("GenAI request to {}", url);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let resp: serde_json::Value = response.json().await?;
        // An empty reply is treated as "no issues" by the parser downstream.
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }
}
