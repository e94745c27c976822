pub mod genai;

use logwarden_core::config::GenAiConfig;

use crate::provider::{LlmError, LlmProvider};

/// Build the GenAI agent provider, or `NotConfigured` when no agent URL is set.
pub fn create_provider(config: &GenAiConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
    let agent_url = config
        .agent_url
        .as_deref()
        .ok_or_else(|| LlmError::NotConfigured("GENAI_AGENT_URL not set".into()))?;
    Ok(Box::new(genai::GenAiProvider::new(
        agent_url.to_string(),
        config.api_key.clone(),
        config.model.clone(),
    )))
}
