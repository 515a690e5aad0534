//! Request types shared by all provider clients and parsing decorators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::AgentConfig;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// The closed set of per-request options.
///
/// Providers consume what they understand and ignore the rest.
/// `output_schema_id` is internal: parsing decorators resolve it against the
/// schema registry; it is never serialized into any wire request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub top_p: Option<f64>,
    /// Structured-output specifier for providers with server-side
    /// JSON-schema decoding (`response_format`).
    pub response_format: Option<Value>,
    /// Request token-level log probabilities.
    pub logprobs: Option<bool>,
    /// JSON schema for providers that enforce structure during token
    /// generation through a guided-decoding parameter.
    pub guided_schema: Option<Value>,
    /// Output schema id from the reasoning strategy; consumed only by
    /// parsing decorators.
    pub output_schema_id: Option<String>,
}

impl RequestOptions {
    /// Lift the model parameters of an agent config into request options.
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            temperature: config.temperature(),
            max_tokens: config.max_tokens(),
            top_p: config.top_p(),
            ..Self::default()
        }
    }

    pub fn with_output_schema_id(mut self, id: impl Into<String>) -> Self {
        self.output_schema_id = Some(id.into());
        self
    }
}

/// Connection settings for one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key; may be empty for local proxies.
    pub api_key: String,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_agent_config() {
        let config = AgentConfig::new("none", "gpt-4")
            .with_model_parameter("temperature", 0.2)
            .with_model_parameter("max_tokens", 256);

        let options = RequestOptions::from_agent_config(&config);
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.max_tokens, Some(256));
        assert_eq!(options.top_p, None);
        assert_eq!(options.response_format, None);
        assert_eq!(options.output_schema_id, None);
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new("sk-test")
            .with_base_url("https://proxy.internal")
            .with_timeout(30);

        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url.as_deref(), Some("https://proxy.internal"));
        assert_eq!(config.timeout_secs, 30);
    }
}
