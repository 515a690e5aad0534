//! LiteLLM proxy client.
//!
//! A LiteLLM deployment exposes the OpenAI chat-completions surface in front
//! of arbitrary upstream models. The base URL comes from deployment config;
//! the key may be empty for unauthenticated local proxies.

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::{FailureReason, ParsedResponse, ProviderId};

use super::client::{build_http_client, LlmClient};
use super::openai::{execute_chat_completion, ChatCompletionRequest};
use super::types::{ChatMessage, ProviderConfig, RequestOptions};

/// LiteLLM proxy client.
pub struct LiteLlmClient {
    config: ProviderConfig,
    http: Client,
}

impl LiteLlmClient {
    const DEFAULT_BASE_URL: &'static str = "http://localhost:4000";

    pub fn new(config: ProviderConfig) -> Result<Self, FailureReason> {
        let http = build_http_client(config.timeout_secs)?;
        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl LlmClient for LiteLlmClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason> {
        let request = ChatCompletionRequest::new(model, messages, options);
        let url = format!("{}/v1/chat/completions", self.base_url());

        let mut builder = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .json(&request);

        if !self.config.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.config.api_key));
        }

        execute_chat_completion(builder, ProviderId::LiteLlm, options).await
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::LiteLlm
    }
}
