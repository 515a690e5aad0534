//! OpenRouter provider client.
//!
//! OpenRouter is OpenAI-compatible on the wire; it additionally routes to
//! open-source backends that accept a guided-decoding schema (`guided_json`)
//! for constrained generation.

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::{FailureReason, ParsedResponse, ProviderId};

use super::client::{build_http_client, LlmClient};
use super::openai::{execute_chat_completion, ChatCompletionRequest};
use super::types::{ChatMessage, ProviderConfig, RequestOptions};

/// OpenRouter client.
pub struct OpenRouterClient {
    config: ProviderConfig,
    http: Client,
}

impl OpenRouterClient {
    const DEFAULT_BASE_URL: &'static str = "https://openrouter.ai/api";

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
impl LlmClient for OpenRouterClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason> {
        let request = ChatCompletionRequest::new(model, messages, options)
            .with_guided_json(options.guided_schema.clone());
        let url = format!("{}/v1/chat/completions", self.base_url());

        let builder = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&request);

        execute_chat_completion(builder, ProviderId::OpenRouter, options).await
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::OpenRouter
    }
}
