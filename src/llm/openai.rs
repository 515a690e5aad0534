//! OpenAI provider client and the chat-completions wire format.
//!
//! OpenRouter and LiteLLM speak the same wire format and reuse the request
//! and response types defined here with their own endpoints and headers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{FailureReason, ParsedResponse, ProviderId};

use super::client::{build_http_client, LlmClient};
use super::error_map;
use super::types::{ChatMessage, ChatRole, ProviderConfig, RequestOptions};

/// OpenAI chat-completions client.
pub struct OpenAiClient {
    config: ProviderConfig,
    http: Client,
}

impl OpenAiClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

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
impl LlmClient for OpenAiClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason> {
        let request = ChatCompletionRequest::new(model, messages, options);
        let url = format!("{}/v1/chat/completions", self.base_url());

        let builder = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&request);

        execute_chat_completion(builder, ProviderId::OpenAi, options).await
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::OpenAi
    }
}

// Chat-completions wire types, shared with the OpenAI-compatible providers.

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    /// Guided-decoding schema, honored by OpenRouter's open-source backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guided_json: Option<Value>,
}

impl<'a> ChatCompletionRequest<'a> {
    pub(crate) fn new(
        model: &'a str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Self {
        Self {
            model,
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            response_format: options.response_format.clone(),
            logprobs: options.logprobs,
            guided_json: None,
        }
    }

    pub(crate) fn with_guided_json(mut self, schema: Option<Value>) -> Self {
        self.guided_json = schema;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: Some(message.content.clone()),
            refusal: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    pub message: WireMessage,
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub logprobs: Option<WireLogprobs>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireLogprobs {
    #[serde(default)]
    pub content: Option<Vec<WireTokenLogprob>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTokenLogprob {
    pub token: String,
    pub logprob: f64,
}

/// Send a prepared chat-completions request and translate the outcome.
pub(crate) async fn execute_chat_completion(
    builder: reqwest::RequestBuilder,
    provider: ProviderId,
    options: &RequestOptions,
) -> Result<ParsedResponse, FailureReason> {
    let response = builder
        .send()
        .await
        .map_err(|e| error_map::classify_transport(provider, &e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| error_map::classify_transport(provider, &e))?;

    if !status.is_success() {
        return Err(error_map::classify_http(provider, status, &body));
    }

    let decoded: ChatCompletionResponse = serde_json::from_str(&body)
        .map_err(|e| error_map::malformed_body(provider, &e, &body))?;

    let choice = decoded.choices.into_iter().next().ok_or_else(|| {
        error_map::classify_http(provider, reqwest::StatusCode::OK, "no choices in response")
    })?;

    let content = choice.message.content.unwrap_or_default();

    if let Some(failure) = error_map::classify_finish(
        provider,
        choice.finish_reason.as_deref(),
        choice.message.refusal.as_deref(),
        &content,
    ) {
        return Err(failure);
    }

    // When structured output was requested, a well-behaved backend returns
    // pure JSON content; surface it as native structured data.
    let structured_data = if options.response_format.is_some() || options.guided_schema.is_some() {
        serde_json::from_str::<Value>(&content)
            .ok()
            .filter(Value::is_object)
    } else {
        None
    };

    let mut parsed = ParsedResponse::new(content);
    if let Some(data) = structured_data {
        parsed = parsed.with_structured_data(data);
    }

    if let Some(tokens) = choice.logprobs.and_then(|lp| lp.content) {
        let entries: Vec<Value> = tokens
            .iter()
            .map(|t| json!({"token": t.token, "logprob": t.logprob}))
            .collect();
        parsed = parsed.with_metadata("logprobs", Value::Array(entries));
    }

    Ok(parsed)
}
