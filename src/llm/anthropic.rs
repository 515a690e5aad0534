//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::{FailureReason, ParsedResponse, ProviderId};

use super::client::{build_http_client, LlmClient};
use super::error_map;
use super::types::{ChatMessage, ChatRole, ProviderConfig, RequestOptions};

/// Anthropic Claude client.
pub struct AnthropicClient {
    config: ProviderConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";
    /// The Messages API requires max_tokens; applied when the config has none.
    const DEFAULT_MAX_TOKENS: u64 = 4096;

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

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason> {
        // System prompts are a top-level parameter in the Messages API.
        let system = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.clone())
            .reduce(|acc, s| format!("{}\n\n{}", acc, s));

        let api_messages: Vec<AnthropicMessage> = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| AnthropicMessage {
                role: match m.role {
                    ChatRole::Assistant => "assistant".to_string(),
                    _ => "user".to_string(),
                },
                content: m.content.clone(),
            })
            .collect();

        let request = AnthropicRequest {
            model: model.to_string(),
            messages: api_messages,
            max_tokens: options.max_tokens.unwrap_or(Self::DEFAULT_MAX_TOKENS),
            system,
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let url = format!("{}/v1/messages", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| error_map::classify_transport(ProviderId::Anthropic, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| error_map::classify_transport(ProviderId::Anthropic, &e))?;

        if !status.is_success() {
            return Err(error_map::classify_http(ProviderId::Anthropic, status, &body));
        }

        let decoded: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| error_map::malformed_body(ProviderId::Anthropic, &e, &body))?;

        let content = decoded
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if let Some(failure) = error_map::classify_finish(
            ProviderId::Anthropic,
            decoded.stop_reason.as_deref(),
            None,
            &content,
        ) {
            return Err(failure);
        }

        Ok(ParsedResponse::new(content))
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::Anthropic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joined_across_blocks() {
        let body = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "{\"answer\":"},
                {"type": "text", "text": "\"4\"}"}
            ],
            "stop_reason": "end_turn"
        }"#;

        let decoded: AnthropicResponse = serde_json::from_str(body).unwrap();
        let content: String = decoded
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect();
        assert_eq!(content, r#"{"answer":"4"}"#);
    }

    #[test]
    fn test_request_shape() {
        let request = AnthropicRequest {
            model: "claude-3-sonnet".to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            max_tokens: 1024,
            system: Some("be brief".to_string()),
            temperature: None,
            top_p: None,
        };
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], "be brief");
        assert!(body.get("temperature").is_none());
    }
}
