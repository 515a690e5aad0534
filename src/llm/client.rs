//! The provider-agnostic client interface.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::domain::{FailureReason, ParsedResponse, ProviderId};

use super::types::{ChatMessage, RequestOptions};

/// The single LLM operation the core consumes.
///
/// Implementations translate external API responses and errors into
/// [`ParsedResponse`] and [`FailureReason`] before returning; no SDK or HTTP
/// type escapes this trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one chat completion.
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason>;

    /// Which provider this client (or its innermost delegate) talks to.
    fn provider_id(&self) -> ProviderId;
}

/// Build the HTTP client a provider uses for the lifetime of a run.
///
/// Construction can fail on hosts with broken TLS or proxy setups; that is a
/// deployment problem, so it surfaces as a configuration failure instead of
/// a panic.
pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client, FailureReason> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| {
            FailureReason::configuration(format!("Could not initialize the HTTP client: {}", e))
        })
}
