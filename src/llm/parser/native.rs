//! Native structured-output decorator.
//!
//! For providers with server-side JSON-schema constrained decoding: injects
//! `response_format` before the call, validates the returned object after.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::domain::{FailureReason, ParsedResponse, ParsingStrategyId, ProviderId};
use crate::llm::client::LlmClient;
use crate::llm::types::{ChatMessage, RequestOptions};
use crate::schema::SchemaRegistry;

use super::{resolve_schema, validate_candidate, ParseStage, ParserError};

/// Decorator enforcing the structured-output contract via `response_format`.
pub struct NativeParser {
    inner: Arc<dyn LlmClient>,
    schemas: SchemaRegistry,
}

impl NativeParser {
    pub fn new(inner: Arc<dyn LlmClient>, schemas: SchemaRegistry) -> Self {
        Self { inner, schemas }
    }
}

#[async_trait]
impl LlmClient for NativeParser {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason> {
        let schema = resolve_schema(
            &self.schemas,
            options.output_schema_id.as_deref(),
            ParsingStrategyId::Native,
        )?;

        let mut options = options.clone();
        options.response_format = Some(json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.id.clone(),
                "schema": schema.to_json_schema(),
                "strict": true,
            },
        }));
        if options.logprobs.is_none() {
            options.logprobs = Some(true);
        }

        let mut response = self.inner.chat_completion(model, messages, &options).await?;

        let error = |stage: ParseStage| {
            ParserError::new(
                ParsingStrategyId::Native,
                self.inner.provider_id(),
                model,
                stage,
                response.content.clone(),
            )
        };

        if response.is_blank() {
            return Err(error(ParseStage::ResponseEmpty).into());
        }

        match response.structured_data.clone() {
            Some(data) => {
                validate_candidate(&schema, &data, error(ParseStage::SchemaValidation))?;
            }
            None => {
                // Constrained decoding should have produced JSON content;
                // fall back to parsing it ourselves.
                let data: Value = serde_json::from_str(&response.content).map_err(|e| {
                    error(ParseStage::StructuredDataMissing).with_original_error(e)
                })?;
                validate_candidate(&schema, &data, error(ParseStage::SchemaValidation))?;
                response.structured_data = Some(data);
            }
        }

        if let Some(confidence) = confidence_from_logprobs(&response) {
            response
                .metadata
                .insert("confidence".to_string(), json!(confidence));
        }

        Ok(response)
    }

    fn provider_id(&self) -> ProviderId {
        self.inner.provider_id()
    }
}

/// Best-effort confidence: geometric mean of token probabilities.
///
/// Absent logprobs yields no score; that is never an error.
fn confidence_from_logprobs(response: &ParsedResponse) -> Option<f64> {
    let tokens = response.metadata.get("logprobs")?.as_array()?;
    if tokens.is_empty() {
        return None;
    }

    let mut sum = 0.0;
    for token in tokens {
        sum += token.get("logprob")?.as_f64()?;
    }
    Some((sum / tokens.len() as f64).exp())
}
