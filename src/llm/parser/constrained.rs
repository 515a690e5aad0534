//! Constrained-decoding structured-output decorator.
//!
//! For providers that enforce a schema during token generation through a
//! guided-decoding hook distinct from `response_format`. The schema rides on
//! the request as a provider parameter; the prompt text is untouched.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::{FailureReason, ParsedResponse, ParsingStrategyId, ProviderId};
use crate::llm::client::LlmClient;
use crate::llm::types::{ChatMessage, RequestOptions};
use crate::schema::SchemaRegistry;

use super::{resolve_schema, validate_candidate, ParseStage, ParserError};

/// Decorator enforcing the structured-output contract via guided decoding.
pub struct ConstrainedParser {
    inner: Arc<dyn LlmClient>,
    schemas: SchemaRegistry,
}

impl ConstrainedParser {
    pub fn new(inner: Arc<dyn LlmClient>, schemas: SchemaRegistry) -> Self {
        Self { inner, schemas }
    }
}

#[async_trait]
impl LlmClient for ConstrainedParser {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason> {
        let schema = resolve_schema(
            &self.schemas,
            options.output_schema_id.as_deref(),
            ParsingStrategyId::Constrained,
        )?;

        let mut options = options.clone();
        options.guided_schema = Some(schema.to_json_schema());

        let mut response = self.inner.chat_completion(model, messages, &options).await?;

        let error = |stage: ParseStage| {
            ParserError::new(
                ParsingStrategyId::Constrained,
                self.inner.provider_id(),
                model,
                stage,
                response.content.clone(),
            )
        };

        if response.is_blank() {
            return Err(error(ParseStage::ResponseEmpty).into());
        }

        let data = match response.structured_data.clone() {
            Some(data) => data,
            None => serde_json::from_str::<Value>(&response.content)
                .map_err(|e| error(ParseStage::JsonParse).with_original_error(e))?,
        };

        validate_candidate(&schema, &data, error(ParseStage::SchemaValidation))?;
        response.structured_data = Some(data);
        Ok(response)
    }

    fn provider_id(&self) -> ProviderId {
        self.inner.provider_id()
    }
}
