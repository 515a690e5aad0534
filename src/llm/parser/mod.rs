//! Structured-output parsing decorators.
//!
//! Each decorator wraps an underlying [`LlmClient`](super::LlmClient) and
//! enforces the structured-output contract: the returned response carries
//! `structured_data` conforming to the schema named by the request's
//! `output_schema_id`. Parse failures are an internal [`ParserError`] that is
//! translated into a [`FailureReason`] before leaving the decorator; nothing
//! above the access layer ever sees it.

mod constrained;
mod native;
mod post_process;

pub use constrained::ConstrainedParser;
pub use native::NativeParser;
pub use post_process::PostProcessParser;

use std::sync::Arc;

use serde_json::Value;

use crate::domain::{FailureCategory, FailureReason, ParsingStrategyId, ProviderId};
use crate::schema::{OutputSchema, SchemaRegistry};

use super::error_map::truncate;

const CONTENT_PREVIEW_LEN: usize = 200;

/// Where in the parsing pipeline a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// Content is empty or all whitespace.
    ResponseEmpty,
    /// Content did not parse as JSON.
    JsonParse,
    /// Parsed object does not match the schema.
    SchemaValidation,
    /// Native decoder returned no structured data and the content fallback
    /// also failed.
    StructuredDataMissing,
}

impl std::fmt::Display for ParseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ResponseEmpty => "response_empty",
            Self::JsonParse => "json_parse",
            Self::SchemaValidation => "schema_validation",
            Self::StructuredDataMissing => "structured_data_missing",
        };
        write!(f, "{}", s)
    }
}

/// Internal parse failure. Never crosses the client trait boundary.
#[derive(Debug, Clone)]
pub(crate) struct ParserError {
    pub parser_type: ParsingStrategyId,
    pub provider_id: ProviderId,
    pub model_name: String,
    pub stage: ParseStage,
    pub content: String,
    pub original_error: Option<String>,
}

impl ParserError {
    pub(crate) fn new(
        parser_type: ParsingStrategyId,
        provider_id: ProviderId,
        model_name: impl Into<String>,
        stage: ParseStage,
        content: impl Into<String>,
    ) -> Self {
        Self {
            parser_type,
            provider_id,
            model_name: model_name.into(),
            stage,
            content: content.into(),
            original_error: None,
        }
    }

    pub(crate) fn with_original_error(mut self, err: impl ToString) -> Self {
        self.original_error = Some(err.to_string());
        self
    }
}

impl From<ParserError> for FailureReason {
    fn from(err: ParserError) -> Self {
        let mut details = format!(
            "parser: {}\nprovider: {}\nmodel: {}\nstage: {}\ncontent: {}",
            err.parser_type,
            err.provider_id,
            err.model_name,
            err.stage,
            truncate(&err.content, CONTENT_PREVIEW_LEN),
        );
        if let Some(original) = &err.original_error {
            details.push_str(&format!("\noriginal error: {}", original));
        }

        FailureReason::new(
            FailureCategory::ParsingError,
            format!("{} failed at {}", err.parser_type, err.stage),
            details,
        )
        .with_recoverable(false)
    }
}

/// Resolve the schema named by the request options.
pub(crate) fn resolve_schema(
    schemas: &SchemaRegistry,
    schema_id: Option<&str>,
    parser: ParsingStrategyId,
) -> Result<Arc<OutputSchema>, FailureReason> {
    let id = schema_id.ok_or_else(|| {
        FailureReason::configuration(format!(
            "{} parser requires an output schema id on the request",
            parser
        ))
    })?;
    schemas.get(id).ok_or_else(|| {
        FailureReason::configuration(format!("Unknown output schema id '{}'", id))
    })
}

/// Validate a candidate object, producing the schema_validation stage error.
pub(crate) fn validate_candidate(
    schema: &OutputSchema,
    candidate: &Value,
    err: ParserError,
) -> Result<(), ParserError> {
    schema.validate(candidate).map_err(|violations| {
        let joined = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        err.with_original_error(joined)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(ParseStage::ResponseEmpty.to_string(), "response_empty");
        assert_eq!(ParseStage::JsonParse.to_string(), "json_parse");
        assert_eq!(ParseStage::SchemaValidation.to_string(), "schema_validation");
        assert_eq!(
            ParseStage::StructuredDataMissing.to_string(),
            "structured_data_missing"
        );
    }

    #[test]
    fn test_parser_error_to_failure_reason() {
        let err = ParserError::new(
            ParsingStrategyId::Native,
            ProviderId::OpenAi,
            "gpt-4",
            ParseStage::JsonParse,
            "not json at all",
        )
        .with_original_error("expected value at line 1");

        let reason: FailureReason = err.into();
        assert_eq!(reason.category, FailureCategory::ParsingError);
        assert!(!reason.recoverable);
        assert_eq!(reason.description, "native failed at json_parse");
        assert!(reason.technical_details.contains("provider: openai"));
        assert!(reason.technical_details.contains("model: gpt-4"));
        assert!(reason.technical_details.contains("not json at all"));
        assert!(reason.technical_details.contains("expected value"));
    }

    #[test]
    fn test_failure_details_truncate_long_content() {
        let long = "x".repeat(1000);
        let err = ParserError::new(
            ParsingStrategyId::PostProcess,
            ProviderId::Anthropic,
            "claude-3-sonnet",
            ParseStage::JsonParse,
            long,
        );
        let reason: FailureReason = err.into();
        // 200 chars of content plus ellipsis, not the full kilobyte.
        assert!(reason.technical_details.len() < 600);
        assert!(reason.technical_details.contains("..."));
    }

    #[test]
    fn test_resolve_schema_requires_id() {
        let schemas = SchemaRegistry::builtin();
        let err =
            resolve_schema(&schemas, None, ParsingStrategyId::Native).unwrap_err();
        assert_eq!(err.category, FailureCategory::ConfigurationError);

        let err = resolve_schema(&schemas, Some("nope"), ParsingStrategyId::Native).unwrap_err();
        assert!(err.description.contains("nope"));

        assert!(resolve_schema(&schemas, Some("direct_answer"), ParsingStrategyId::Native).is_ok());
    }
}
