//! Post-processing structured-output decorator.
//!
//! For providers without native structured output. The underlying call is
//! delegated untouched — the strategy's prompt goes out verbatim, with no
//! schema instructions added anywhere. Structure is recovered afterwards by
//! a deterministic extractor.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::domain::{FailureReason, ParsedResponse, ParsingStrategyId, ProviderId};
use crate::llm::client::LlmClient;
use crate::llm::types::{ChatMessage, RequestOptions};
use crate::schema::{FieldKind, OutputSchema, SchemaRegistry};

use super::{resolve_schema, ParseStage, ParserError};

/// Decorator recovering structure from free-form responses.
pub struct PostProcessParser {
    inner: Arc<dyn LlmClient>,
    schemas: SchemaRegistry,
}

impl PostProcessParser {
    pub fn new(inner: Arc<dyn LlmClient>, schemas: SchemaRegistry) -> Self {
        Self { inner, schemas }
    }
}

#[async_trait]
impl LlmClient for PostProcessParser {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ParsedResponse, FailureReason> {
        let schema = resolve_schema(
            &self.schemas,
            options.output_schema_id.as_deref(),
            ParsingStrategyId::PostProcess,
        )?;

        // Delegated unchanged: same messages, same options.
        let mut response = self.inner.chat_completion(model, messages, options).await?;

        let error = |stage: ParseStage| {
            ParserError::new(
                ParsingStrategyId::PostProcess,
                self.inner.provider_id(),
                model,
                stage,
                response.content.clone(),
            )
        };

        if response.is_blank() {
            return Err(error(ParseStage::ResponseEmpty).into());
        }

        match extract_structured(&response.content, &schema) {
            Extraction::Valid(data) => {
                response.structured_data = Some(data);
                Ok(response)
            }
            Extraction::Invalid(violations) => Err(error(ParseStage::SchemaValidation)
                .with_original_error(violations)
                .into()),
            Extraction::NoJson(detail) => Err(error(ParseStage::JsonParse)
                .with_original_error(detail)
                .into()),
        }
    }

    fn provider_id(&self) -> ProviderId {
        self.inner.provider_id()
    }
}

enum Extraction {
    Valid(Value),
    /// JSON was found but the best candidate violates the schema.
    Invalid(String),
    /// Nothing in the content parses as JSON and field coercion failed.
    NoJson(String),
}

/// Deterministic extraction ladder: whole-content parse, embedded JSON block
/// scan, then schema-guided per-field coercion.
fn extract_structured(content: &str, schema: &OutputSchema) -> Extraction {
    // (a) The whole content is JSON.
    if let Ok(value) = serde_json::from_str::<Value>(content.trim()) {
        if value.is_object() {
            return match schema.validate(&value) {
                Ok(()) => Extraction::Valid(value),
                Err(violations) => Extraction::Invalid(join_violations(&violations)),
            };
        }
    }

    // (b) JSON blocks embedded in surrounding text.
    let mut last_violations = None;
    for candidate in json_block_candidates(content) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if !value.is_object() {
                continue;
            }
            match schema.validate(&value) {
                Ok(()) => return Extraction::Valid(value),
                Err(violations) => last_violations = Some(join_violations(&violations)),
            }
        }
    }

    // (c) Schema-guided field coercion from raw text.
    if let Some(value) = coerce_fields(content, schema) {
        return Extraction::Valid(value);
    }

    match last_violations {
        Some(violations) => Extraction::Invalid(violations),
        None => Extraction::NoJson("no JSON object found in content".to_string()),
    }
}

fn join_violations(violations: &[crate::schema::SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Balanced-brace scan yielding candidate JSON object substrings, outermost
/// first, skipping braces inside string literals.
fn json_block_candidates(content: &str) -> Vec<String> {
    let bytes = content.as_bytes();
    let mut candidates = Vec::new();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            candidates.push(content[s..=i].to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    candidates
}

/// Assemble an object by locating each schema field in the raw text.
///
/// Only succeeds when every required field is found; partial objects would
/// just fail schema validation with a worse diagnostic.
fn coerce_fields(content: &str, schema: &OutputSchema) -> Option<Value> {
    let mut object = Map::new();

    for field in &schema.fields {
        let value = match field.kind {
            FieldKind::String => find_string_field(content, &field.name).map(Value::String),
            FieldKind::Integer | FieldKind::Number => {
                find_scalar_field(content, &field.name, r"-?\d+(?:\.\d+)?")
                    .and_then(|s| serde_json::from_str(&s).ok())
            }
            FieldKind::Boolean => find_scalar_field(content, &field.name, "true|false")
                .and_then(|s| serde_json::from_str(&s).ok()),
        };

        match value {
            Some(v) => {
                object.insert(field.name.clone(), v);
            }
            None if field.required => return None,
            None => {}
        }
    }

    Some(Value::Object(object))
}

fn find_string_field(content: &str, field: &str) -> Option<String> {
    let pattern = format!(
        r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#,
        regex::escape(field)
    );
    let re = Regex::new(&pattern).ok()?;
    let raw = re.captures(content)?.get(1)?.as_str();
    // Round-trip through the JSON parser to resolve escapes.
    serde_json::from_str(&format!("\"{}\"", raw)).ok()
}

fn find_scalar_field(content: &str, field: &str, value_pattern: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*({})"#, regex::escape(field), value_pattern);
    let re = Regex::new(&pattern).ok()?;
    Some(re.captures(content)?.get(1)?.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builtin()
    }

    fn options() -> RequestOptions {
        RequestOptions::default().with_output_schema_id("chain_of_thought")
    }

    #[tokio::test]
    async fn test_request_passes_through_unchanged() {
        let inner = Arc::new(ScriptedClient::returning(ParsedResponse::new(
            r#"{"answer":"4","reasoning":"math"}"#,
        )));
        let parser = PostProcessParser::new(inner.clone(), registry());

        let messages = vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user("What is 2+2?"),
        ];
        parser
            .chat_completion("claude-3-sonnet", &messages, &options())
            .await
            .unwrap();

        // The prompt reaches the provider verbatim, with no schema
        // instructions injected anywhere.
        let sent_messages = inner.last_messages().unwrap();
        assert_eq!(sent_messages, messages);
        for message in &sent_messages {
            assert!(!message.content.contains("JSON schema"));
            assert!(!message.content.contains("respond with valid JSON"));
        }

        let sent_options = inner.last_options().unwrap();
        assert_eq!(sent_options.response_format, None);
        assert_eq!(sent_options.guided_schema, None);
    }

    #[tokio::test]
    async fn test_whole_content_json() {
        let inner = Arc::new(ScriptedClient::returning(ParsedResponse::new(
            r#"{"answer":"5","reasoning":"I miscounted"}"#,
        )));
        let parser = PostProcessParser::new(inner, registry());

        let response = parser
            .chat_completion("claude-3-sonnet", &[ChatMessage::user("q")], &options())
            .await
            .unwrap();
        let data = response.structured_data.unwrap();
        assert_eq!(data["answer"], "5");
        assert_eq!(data["reasoning"], "I miscounted");
    }

    #[tokio::test]
    async fn test_json_block_in_surrounding_text() {
        let content = "Sure! Here is my answer:\n```json\n{\"answer\":\"4\",\"reasoning\":\"2+2\"}\n```\nLet me know.";
        let inner = Arc::new(ScriptedClient::returning(ParsedResponse::new(content)));
        let parser = PostProcessParser::new(inner, registry());

        let response = parser
            .chat_completion("claude-3-sonnet", &[ChatMessage::user("q")], &options())
            .await
            .unwrap();
        assert_eq!(response.structured_data.unwrap()["answer"], "4");
    }

    #[tokio::test]
    async fn test_field_coercion_from_prose() {
        // Truncated JSON: block scan fails, field coercion recovers both keys.
        let content = r#"My "answer": "4" and the "reasoning": "two plus two" trailed off"#;
        let inner = Arc::new(ScriptedClient::returning(ParsedResponse::new(content)));
        let parser = PostProcessParser::new(inner, registry());

        let response = parser
            .chat_completion("claude-3-sonnet", &[ChatMessage::user("q")], &options())
            .await
            .unwrap();
        let data = response.structured_data.unwrap();
        assert_eq!(data["answer"], "4");
        assert_eq!(data["reasoning"], "two plus two");
    }

    #[tokio::test]
    async fn test_empty_content() {
        let inner = Arc::new(ScriptedClient::returning(ParsedResponse::new("")));
        let parser = PostProcessParser::new(inner, registry());

        let err = parser
            .chat_completion("claude-3-sonnet", &[ChatMessage::user("q")], &options())
            .await
            .unwrap_err();
        assert!(err.description.contains("response_empty"));
    }

    #[tokio::test]
    async fn test_no_json_anywhere() {
        let inner = Arc::new(ScriptedClient::returning(ParsedResponse::new(
            "The answer is four.",
        )));
        let parser = PostProcessParser::new(inner, registry());

        let err = parser
            .chat_completion("claude-3-sonnet", &[ChatMessage::user("q")], &options())
            .await
            .unwrap_err();
        assert!(err.description.contains("json_parse"));
    }

    #[tokio::test]
    async fn test_schema_violation_reported() {
        let inner = Arc::new(ScriptedClient::returning(ParsedResponse::new(
            r#"{"answer": 4, "reasoning": 2}"#,
        )));
        let parser = PostProcessParser::new(inner, registry());

        let err = parser
            .chat_completion("claude-3-sonnet", &[ChatMessage::user("q")], &options())
            .await
            .unwrap_err();
        assert!(err.description.contains("schema_validation"));
    }

    #[test]
    fn test_json_block_candidates_skip_braces_in_strings() {
        let content = r#"note {"answer":"{not a block}","reasoning":"r"} end"#;
        let candidates = json_block_candidates(content);
        assert_eq!(candidates.len(), 1);
        assert!(serde_json::from_str::<Value>(&candidates[0]).is_ok());
    }

    #[test]
    fn test_coerce_fields_requires_all_required() {
        let schema = OutputSchema::chain_of_thought();
        assert!(coerce_fields(r#""answer": "4""#, &schema).is_none());
    }

    #[test]
    fn test_coerce_fields_resolves_escapes() {
        let schema = OutputSchema::direct_answer();
        let value = coerce_fields(r#"so "answer": "a \"quoted\" word" there"#, &schema).unwrap();
        assert_eq!(value["answer"], json!(r#"a "quoted" word"#));
    }

    proptest! {
        // A valid object embedded in arbitrary surrounding prose is always
        // recovered, as long as the prose contributes no braces of its own.
        #[test]
        fn prop_embedded_object_recovered(
            prefix in "[^{}]{0,80}",
            suffix in "[^{}]{0,80}",
            answer in "[a-zA-Z0-9 ]{1,20}",
            reasoning in "[a-zA-Z0-9 ]{1,40}",
        ) {
            let block = serde_json::to_string(&json!({
                "answer": answer,
                "reasoning": reasoning,
            })).unwrap();
            let content = format!("{}{}{}", prefix, block, suffix);

            let schema = OutputSchema::chain_of_thought();
            match extract_structured(&content, &schema) {
                Extraction::Valid(value) => {
                    prop_assert_eq!(value["answer"].as_str().unwrap(), answer.as_str());
                    prop_assert_eq!(value["reasoning"].as_str().unwrap(), reasoning.as_str());
                }
                _ => prop_assert!(false, "extraction failed for: {}", content),
            }
        }
    }
}
