//! Provider-agnostic LLM response value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The response of one chat completion, translated at the ACL boundary.
///
/// Carries no provider-specific fields. A response escaping a parsing
/// decorator always has non-whitespace `content` and schema-valid
/// `structured_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Raw text of the first choice.
    pub content: String,
    /// Schema-validated object, when structured parsing succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
    /// Optional extras such as confidence scores or token logprobs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ParsedResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            structured_data: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_structured_data(mut self, data: Value) -> Self {
        self.structured_data = Some(data);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the content is empty or all whitespace.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}
