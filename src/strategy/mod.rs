//! Reasoning strategies: prompt construction and response post-processing.
//!
//! A strategy is pure — no I/O, no provider knowledge. It builds the message
//! list for a question and turns a schema-validated response into a final
//! answer plus reasoning text. The registry is assembled once at startup and
//! read-only afterwards.

mod chain_of_thought;
mod direct;

pub use chain_of_thought::ChainOfThoughtStrategy;
pub use direct::DirectStrategy;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{AgentConfig, FailureReason, ParsedResponse, Question};
use crate::llm::ChatMessage;

/// Outcome of post-processing one response.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningResult {
    pub final_answer: String,
    pub reasoning_text: String,
    pub metadata: HashMap<String, Value>,
}

/// Prompt-building and response-post-processing rules, identified by id.
pub trait ReasoningStrategy: Send + Sync {
    /// Strategy identifier used in agent configs (e.g. "none").
    fn id(&self) -> &'static str;

    /// Id of the output schema responses must satisfy.
    fn output_schema_id(&self) -> &'static str;

    /// Build the ordered message list for a question.
    fn build_prompt(&self, question: &Question, config: &AgentConfig) -> Vec<ChatMessage>;

    /// Turn a schema-validated response into the final answer.
    fn process_response(&self, response: &ParsedResponse)
        -> Result<ReasoningResult, FailureReason>;

    /// Strategy-specific agent config validation.
    fn validate_config(&self, _config: &AgentConfig) -> Result<(), FailureReason> {
        Ok(())
    }
}

/// Read a required string field from a response's structured data.
fn structured_string(response: &ParsedResponse, field: &str) -> Result<String, FailureReason> {
    response
        .structured_data
        .as_ref()
        .and_then(|data| data.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            FailureReason::parsing(
                format!("Response is missing structured field '{}'", field),
                format!("structured_data: {:?}", response.structured_data),
            )
        })
}

/// Registry of reasoning strategies, open for extension.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn ReasoningStrategy>>,
}

impl StrategyRegistry {
    /// Registry with the built-in strategies.
    pub fn builtin() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register(Arc::new(DirectStrategy));
        registry.register(Arc::new(ChainOfThoughtStrategy));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn ReasoningStrategy>) {
        self.strategies.insert(strategy.id(), strategy);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ReasoningStrategy>> {
        self.strategies.get(id).cloned()
    }

    /// Resolve a strategy id, failing with a configuration error.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn ReasoningStrategy>, FailureReason> {
        self.get(id).ok_or_else(|| {
            let mut ids = self.ids();
            ids.sort_unstable();
            FailureReason::configuration(format!(
                "Unknown reasoning strategy '{}' (registered: {})",
                id,
                ids.join(", ")
            ))
        })
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.strategies.keys().copied().collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
