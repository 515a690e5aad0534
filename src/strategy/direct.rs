//! The direct-answer strategy ("none").

use super::{structured_string, ReasoningResult, ReasoningStrategy};
use crate::domain::{AgentConfig, FailureReason, ParsedResponse, Question};
use crate::llm::ChatMessage;
use std::collections::HashMap;

/// Ask the question directly, no intermediate reasoning.
pub struct DirectStrategy;

impl ReasoningStrategy for DirectStrategy {
    fn id(&self) -> &'static str {
        "none"
    }

    fn output_schema_id(&self) -> &'static str {
        "direct_answer"
    }

    fn build_prompt(&self, question: &Question, _config: &AgentConfig) -> Vec<ChatMessage> {
        vec![ChatMessage::user(format!(
            "Answer the following question directly:\n\nQuestion: {}",
            question.text
        ))]
    }

    fn process_response(
        &self,
        response: &ParsedResponse,
    ) -> Result<ReasoningResult, FailureReason> {
        let answer = structured_string(response, "answer")?;
        Ok(ReasoningResult {
            final_answer: answer,
            reasoning_text: String::new(),
            metadata: HashMap::new(),
        })
    }
}
