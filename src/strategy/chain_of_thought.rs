//! The chain-of-thought strategy.

use super::{structured_string, ReasoningResult, ReasoningStrategy};
use crate::domain::{AgentConfig, FailureReason, ParsedResponse, Question};
use crate::llm::ChatMessage;
use std::collections::HashMap;

/// Minimum completion budget for step-by-step reasoning. Shorter limits
/// truncate the reasoning and starve the answer field.
const MIN_MAX_TOKENS: u64 = 200;

/// Think step by step, then answer.
pub struct ChainOfThoughtStrategy;

impl ReasoningStrategy for ChainOfThoughtStrategy {
    fn id(&self) -> &'static str {
        "chain_of_thought"
    }

    fn output_schema_id(&self) -> &'static str {
        "chain_of_thought"
    }

    fn build_prompt(&self, question: &Question, _config: &AgentConfig) -> Vec<ChatMessage> {
        vec![ChatMessage::user(format!(
            "Think through this question step by step, then provide your answer:\n\nQuestion: {}",
            question.text
        ))]
    }

    fn process_response(
        &self,
        response: &ParsedResponse,
    ) -> Result<ReasoningResult, FailureReason> {
        let answer = structured_string(response, "answer")?;
        let reasoning = structured_string(response, "reasoning")?;
        Ok(ReasoningResult {
            final_answer: answer,
            reasoning_text: reasoning,
            metadata: HashMap::new(),
        })
    }

    fn validate_config(&self, config: &AgentConfig) -> Result<(), FailureReason> {
        if let Some(max_tokens) = config.max_tokens() {
            if max_tokens < MIN_MAX_TOKENS {
                return Err(FailureReason::configuration(format!(
                    "chain_of_thought requires max_tokens >= {}, got {}",
                    MIN_MAX_TOKENS, max_tokens
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_shape() {
        let question = Question::new("1", "What is 2+2?", "4");
        let config = AgentConfig::new("chain_of_thought", "claude-3-sonnet");
        let messages = ChainOfThoughtStrategy.build_prompt(&question, &config);

        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].content,
            "Think through this question step by step, then provide your answer:\n\nQuestion: What is 2+2?"
        );
    }

    #[test]
    fn test_process_response() {
        let response = ParsedResponse::new(r#"{"answer":"5","reasoning":"I miscounted"}"#)
            .with_structured_data(json!({"answer": "5", "reasoning": "I miscounted"}));

        let result = ChainOfThoughtStrategy.process_response(&response).unwrap();
        assert_eq!(result.final_answer, "5");
        assert_eq!(result.reasoning_text, "I miscounted");
    }

    #[test]
    fn test_max_tokens_floor() {
        let too_small =
            AgentConfig::new("chain_of_thought", "claude-3-sonnet").with_model_parameter("max_tokens", 100);
        let err = ChainOfThoughtStrategy.validate_config(&too_small).unwrap_err();
        assert_eq!(
            err.category,
            crate::domain::FailureCategory::ConfigurationError
        );

        let enough =
            AgentConfig::new("chain_of_thought", "claude-3-sonnet").with_model_parameter("max_tokens", 200);
        assert!(ChainOfThoughtStrategy.validate_config(&enough).is_ok());

        // Absent max_tokens defers to the provider default.
        let unset = AgentConfig::new("chain_of_thought", "claude-3-sonnet");
        assert!(ChainOfThoughtStrategy.validate_config(&unset).is_ok());
    }
}
