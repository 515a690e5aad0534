//! Per-question results and computed aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use super::evaluation::EvaluationId;
use super::failure::FailureReason;

/// Unique identifier for a question result row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId(pub Uuid);

impl ResultId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ResultId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an answer was produced: which strategy, and its intermediate text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    /// Matches the strategy id that drove the question.
    pub approach_type: String,
    /// Intermediate reasoning; empty for the direct strategy.
    pub reasoning_text: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ReasoningTrace {
    pub fn new(approach_type: impl Into<String>, reasoning_text: impl Into<String>) -> Self {
        Self {
            approach_type: approach_type.into(),
            reasoning_text: reasoning_text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The durable unit of progress: one question's outcome, insert-only.
///
/// Exactly one row may exist per (evaluation, question) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationQuestionResult {
    pub id: ResultId,
    pub evaluation_id: EvaluationId,
    pub question_id: String,
    pub question_text: String,
    pub expected_answer: String,
    pub actual_answer: String,
    pub is_correct: bool,
    pub execution_time_ms: u64,
    pub reasoning_trace: ReasoningTrace,
    /// Set iff processing this question failed.
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl EvaluationQuestionResult {
    /// Record a successfully processed question.
    #[allow(clippy::too_many_arguments)]
    pub fn answered(
        evaluation_id: EvaluationId,
        question_id: impl Into<String>,
        question_text: impl Into<String>,
        expected_answer: impl Into<String>,
        actual_answer: impl Into<String>,
        is_correct: bool,
        execution_time_ms: u64,
        reasoning_trace: ReasoningTrace,
    ) -> Self {
        Self {
            id: ResultId::new(),
            evaluation_id,
            question_id: question_id.into(),
            question_text: question_text.into(),
            expected_answer: expected_answer.into(),
            actual_answer: actual_answer.into(),
            is_correct,
            execution_time_ms,
            reasoning_trace,
            error_message: None,
            processed_at: Utc::now(),
        }
    }

    /// Record a question whose processing failed with a recoverable-class
    /// failure. The answer is empty and the row counts as incorrect.
    pub fn failed(
        evaluation_id: EvaluationId,
        question_id: impl Into<String>,
        question_text: impl Into<String>,
        expected_answer: impl Into<String>,
        strategy_id: impl Into<String>,
        execution_time_ms: u64,
        failure: &FailureReason,
    ) -> Self {
        Self {
            id: ResultId::new(),
            evaluation_id,
            question_id: question_id.into(),
            question_text: question_text.into(),
            expected_answer: expected_answer.into(),
            actual_answer: String::new(),
            is_correct: false,
            execution_time_ms,
            reasoning_trace: ReasoningTrace::new(strategy_id, ""),
            error_message: Some(failure.description.clone()),
            processed_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Aggregate results, computed on read from the persisted rows. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResults {
    pub evaluation_id: EvaluationId,
    pub total_questions: usize,
    pub correct_answers: usize,
    /// correct / total; 0.0 for an empty row set.
    pub accuracy: f64,
    pub average_execution_time_ms: f64,
    pub error_count: usize,
    pub question_results: Vec<EvaluationQuestionResult>,
}

impl EvaluationResults {
    /// Derive aggregates from the persisted row set.
    pub fn from_rows(
        evaluation_id: EvaluationId,
        question_results: Vec<EvaluationQuestionResult>,
    ) -> Self {
        let total_questions = question_results.len();
        let correct_answers = question_results.iter().filter(|r| r.is_correct).count();
        let error_count = question_results.iter().filter(|r| r.is_error()).count();

        let accuracy = if total_questions == 0 {
            0.0
        } else {
            correct_answers as f64 / total_questions as f64
        };

        let average_execution_time_ms = if total_questions == 0 {
            0.0
        } else {
            question_results
                .iter()
                .map(|r| r.execution_time_ms as f64)
                .sum::<f64>()
                / total_questions as f64
        };

        Self {
            evaluation_id,
            total_questions,
            correct_answers,
            accuracy,
            average_execution_time_ms,
            error_count,
            question_results,
        }
    }
}

/// Progress of a running evaluation, computed from persisted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({:.0}%)",
            self.completed,
            self.total,
            self.percent()
        )
    }
}
