//! Benchmarks: immutable, named, ordered question sets.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::failure::FailureReason;

/// Unique identifier for a benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenchmarkId(pub Uuid);

impl BenchmarkId {
    /// Generate a new random benchmark ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for BenchmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BenchmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One question with its expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier unique within the benchmark.
    pub id: String,
    pub text: String,
    pub expected_answer: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        expected_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            expected_answer: expected_answer.into(),
            metadata: HashMap::new(),
        }
    }
}

/// An immutable, named, ordered list of questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: BenchmarkId,
    /// Unique across all benchmarks.
    pub name: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub format_version: u32,
}

impl Benchmark {
    /// Current question-list format version.
    pub const FORMAT_VERSION: u32 = 1;

    /// Create a benchmark, validating name and question-id uniqueness.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self, FailureReason> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FailureReason::configuration(
                "Benchmark name must not be empty",
            ));
        }
        if questions.is_empty() {
            return Err(FailureReason::configuration(format!(
                "Benchmark '{}' must contain at least one question",
                name
            )));
        }

        let mut seen = HashSet::new();
        for question in &questions {
            if question.id.trim().is_empty() {
                return Err(FailureReason::configuration(format!(
                    "Benchmark '{}' contains a question with an empty id",
                    name
                )));
            }
            if !seen.insert(question.id.as_str()) {
                return Err(FailureReason::configuration(format!(
                    "Benchmark '{}' contains duplicate question id '{}'",
                    name, question.id
                )));
            }
        }

        Ok(Self {
            id: BenchmarkId::new(),
            name,
            description: description.into(),
            questions,
            format_version: Self::FORMAT_VERSION,
        })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
