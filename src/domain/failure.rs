//! Classified failure values crossing the anti-corruption layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ParsingError,
    TokenLimitExceeded,
    ContentGuardrail,
    ModelRefusal,
    NetworkTimeout,
    RateLimitExceeded,
    CreditLimitExceeded,
    AuthenticationError,
    ConfigurationError,
    Unknown,
}

impl FailureCategory {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn default_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::RateLimitExceeded | Self::Unknown
        )
    }

    /// Fatal categories abort the whole evaluation instead of being recorded
    /// against a single question.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationError | Self::CreditLimitExceeded | Self::ConfigurationError
        )
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ParsingError => "parsing_error",
            Self::TokenLimitExceeded => "token_limit_exceeded",
            Self::ContentGuardrail => "content_guardrail",
            Self::ModelRefusal => "model_refusal",
            Self::NetworkTimeout => "network_timeout",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::CreditLimitExceeded => "credit_limit_exceeded",
            Self::AuthenticationError => "authentication_error",
            Self::ConfigurationError => "configuration_error",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A classified failure with a one-line description and debugging details.
///
/// This is the only failure shape that escapes the LLM access layer; provider
/// SDK and parser errors are translated into it at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub category: FailureCategory,
    /// One-line, human-readable cause.
    pub description: String,
    /// Multi-line detail for debugging (status codes, truncated bodies).
    pub technical_details: String,
    pub occurred_at: DateTime<Utc>,
    /// True iff a retry could plausibly succeed.
    pub recoverable: bool,
}

impl FailureReason {
    pub fn new(
        category: FailureCategory,
        description: impl Into<String>,
        technical_details: impl Into<String>,
    ) -> Self {
        Self {
            category,
            description: description.into(),
            technical_details: technical_details.into(),
            occurred_at: Utc::now(),
            recoverable: category.default_recoverable(),
        }
    }

    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Create a configuration failure.
    pub fn configuration(description: impl Into<String>) -> Self {
        let description = description.into();
        Self::new(
            FailureCategory::ConfigurationError,
            description.clone(),
            description,
        )
    }

    /// Create a parsing failure.
    pub fn parsing(
        description: impl Into<String>,
        technical_details: impl Into<String>,
    ) -> Self {
        Self::new(FailureCategory::ParsingError, description, technical_details)
    }

    /// Create a network timeout failure.
    pub fn timeout(description: impl Into<String>) -> Self {
        let description = description.into();
        Self::new(
            FailureCategory::NetworkTimeout,
            description.clone(),
            description,
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.category.is_fatal()
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.description)
    }
}

impl std::error::Error for FailureReason {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_recoverable_by_category() {
        assert!(FailureCategory::NetworkTimeout.default_recoverable());
        assert!(FailureCategory::RateLimitExceeded.default_recoverable());
        assert!(FailureCategory::Unknown.default_recoverable());
        assert!(!FailureCategory::AuthenticationError.default_recoverable());
        assert!(!FailureCategory::ParsingError.default_recoverable());
    }

    #[test]
    fn test_fatal_categories() {
        assert!(FailureCategory::AuthenticationError.is_fatal());
        assert!(FailureCategory::CreditLimitExceeded.is_fatal());
        assert!(FailureCategory::ConfigurationError.is_fatal());
        assert!(!FailureCategory::RateLimitExceeded.is_fatal());
        assert!(!FailureCategory::ParsingError.is_fatal());
    }

    #[test]
    fn test_display() {
        let reason = FailureReason::new(
            FailureCategory::AuthenticationError,
            "Invalid API key",
            "HTTP 401 from https://api.example.com",
        );
        assert_eq!(reason.to_string(), "authentication_error: Invalid API key");
        assert!(!reason.recoverable);
    }

    #[test]
    fn test_serde_round_trip() {
        let reason = FailureReason::parsing("native failed at json_parse", "content: not json");
        let json = serde_json::to_string(&reason).unwrap();
        let back: FailureReason = serde_json::from_str(&json).unwrap();
        assert_eq!(reason, back);
    }
}
