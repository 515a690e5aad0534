//! Agent configuration: strategy, model, provider, and parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::failure::FailureReason;

/// External LLM provider identifier.
///
/// The domain only names providers; concrete clients live in the
/// infrastructure layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "litellm")]
    LiteLlm,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        Self::OpenRouter,
        Self::OpenAi,
        Self::Anthropic,
        Self::LiteLlm,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openrouter" => Some(Self::OpenRouter),
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "litellm" => Some(Self::LiteLlm),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenRouter => write!(f, "openrouter"),
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::LiteLlm => write!(f, "litellm"),
        }
    }
}

/// Structured-output parsing strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStrategyId {
    /// Auto-select by (provider, model).
    Auto,
    /// Server-side JSON-schema constrained decoding via response_format.
    Native,
    /// Deterministic extraction from free-form text after the call.
    PostProcess,
    /// Schema enforced during token generation via a guided-decoding hook.
    Constrained,
}

impl ParsingStrategyId {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "native" => Some(Self::Native),
            "post_process" => Some(Self::PostProcess),
            "constrained" => Some(Self::Constrained),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParsingStrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Native => write!(f, "native"),
            Self::PostProcess => write!(f, "post_process"),
            Self::Constrained => write!(f, "constrained"),
        }
    }
}

/// Configuration for one evaluation run: which strategy drives which model,
/// through which provider and parsing strategy, with which parameters.
///
/// Equality is field-wise; the config is embedded in the evaluation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Registered reasoning strategy id (e.g. "none", "chain_of_thought").
    pub strategy_id: String,
    /// Model identifier passed through to the provider.
    pub model_name: String,
    /// Explicit provider; auto-detected from the model name when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    /// Explicit parsing strategy; auto-selected when absent or `Auto`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsing_strategy: Option<ParsingStrategyId>,
    /// Model parameters (temperature, max_tokens, top_p).
    #[serde(default)]
    pub model_parameters: BTreeMap<String, Value>,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub strategy_parameters: BTreeMap<String, Value>,
}

/// Model parameter keys accepted in `model_parameters`.
const KNOWN_MODEL_PARAMETERS: [&str; 3] = ["temperature", "max_tokens", "top_p"];

impl AgentConfig {
    pub fn new(strategy_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            model_name: model_name.into(),
            provider: None,
            parsing_strategy: None,
            model_parameters: BTreeMap::new(),
            strategy_parameters: BTreeMap::new(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_parsing_strategy(mut self, strategy: ParsingStrategyId) -> Self {
        self.parsing_strategy = Some(strategy);
        self
    }

    pub fn with_model_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.model_parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_strategy_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.strategy_parameters.insert(key.into(), value.into());
        self
    }

    /// Configured sampling temperature, if any.
    pub fn temperature(&self) -> Option<f64> {
        self.model_parameters.get("temperature").and_then(Value::as_f64)
    }

    /// Configured completion token limit, if any.
    pub fn max_tokens(&self) -> Option<u64> {
        self.model_parameters.get("max_tokens").and_then(Value::as_u64)
    }

    /// Configured nucleus sampling parameter, if any.
    pub fn top_p(&self) -> Option<f64> {
        self.model_parameters.get("top_p").and_then(Value::as_f64)
    }

    /// Validate parameter names, types, and ranges.
    ///
    /// Strategy registration and (provider, parser) support are checked by
    /// the strategy registry and client factory respectively; this covers
    /// everything local to the config value.
    pub fn validate_parameters(&self) -> Result<(), FailureReason> {
        if self.strategy_id.trim().is_empty() {
            return Err(FailureReason::configuration("strategy_id must not be empty"));
        }
        if self.model_name.trim().is_empty() {
            return Err(FailureReason::configuration("model_name must not be empty"));
        }

        for (key, value) in &self.model_parameters {
            if !KNOWN_MODEL_PARAMETERS.contains(&key.as_str()) {
                return Err(FailureReason::configuration(format!(
                    "Unknown model parameter '{}' (known: {})",
                    key,
                    KNOWN_MODEL_PARAMETERS.join(", ")
                )));
            }
            if !is_scalar(value) {
                return Err(FailureReason::configuration(format!(
                    "Model parameter '{}' must be a scalar, got {}",
                    key, value
                )));
            }
        }

        if let Some(t) = self.model_parameters.get("temperature") {
            match t.as_f64() {
                Some(t) if (0.0..=2.0).contains(&t) => {}
                _ => {
                    return Err(FailureReason::configuration(format!(
                        "temperature must be a number in [0.0, 2.0], got {}",
                        t
                    )))
                }
            }
        }

        if let Some(m) = self.model_parameters.get("max_tokens") {
            match m.as_u64() {
                Some(m) if m >= 1 => {}
                _ => {
                    return Err(FailureReason::configuration(format!(
                        "max_tokens must be an integer >= 1, got {}",
                        m
                    )))
                }
            }
        }

        if let Some(p) = self.model_parameters.get("top_p") {
            match p.as_f64() {
                Some(p) if (0.0..=1.0).contains(&p) => {}
                _ => {
                    return Err(FailureReason::configuration(format!(
                        "top_p must be a number in [0.0, 1.0], got {}",
                        p
                    )))
                }
            }
        }

        for (key, value) in &self.strategy_parameters {
            if !is_scalar(value) {
                return Err(FailureReason::configuration(format!(
                    "Strategy parameter '{}' must be a scalar, got {}",
                    key, value
                )));
            }
        }

        Ok(())
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_parse_round_trip() {
        for provider in ProviderId::ALL {
            assert_eq!(ProviderId::parse(&provider.to_string()), Some(provider));
        }
        assert_eq!(ProviderId::parse("aws"), None);
    }

    #[test]
    fn test_parsing_strategy_parse() {
        assert_eq!(
            ParsingStrategyId::parse("post_process"),
            Some(ParsingStrategyId::PostProcess)
        );
        assert_eq!(ParsingStrategyId::parse("regex"), None);
    }

    #[test]
    fn test_valid_parameters() {
        let config = AgentConfig::new("none", "gpt-4")
            .with_model_parameter("temperature", 0.7)
            .with_model_parameter("max_tokens", 512)
            .with_model_parameter("top_p", 0.9);
        assert!(config.validate_parameters().is_ok());
        assert_eq!(config.temperature(), Some(0.7));
        assert_eq!(config.max_tokens(), Some(512));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let config = AgentConfig::new("none", "gpt-4").with_model_parameter("frequency_penalty", 1);
        let err = config.validate_parameters().unwrap_err();
        assert_eq!(err.category, crate::domain::FailureCategory::ConfigurationError);
        assert!(err.description.contains("frequency_penalty"));
    }

    #[test]
    fn test_temperature_out_of_range() {
        let config = AgentConfig::new("none", "gpt-4").with_model_parameter("temperature", 2.5);
        assert!(config.validate_parameters().is_err());
    }

    #[test]
    fn test_max_tokens_zero_rejected() {
        let config = AgentConfig::new("none", "gpt-4").with_model_parameter("max_tokens", 0);
        assert!(config.validate_parameters().is_err());
    }

    #[test]
    fn test_non_scalar_parameter_rejected() {
        let config =
            AgentConfig::new("none", "gpt-4").with_model_parameter("temperature", json!([0.7]));
        assert!(config.validate_parameters().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = AgentConfig::new("chain_of_thought", "claude-3-sonnet")
            .with_provider(ProviderId::Anthropic)
            .with_parsing_strategy(ParsingStrategyId::PostProcess)
            .with_model_parameter("max_tokens", 1024);

        let json = serde_json::to_string(&config).unwrap();
        let back: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
