//! Client factory: provider detection, parser selection, decorator wiring.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{AgentConfig, FailureReason, ParsingStrategyId, ProviderId};
use crate::schema::SchemaRegistry;

use super::anthropic::AnthropicClient;
use super::client::LlmClient;
use super::litellm::LiteLlmClient;
use super::openai::OpenAiClient;
use super::openrouter::OpenRouterClient;
use super::parser::{ConstrainedParser, NativeParser, PostProcessParser};
use super::types::ProviderConfig;

/// Model-name prefixes with an unambiguous provider.
const PROVIDER_PREFIXES: [(&str, ProviderId); 3] = [
    ("gpt-", ProviderId::OpenAi),
    ("o1-", ProviderId::OpenAi),
    ("claude-", ProviderId::Anthropic),
];

/// Source of ready-to-use clients, keyed by agent config.
///
/// The orchestrator depends on this seam; production wiring supplies a
/// [`ClientFactory`], tests a scripted stand-in.
pub trait ClientSource: Send + Sync {
    fn create(&self, config: &AgentConfig) -> Result<Arc<dyn LlmClient>, FailureReason>;

    /// Validate provider and parsing-strategy resolution without building a
    /// client. Used at evaluation creation time.
    fn validate(&self, config: &AgentConfig) -> Result<(), FailureReason>;
}

/// Builds decorator-wrapped clients from agent configs.
///
/// Stateless beyond the provider config table; assembled once at startup.
pub struct ClientFactory {
    providers: HashMap<ProviderId, ProviderConfig>,
    default_provider: ProviderId,
    default_parsing: ParsingStrategyId,
    schemas: SchemaRegistry,
}

impl ClientFactory {
    pub fn new(schemas: SchemaRegistry) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: ProviderId::OpenRouter,
            default_parsing: ParsingStrategyId::Auto,
            schemas,
        }
    }

    /// Register connection settings for a provider.
    pub fn with_provider(mut self, id: ProviderId, config: ProviderConfig) -> Self {
        self.providers.insert(id, config);
        self
    }

    /// Provider used when the model name matches no prefix.
    pub fn with_default_provider(mut self, provider: ProviderId) -> Self {
        self.default_provider = provider;
        self
    }

    /// Parsing strategy applied when the agent config leaves it unset.
    pub fn with_default_parsing(mut self, parsing: ParsingStrategyId) -> Self {
        self.default_parsing = parsing;
        self
    }

    /// Resolve the provider for a model name.
    pub fn detect_provider(&self, model_name: &str) -> ProviderId {
        PROVIDER_PREFIXES
            .iter()
            .find(|(prefix, _)| model_name.starts_with(prefix))
            .map(|(_, provider)| *provider)
            .unwrap_or(self.default_provider)
    }

    /// Auto-select a parsing strategy for a (provider, model) pair.
    pub fn select_parsing(&self, provider: ProviderId, model_name: &str) -> ParsingStrategyId {
        match provider {
            ProviderId::OpenAi
                if model_name.starts_with("gpt-") || model_name.starts_with("o1-") =>
            {
                ParsingStrategyId::Native
            }
            ProviderId::Anthropic => ParsingStrategyId::PostProcess,
            // Open-source models routed through OpenRouter support guided
            // decoding.
            ProviderId::OpenRouter => ParsingStrategyId::Constrained,
            _ => ParsingStrategyId::PostProcess,
        }
    }

    /// Whether a provider can serve a parsing strategy.
    pub fn supports(&self, provider: ProviderId, parsing: ParsingStrategyId) -> bool {
        use ParsingStrategyId::*;
        use ProviderId::*;
        match (provider, parsing) {
            (_, Auto) => true,
            (OpenAi, Native | PostProcess) => true,
            (OpenRouter, Native | PostProcess | Constrained) => true,
            // No server-side JSON-schema response format on the Messages API.
            (Anthropic, PostProcess) => true,
            (LiteLlm, Native | PostProcess) => true,
            _ => false,
        }
    }

    /// Resolve the (provider, parsing strategy) pair for an agent config.
    pub fn resolve(
        &self,
        config: &AgentConfig,
    ) -> Result<(ProviderId, ParsingStrategyId), FailureReason> {
        let provider = config
            .provider
            .unwrap_or_else(|| self.detect_provider(&config.model_name));

        let parsing = match config.parsing_strategy {
            Some(ParsingStrategyId::Auto) | None => match self.default_parsing {
                ParsingStrategyId::Auto => self.select_parsing(provider, &config.model_name),
                explicit => explicit,
            },
            Some(explicit) => explicit,
        };

        if !self.supports(provider, parsing) {
            return Err(FailureReason::configuration(format!(
                "Parsing strategy {} is not supported by provider {}",
                parsing, provider
            )));
        }

        Ok((provider, parsing))
    }

    /// Apply the parsing decorator to a base client.
    ///
    /// Split out so tests can wrap stub clients the same way production
    /// wiring does.
    pub fn wrap(
        &self,
        base: Arc<dyn LlmClient>,
        parsing: ParsingStrategyId,
    ) -> Arc<dyn LlmClient> {
        match parsing {
            ParsingStrategyId::Native => Arc::new(NativeParser::new(base, self.schemas.clone())),
            ParsingStrategyId::Constrained => {
                Arc::new(ConstrainedParser::new(base, self.schemas.clone()))
            }
            ParsingStrategyId::PostProcess | ParsingStrategyId::Auto => {
                Arc::new(PostProcessParser::new(base, self.schemas.clone()))
            }
        }
    }
}

impl ClientSource for ClientFactory {
    /// Build the decorator-wrapped client for an agent config.
    fn create(&self, config: &AgentConfig) -> Result<Arc<dyn LlmClient>, FailureReason> {
        let (provider, parsing) = self.resolve(config)?;

        let provider_config = self.providers.get(&provider).ok_or_else(|| {
            FailureReason::configuration(format!(
                "Provider {} is not configured — set {}",
                provider,
                credential_hint(provider)
            ))
        })?;

        let base: Arc<dyn LlmClient> = match provider {
            ProviderId::OpenAi => Arc::new(OpenAiClient::new(provider_config.clone())?),
            ProviderId::OpenRouter => Arc::new(OpenRouterClient::new(provider_config.clone())?),
            ProviderId::Anthropic => Arc::new(AnthropicClient::new(provider_config.clone())?),
            ProviderId::LiteLlm => Arc::new(LiteLlmClient::new(provider_config.clone())?),
        };

        Ok(self.wrap(base, parsing))
    }

    fn validate(&self, config: &AgentConfig) -> Result<(), FailureReason> {
        self.resolve(config).map(|_| ())
    }
}

fn credential_hint(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenRouter => "OPENROUTER_API_KEY",
        ProviderId::OpenAi => "OPENAI_API_KEY",
        ProviderId::Anthropic => "ANTHROPIC_API_KEY",
        ProviderId::LiteLlm => "LITELLM_CONFIG",
    }
}
