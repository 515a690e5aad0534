//! Environment-variable configuration.

use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::{ParsingStrategyId, ProviderId};
use crate::error::{Error, Result};
use crate::llm::{ClientFactory, ProviderConfig};
use crate::schema::SchemaRegistry;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite location: a path, `sqlite:<path>` URL, or `:memory:`.
    pub database_url: String,
    /// Provider used when model-name detection finds no match.
    pub default_provider: ProviderId,
    /// Parsing strategy applied when an agent config leaves it unset.
    pub parsing_strategy: ParsingStrategyId,
    /// Connection settings for each configured provider.
    pub providers: HashMap<ProviderId, ProviderConfig>,
    pub log_level: String,
    pub debug_mode: bool,
    /// Reserved for future use; must be 1.
    pub max_concurrent_evaluations: u32,
}

/// Shape of the `LITELLM_CONFIG` JSON value.
#[derive(Debug, Deserialize)]
struct LiteLlmSettings {
    base_url: String,
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through a lookup function (injectable for tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::config("DATABASE_URL is required"))?;

        let default_provider = match lookup("DEFAULT_LLM_PROVIDER") {
            Some(value) => ProviderId::parse(&value).ok_or_else(|| {
                Error::config(format!("Unknown DEFAULT_LLM_PROVIDER '{}'", value))
            })?,
            None => ProviderId::OpenRouter,
        };

        let parsing_strategy = match lookup("PARSING_STRATEGY") {
            Some(value) => ParsingStrategyId::parse(&value)
                .ok_or_else(|| Error::config(format!("Unknown PARSING_STRATEGY '{}'", value)))?,
            None => ParsingStrategyId::Auto,
        };

        let mut providers = HashMap::new();

        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            let mut config = ProviderConfig::new(key)
                .with_timeout(parse_timeout(&lookup, "OPENROUTER_TIMEOUT")?);
            if let Some(url) = lookup("OPENROUTER_BASE_URL") {
                config = config.with_base_url(url);
            }
            providers.insert(ProviderId::OpenRouter, config);
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            providers.insert(
                ProviderId::OpenAi,
                ProviderConfig::new(key).with_timeout(parse_timeout(&lookup, "OPENAI_TIMEOUT")?),
            );
        }

        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            providers.insert(
                ProviderId::Anthropic,
                ProviderConfig::new(key)
                    .with_timeout(parse_timeout(&lookup, "ANTHROPIC_TIMEOUT")?),
            );
        }

        if let Some(raw) = lookup("LITELLM_CONFIG") {
            let parsed: LiteLlmSettings = serde_json::from_str(&raw)
                .map_err(|e| Error::config(format!("LITELLM_CONFIG is not valid JSON: {}", e)))?;
            providers.insert(
                ProviderId::LiteLlm,
                ProviderConfig::new(parsed.api_key)
                    .with_base_url(parsed.base_url)
                    .with_timeout(parsed.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            );
        }

        let max_concurrent_evaluations = match lookup("MAX_CONCURRENT_EVALUATIONS") {
            Some(value) => value.parse::<u32>().map_err(|_| {
                Error::config(format!("MAX_CONCURRENT_EVALUATIONS must be an integer, got '{}'", value))
            })?,
            None => 1,
        };
        if max_concurrent_evaluations != 1 {
            return Err(Error::config(
                "MAX_CONCURRENT_EVALUATIONS must be 1 (concurrent evaluations are not supported)",
            ));
        }

        Ok(Self {
            database_url,
            default_provider,
            parsing_strategy,
            providers,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            debug_mode: lookup("DEBUG_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            max_concurrent_evaluations,
        })
    }

    /// Assemble the client factory from these settings.
    pub fn client_factory(&self, schemas: SchemaRegistry) -> ClientFactory {
        let mut factory = ClientFactory::new(schemas)
            .with_default_provider(self.default_provider)
            .with_default_parsing(self.parsing_strategy);
        for (id, config) in &self.providers {
            factory = factory.with_provider(*id, config.clone());
        }
        factory
    }

    /// Effective tracing filter directive.
    pub fn log_filter(&self) -> String {
        if self.debug_mode {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }
}

fn parse_timeout<F>(lookup: &F, name: &str) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| Error::config(format!("{} must be seconds, got '{}'", name, value))),
        None => Ok(DEFAULT_TIMEOUT_SECS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_database_url_required() {
        let err = Settings::from_lookup(env(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(env(&[("DATABASE_URL", ":memory:")])).unwrap();
        assert_eq!(settings.default_provider, ProviderId::OpenRouter);
        assert_eq!(settings.parsing_strategy, ParsingStrategyId::Auto);
        assert_eq!(settings.log_level, "info");
        assert!(!settings.debug_mode);
        assert!(settings.providers.is_empty());
    }

    #[test]
    fn test_provider_credentials() {
        let settings = Settings::from_lookup(env(&[
            ("DATABASE_URL", ":memory:"),
            ("OPENAI_API_KEY", "sk-1"),
            ("OPENAI_TIMEOUT", "30"),
            ("OPENROUTER_API_KEY", "or-1"),
            ("OPENROUTER_BASE_URL", "https://router.local"),
        ]))
        .unwrap();

        let openai = &settings.providers[&ProviderId::OpenAi];
        assert_eq!(openai.api_key, "sk-1");
        assert_eq!(openai.timeout_secs, 30);

        let openrouter = &settings.providers[&ProviderId::OpenRouter];
        assert_eq!(openrouter.base_url.as_deref(), Some("https://router.local"));
        assert_eq!(openrouter.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_litellm_config_json() {
        let settings = Settings::from_lookup(env(&[
            ("DATABASE_URL", ":memory:"),
            (
                "LITELLM_CONFIG",
                r#"{"base_url": "http://litellm:4000", "timeout_secs": 60}"#,
            ),
        ]))
        .unwrap();

        let litellm = &settings.providers[&ProviderId::LiteLlm];
        assert_eq!(litellm.base_url.as_deref(), Some("http://litellm:4000"));
        assert_eq!(litellm.timeout_secs, 60);
        assert_eq!(litellm.api_key, "");
    }

    #[test]
    fn test_invalid_litellm_config() {
        let err = Settings::from_lookup(env(&[
            ("DATABASE_URL", ":memory:"),
            ("LITELLM_CONFIG", "not json"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LITELLM_CONFIG"));
    }

    #[test]
    fn test_max_concurrent_must_be_one() {
        let err = Settings::from_lookup(env(&[
            ("DATABASE_URL", ":memory:"),
            ("MAX_CONCURRENT_EVALUATIONS", "4"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MAX_CONCURRENT_EVALUATIONS"));
    }

    #[test]
    fn test_debug_mode_overrides_log_level() {
        let settings = Settings::from_lookup(env(&[
            ("DATABASE_URL", ":memory:"),
            ("LOG_LEVEL", "warn"),
            ("DEBUG_MODE", "true"),
        ]))
        .unwrap();
        assert_eq!(settings.log_filter(), "debug");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = Settings::from_lookup(env(&[
            ("DATABASE_URL", ":memory:"),
            ("DEFAULT_LLM_PROVIDER", "bedrock"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("bedrock"));
    }
}
