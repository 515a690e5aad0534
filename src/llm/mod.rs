//! LLM access layer: provider clients, parsing decorators, and the factory.
//!
//! This is the anti-corruption layer. Above it, the core sees exactly one
//! operation — `chat_completion` returning a [`ParsedResponse`](crate::domain::ParsedResponse)
//! or a [`FailureReason`](crate::domain::FailureReason) — regardless of which
//! provider serves the call or how structure is enforced.

mod anthropic;
mod client;
mod error_map;
mod factory;
mod litellm;
mod openai;
mod openrouter;
pub mod parser;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use factory::{ClientFactory, ClientSource};
pub use litellm::LiteLlmClient;
pub use openai::OpenAiClient;
pub use openrouter::OpenRouterClient;
pub use parser::{ConstrainedParser, NativeParser, ParseStage, PostProcessParser};
pub use types::{ChatMessage, ChatRole, ProviderConfig, RequestOptions};

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stand-in client for decorator and orchestrator tests.

    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::domain::{FailureReason, ParsedResponse, ProviderId};

    use super::client::LlmClient;
    use super::types::{ChatMessage, RequestOptions};

    type Outcome = Result<ParsedResponse, FailureReason>;

    /// A client that replays scripted outcomes and records what it was sent.
    pub(crate) struct ScriptedClient {
        outcomes: Mutex<Vec<Outcome>>,
        repeat: Option<ParsedResponse>,
        provider: ProviderId,
        calls: Mutex<Vec<(String, Vec<ChatMessage>, RequestOptions)>>,
    }

    impl ScriptedClient {
        /// Always return a clone of the given response.
        pub(crate) fn returning(response: ParsedResponse) -> Self {
            Self {
                outcomes: Mutex::new(Vec::new()),
                repeat: Some(response),
                provider: ProviderId::OpenAi,
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Return the scripted outcomes in order, then error.
        pub(crate) fn with_script(outcomes: Vec<Outcome>) -> Self {
            let mut reversed = outcomes;
            reversed.reverse();
            Self {
                outcomes: Mutex::new(reversed),
                repeat: None,
                provider: ProviderId::OpenAi,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_provider(mut self, provider: ProviderId) -> Self {
            self.provider = provider;
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn last_messages(&self) -> Option<Vec<ChatMessage>> {
            self.calls.lock().unwrap().last().map(|c| c.1.clone())
        }

        pub(crate) fn last_options(&self) -> Option<RequestOptions> {
            self.calls.lock().unwrap().last().map(|c| c.2.clone())
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat_completion(
            &self,
            model: &str,
            messages: &[ChatMessage],
            options: &RequestOptions,
        ) -> Result<ParsedResponse, FailureReason> {
            self.calls.lock().unwrap().push((
                model.to_string(),
                messages.to_vec(),
                options.clone(),
            ));

            if let Some(response) = &self.repeat {
                return Ok(response.clone());
            }

            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| panic!("ScriptedClient ran out of outcomes"))
        }

        fn provider_id(&self) -> ProviderId {
            self.provider
        }
    }
}
