//! # reasonbench
//!
//! A benchmark harness for evaluating LLM reasoning strategies.
//!
//! An **evaluation** pairs a reasoning strategy (direct answer, chain of
//! thought, ...) with a model, provider, and parsing strategy, and drives
//! every question of a **benchmark** through it. Each question's outcome is
//! persisted individually, so interrupted runs resume where they left off;
//! aggregate accuracy is computed from the persisted rows on read.
//!
//! ## Core Components
//!
//! - **Domain**: evaluations, benchmarks, results, and classified failures
//! - **Strategy**: prompt construction and response post-processing per id
//! - **LLM**: provider clients and structured-output parsing decorators
//! - **Store**: SQLite-backed repositories
//! - **Orchestrator**: lifecycle, per-question loop, graceful interruption
//!
//! ## Example
//!
//! ```rust,ignore
//! use reasonbench::{
//!     AgentConfig, ClientFactory, Database, EvaluationOrchestrator,
//!     SchemaRegistry, Settings, StrategyRegistry,
//! };
//! use std::sync::Arc;
//!
//! let settings = Settings::from_env()?;
//! let db = Database::from_url(&settings.database_url)?;
//! let factory = settings.client_factory(SchemaRegistry::builtin());
//!
//! let orchestrator =
//!     EvaluationOrchestrator::new(&db, Arc::new(factory), StrategyRegistry::builtin());
//!
//! let config = AgentConfig::new("chain_of_thought", "claude-3-sonnet");
//! let id = orchestrator.create_evaluation(config, "gsm8k-mini")?;
//! orchestrator.execute_evaluation(&id).await?;
//!
//! let results = orchestrator.results(&id)?;
//! println!("accuracy: {:.1}%", results.accuracy * 100.0);
//! ```

pub mod cli;
pub mod domain;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod schema;
pub mod settings;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use domain::{
    AgentConfig, Benchmark, BenchmarkId, Evaluation, EvaluationId, EvaluationQuestionResult,
    EvaluationResults, EvaluationStatus, FailureCategory, FailureReason, ParsedResponse,
    ParsingStrategyId, Progress, ProviderId, Question, ReasoningTrace, ResultId,
};
pub use error::{Error, Result};
pub use llm::{
    AnthropicClient, ChatMessage, ChatRole, ClientFactory, ClientSource, ConstrainedParser,
    LiteLlmClient, LlmClient, NativeParser, OpenAiClient, OpenRouterClient, ParseStage,
    PostProcessParser, ProviderConfig, RequestOptions,
};
pub use orchestrator::{
    default_comparator, AnswerComparator, EvaluationOrchestrator, ProgressSink,
};
pub use schema::{FieldKind, FieldSpec, OutputSchema, SchemaRegistry, SchemaViolation};
pub use settings::Settings;
pub use store::{BenchmarkStore, Database, EvaluationStore, QuestionResultStore};
pub use strategy::{
    ChainOfThoughtStrategy, DirectStrategy, ReasoningResult, ReasoningStrategy, StrategyRegistry,
};
