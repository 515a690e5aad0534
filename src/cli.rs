//! CLI argument parsing and command handlers.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::domain::{
    AgentConfig, Benchmark, EvaluationId, EvaluationStatus, FailureCategory, ParsingStrategyId,
    ProviderId, Question,
};
use crate::error::Error;
use crate::orchestrator::{EvaluationOrchestrator, ProgressSink};
use crate::schema::SchemaRegistry;
use crate::settings::Settings;
use crate::store::Database;
use crate::strategy::StrategyRegistry;

// Exit codes per command contract.
const EXIT_OK: i32 = 0;
const EXIT_OTHER: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_NOT_FOUND: i32 = 3;
const EXIT_AUTH: i32 = 4;
const EXIT_INTERRUPTED: i32 = 130;

/// reasonbench: evaluate LLM reasoning strategies against benchmarks
#[derive(Parser, Debug)]
#[command(
    name = "reasonbench",
    version,
    about = "Evaluate LLM reasoning strategies against question benchmarks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, run, and list evaluations
    Evaluate {
        #[command(subcommand)]
        command: EvaluateCommand,
    },

    /// Inspect and import benchmarks
    Benchmark {
        #[command(subcommand)]
        command: BenchmarkCommand,
    },

    /// Check database connectivity and provider credentials
    Health,
}

#[derive(Subcommand, Debug)]
pub enum EvaluateCommand {
    /// Configure a new evaluation; prints its id
    Create {
        /// Reasoning strategy id (none, chain_of_thought, ...)
        #[arg(long)]
        strategy: String,

        /// Model identifier (e.g. gpt-4, claude-3-sonnet)
        #[arg(long)]
        model: String,

        /// Benchmark name
        #[arg(long)]
        benchmark: String,

        /// Provider (openrouter, openai, anthropic, litellm); auto-detected
        /// from the model name when omitted
        #[arg(long)]
        provider: Option<String>,

        /// Parsing strategy (auto, native, post_process, constrained)
        #[arg(long)]
        parser: Option<String>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f64>,

        /// Completion token limit
        #[arg(long)]
        max_tokens: Option<u64>,
    },

    /// Run (or resume) an evaluation, streaming progress
    Run {
        /// Evaluation id printed by `evaluate create`
        evaluation_id: String,
    },

    /// List evaluations
    List {
        /// Filter by status (pending, running, completed, failed, interrupted)
        #[arg(long)]
        status: Option<String>,

        /// Filter by benchmark name
        #[arg(long)]
        benchmark: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum BenchmarkCommand {
    /// List benchmarks
    List,

    /// Show one benchmark with its questions
    Show {
        /// Benchmark name
        name: String,
    },

    /// Import a benchmark from a JSON file
    Import {
        /// Path to a JSON file: {name, description, questions: [...]}
        file: PathBuf,
    },
}

/// On-disk benchmark format accepted by `benchmark import`.
#[derive(Debug, Deserialize)]
struct BenchmarkFile {
    name: String,
    #[serde(default)]
    description: String,
    questions: Vec<QuestionEntry>,
}

#[derive(Debug, Deserialize)]
struct QuestionEntry {
    id: String,
    text: String,
    expected_answer: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl Cli {
    /// Execute the parsed command, returning the process exit code.
    pub async fn execute(self) -> i32 {
        let settings = match Settings::from_env() {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_CONFIG;
            }
        };

        init_tracing(&settings);

        let db = match Database::from_url(&settings.database_url) {
            Ok(db) => db,
            Err(e) => {
                eprintln!("Error: {} — check DATABASE_URL", e);
                return EXIT_OTHER;
            }
        };

        match self.command {
            Command::Evaluate { command } => run_evaluate(command, &db, &settings).await,
            Command::Benchmark { command } => run_benchmark(command, &db),
            Command::Health => run_health(&db, &settings),
        }
    }
}

fn init_tracing(settings: &Settings) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));
    // Ignore errors from double initialization in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_orchestrator(db: &Database, settings: &Settings) -> EvaluationOrchestrator {
    let factory = settings.client_factory(SchemaRegistry::builtin());
    EvaluationOrchestrator::new(db, Arc::new(factory), StrategyRegistry::builtin())
}

async fn run_evaluate(command: EvaluateCommand, db: &Database, settings: &Settings) -> i32 {
    match command {
        EvaluateCommand::Create {
            strategy,
            model,
            benchmark,
            provider,
            parser,
            temperature,
            max_tokens,
        } => {
            let mut config = AgentConfig::new(strategy, model);

            if let Some(provider) = provider {
                match ProviderId::parse(&provider) {
                    Some(id) => config = config.with_provider(id),
                    None => {
                        eprintln!("Error: unknown provider '{}'", provider);
                        return EXIT_CONFIG;
                    }
                }
            }
            if let Some(parser) = parser {
                match ParsingStrategyId::parse(&parser) {
                    Some(id) => config = config.with_parsing_strategy(id),
                    None => {
                        eprintln!("Error: unknown parsing strategy '{}'", parser);
                        return EXIT_CONFIG;
                    }
                }
            }
            if let Some(temperature) = temperature {
                config = config.with_model_parameter("temperature", temperature);
            }
            if let Some(max_tokens) = max_tokens {
                config = config.with_model_parameter("max_tokens", max_tokens);
            }

            let orchestrator = build_orchestrator(db, settings);
            match orchestrator.create_evaluation(config, &benchmark) {
                Ok(id) => {
                    println!("{}", id);
                    EXIT_OK
                }
                Err(e) => report_error(e),
            }
        }

        EvaluateCommand::Run { evaluation_id } => {
            let id = match EvaluationId::parse(&evaluation_id) {
                Ok(id) => id,
                Err(_) => {
                    eprintln!("Error: '{}' is not an evaluation id", evaluation_id);
                    return EXIT_NOT_FOUND;
                }
            };

            let sink: ProgressSink = Arc::new(|progress: crate::domain::Progress, message: &str| {
                println!("Progress: {} — {}", progress, message);
            });
            let orchestrator = build_orchestrator(db, settings).with_progress_sink(sink);

            // SIGINT interrupts gracefully between questions.
            let flag = match orchestrator.interrupt_handle(&id) {
                Ok(flag) => flag,
                Err(e) => return report_error(e),
            };
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Interrupting after the current question...");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            if let Err(e) = orchestrator.execute_evaluation(&id).await {
                return report_error(e);
            }

            let evaluation = match db.evaluations().get(&id) {
                Ok(Some(evaluation)) => evaluation,
                Ok(None) => {
                    eprintln!("Error: evaluation {} not found", id);
                    return EXIT_NOT_FOUND;
                }
                Err(e) => return report_error(e),
            };

            match evaluation.status {
                EvaluationStatus::Completed => {
                    match orchestrator.results(&id) {
                        Ok(results) => {
                            println!(
                                "Completed: {}/{} correct ({:.1}%), {} errors, avg {:.0} ms/question",
                                results.correct_answers,
                                results.total_questions,
                                results.accuracy * 100.0,
                                results.error_count,
                                results.average_execution_time_ms,
                            );
                            EXIT_OK
                        }
                        Err(e) => report_error(e),
                    }
                }
                EvaluationStatus::Interrupted => {
                    println!("Interrupted — run again to resume");
                    EXIT_INTERRUPTED
                }
                EvaluationStatus::Failed => {
                    let (message, hint, code) = match &evaluation.failure_reason {
                        Some(reason) => (
                            reason.description.clone(),
                            failure_hint(reason.category),
                            if reason.category == FailureCategory::AuthenticationError {
                                EXIT_AUTH
                            } else {
                                EXIT_OTHER
                            },
                        ),
                        None => ("unknown failure".to_string(), "", EXIT_OTHER),
                    };
                    eprintln!("Failed: {} — {}", message, hint);
                    code
                }
                status => {
                    eprintln!("Error: evaluation ended in unexpected status '{}'", status);
                    EXIT_OTHER
                }
            }
        }

        EvaluateCommand::List { status, benchmark } => {
            let status = match status.as_deref().map(EvaluationStatus::parse) {
                Some(None) => {
                    eprintln!("Error: unknown status '{}'", status.unwrap());
                    return EXIT_CONFIG;
                }
                Some(parsed) => parsed,
                None => None,
            };

            let benchmark_id = match benchmark {
                Some(name) => match db.benchmarks().get_by_name(&name) {
                    Ok(Some(bench)) => Some(bench.id),
                    Ok(None) => {
                        eprintln!("Error: benchmark '{}' not found", name);
                        return EXIT_NOT_FOUND;
                    }
                    Err(e) => return report_error(e),
                },
                None => None,
            };

            let evaluations = match db.evaluations().list(status, benchmark_id.as_ref()) {
                Ok(evaluations) => evaluations,
                Err(e) => return report_error(e),
            };

            let benchmark_names: HashMap<String, String> = match db.benchmarks().list() {
                Ok(benchmarks) => benchmarks
                    .into_iter()
                    .map(|b| (b.id.to_string(), b.name))
                    .collect(),
                Err(e) => return report_error(e),
            };

            println!(
                "{:<36}  {:<12}  {:<17}  {:<24}  {}",
                "ID", "STATUS", "STRATEGY", "MODEL", "BENCHMARK"
            );
            for evaluation in evaluations {
                let benchmark = benchmark_names
                    .get(&evaluation.benchmark_id.to_string())
                    .map(String::as_str)
                    .unwrap_or("?");
                println!(
                    "{:<36}  {:<12}  {:<17}  {:<24}  {}",
                    evaluation.id,
                    evaluation.status.to_string(),
                    evaluation.agent_config.strategy_id,
                    evaluation.agent_config.model_name,
                    benchmark,
                );
            }
            EXIT_OK
        }
    }
}

fn run_benchmark(command: BenchmarkCommand, db: &Database) -> i32 {
    match command {
        BenchmarkCommand::List => {
            let benchmarks = match db.benchmarks().list() {
                Ok(benchmarks) => benchmarks,
                Err(e) => return report_error(e),
            };

            println!("{:<24}  {:>9}  {}", "NAME", "QUESTIONS", "DESCRIPTION");
            for benchmark in benchmarks {
                println!(
                    "{:<24}  {:>9}  {}",
                    benchmark.name,
                    benchmark.len(),
                    benchmark.description
                );
            }
            EXIT_OK
        }

        BenchmarkCommand::Show { name } => match db.benchmarks().get_by_name(&name) {
            Ok(Some(benchmark)) => {
                println!("{} — {}", benchmark.name, benchmark.description);
                println!("{:<8}  {:<48}  {}", "ID", "QUESTION", "EXPECTED");
                for question in &benchmark.questions {
                    println!(
                        "{:<8}  {:<48}  {}",
                        question.id,
                        truncate_cell(&question.text, 48),
                        question.expected_answer
                    );
                }
                EXIT_OK
            }
            Ok(None) => {
                eprintln!("Error: benchmark '{}' not found", name);
                EXIT_NOT_FOUND
            }
            Err(e) => report_error(e),
        },

        BenchmarkCommand::Import { file } => {
            let raw = match std::fs::read_to_string(&file) {
                Ok(raw) => raw,
                Err(e) => {
                    eprintln!("Error: cannot read {}: {}", file.display(), e);
                    return EXIT_OTHER;
                }
            };

            let parsed: BenchmarkFile = match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    eprintln!("Error: {} is not a valid benchmark file: {}", file.display(), e);
                    return EXIT_CONFIG;
                }
            };

            let questions = parsed
                .questions
                .into_iter()
                .map(|q| {
                    let mut question = Question::new(q.id, q.text, q.expected_answer);
                    question.metadata = q.metadata;
                    question
                })
                .collect();

            let benchmark = match Benchmark::new(parsed.name, parsed.description, questions) {
                Ok(benchmark) => benchmark,
                Err(reason) => {
                    eprintln!("Error: {}", reason.description);
                    return EXIT_CONFIG;
                }
            };

            match db.benchmarks().create(&benchmark) {
                Ok(()) => {
                    println!("Imported '{}' ({} questions)", benchmark.name, benchmark.len());
                    EXIT_OK
                }
                Err(e) => report_error(e),
            }
        }
    }
}

fn run_health(db: &Database, settings: &Settings) -> i32 {
    let db_ok = db.ping().is_ok();
    println!("database: {}", if db_ok { "ok" } else { "unreachable" });

    for provider in ProviderId::ALL {
        let configured = settings.providers.contains_key(&provider);
        println!(
            "provider {}: {}",
            provider,
            if configured { "configured" } else { "not configured" }
        );
    }

    if db_ok && !settings.providers.is_empty() {
        EXIT_OK
    } else {
        EXIT_OTHER
    }
}

fn report_error(e: Error) -> i32 {
    eprintln!("Error: {}", e);
    match e {
        Error::Config(_) => EXIT_CONFIG,
        Error::NotFound { .. } => EXIT_NOT_FOUND,
        _ => EXIT_OTHER,
    }
}

fn failure_hint(category: FailureCategory) -> &'static str {
    match category {
        FailureCategory::AuthenticationError => {
            "check the provider API key environment variable"
        }
        FailureCategory::CreditLimitExceeded => "top up the provider account",
        FailureCategory::ConfigurationError => "check the evaluation's agent configuration",
        FailureCategory::RateLimitExceeded => "wait and resume the evaluation",
        FailureCategory::NetworkTimeout => "check connectivity and resume the evaluation",
        _ => "re-run with DEBUG_MODE=true for details",
    }
}

fn truncate_cell(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_evaluate_create() {
        let cli = Cli::try_parse_from([
            "reasonbench",
            "evaluate",
            "create",
            "--strategy",
            "chain_of_thought",
            "--model",
            "claude-3-sonnet",
            "--benchmark",
            "MINI",
            "--provider",
            "anthropic",
            "--temperature",
            "0.2",
            "--max-tokens",
            "512",
        ])
        .unwrap();

        match cli.command {
            Command::Evaluate {
                command:
                    EvaluateCommand::Create {
                        strategy,
                        model,
                        benchmark,
                        provider,
                        parser,
                        temperature,
                        max_tokens,
                    },
            } => {
                assert_eq!(strategy, "chain_of_thought");
                assert_eq!(model, "claude-3-sonnet");
                assert_eq!(benchmark, "MINI");
                assert_eq!(provider.as_deref(), Some("anthropic"));
                assert_eq!(parser, None);
                assert_eq!(temperature, Some(0.2));
                assert_eq!(max_tokens, Some(512));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_benchmark_import() {
        let cli =
            Cli::try_parse_from(["reasonbench", "benchmark", "import", "mini.json"]).unwrap();
        match cli.command {
            Command::Benchmark {
                command: BenchmarkCommand::Import { file },
            } => assert_eq!(file, PathBuf::from("mini.json")),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_benchmark_file_format() {
        let raw = r#"{
            "name": "MINI",
            "description": "tiny",
            "questions": [
                {"id": "1", "text": "What is 2+2?", "expected_answer": "4"}
            ]
        }"#;
        let parsed: BenchmarkFile = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.name, "MINI");
        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.questions[0].expected_answer, "4");
    }
}
