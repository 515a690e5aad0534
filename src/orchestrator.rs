//! Evaluation orchestrator: lifecycle, per-question loop, interruption.
//!
//! Drives every question of a benchmark through the configured strategy and
//! client, persisting one result row per question in its own transaction.
//! That row set is the durable unit of progress: resume skips any question
//! id that already has a row, so crashes and interruptions lose at most the
//! in-flight question.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::domain::{
    AgentConfig, Evaluation, EvaluationId, EvaluationQuestionResult, EvaluationResults,
    EvaluationStatus, FailureReason, Progress, Question, ReasoningTrace,
};
use crate::error::{Error, Result};
use crate::llm::{ClientSource, RequestOptions};
use crate::store::{BenchmarkStore, Database, EvaluationStore, QuestionResultStore};
use crate::strategy::{ReasoningStrategy, StrategyRegistry};

/// Decides whether an extracted answer matches the expected one.
pub type AnswerComparator = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Receives one call per processed question.
pub type ProgressSink = Arc<dyn Fn(Progress, &str) + Send + Sync>;

/// Default comparison: trimmed, case-insensitive equality.
pub fn default_comparator() -> AnswerComparator {
    Arc::new(|actual, expected| {
        actual.trim().eq_ignore_ascii_case(expected.trim())
    })
}

/// Coordinates evaluations end to end.
pub struct EvaluationOrchestrator {
    evaluations: EvaluationStore,
    results: QuestionResultStore,
    benchmarks: BenchmarkStore,
    clients: Arc<dyn ClientSource>,
    strategies: StrategyRegistry,
    comparator: AnswerComparator,
    progress_sink: Option<ProgressSink>,
    /// At most one evaluation executes per process.
    run_lock: tokio::sync::Mutex<()>,
    interrupts: Mutex<HashMap<EvaluationId, Arc<AtomicBool>>>,
}

impl EvaluationOrchestrator {
    pub fn new(db: &Database, clients: Arc<dyn ClientSource>, strategies: StrategyRegistry) -> Self {
        Self {
            evaluations: db.evaluations(),
            results: db.results(),
            benchmarks: db.benchmarks(),
            clients,
            strategies,
            comparator: default_comparator(),
            progress_sink: None,
            run_lock: tokio::sync::Mutex::new(()),
            interrupts: Mutex::new(HashMap::new()),
        }
    }

    /// Override the answer comparison, e.g. for benchmark-specific rules.
    pub fn with_comparator(mut self, comparator: AnswerComparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    /// Validate the config, resolve the benchmark, persist a Pending
    /// evaluation. Nothing is persisted on validation failure.
    pub fn create_evaluation(
        &self,
        config: AgentConfig,
        benchmark_name: &str,
    ) -> Result<EvaluationId> {
        config.validate_parameters()?;
        let strategy = self.strategies.resolve(&config.strategy_id)?;
        strategy.validate_config(&config)?;
        self.clients.validate(&config)?;

        let benchmark = self
            .benchmarks
            .get_by_name(benchmark_name)?
            .ok_or_else(|| Error::not_found("Benchmark", benchmark_name))?;

        let evaluation = Evaluation::new(config, benchmark.id);
        self.evaluations.create(&evaluation)?;

        info!(
            evaluation = %evaluation.id,
            benchmark = benchmark_name,
            strategy = %evaluation.agent_config.strategy_id,
            model = %evaluation.agent_config.model_name,
            "created evaluation"
        );
        Ok(evaluation.id)
    }

    /// Signal graceful interruption; observed between questions.
    pub fn interrupt(&self, id: &EvaluationId) -> Result<()> {
        self.interrupt_handle(id)?.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// The interrupt flag for an evaluation, for wiring to SIGINT.
    pub fn interrupt_handle(&self, id: &EvaluationId) -> Result<Arc<AtomicBool>> {
        Ok(self
            .interrupt_registry()?
            .entry(id.clone())
            .or_default()
            .clone())
    }

    fn interrupt_registry(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<EvaluationId, Arc<AtomicBool>>>> {
        self.interrupts
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock interrupt registry: {}", e)))
    }

    /// Progress computed from persisted result rows.
    pub fn progress(&self, id: &EvaluationId) -> Result<Progress> {
        let evaluation = self.load(id)?;
        let benchmark = self
            .benchmarks
            .get(&evaluation.benchmark_id)?
            .ok_or_else(|| Error::not_found("Benchmark", evaluation.benchmark_id.to_string()))?;

        Ok(Progress {
            completed: self.results.count_for_evaluation(id)?,
            total: benchmark.len(),
        })
    }

    /// Aggregate results computed on read; nothing denormalized is stored.
    pub fn results(&self, id: &EvaluationId) -> Result<EvaluationResults> {
        self.load(id)?;
        let rows = self.results.for_evaluation(id)?;
        Ok(EvaluationResults::from_rows(id.clone(), rows))
    }

    /// Execute (or resume) an evaluation to a final state.
    ///
    /// Returns Ok once the evaluation reaches Completed, Failed, or
    /// Interrupted; the outcome lives on the evaluation row. Err is reserved
    /// for infrastructure problems (missing rows, storage failures on the
    /// lifecycle transitions themselves).
    pub async fn execute_evaluation(&self, id: &EvaluationId) -> Result<()> {
        let _guard = self.run_lock.lock().await;

        let mut evaluation = self.load(id)?;
        match evaluation.status {
            EvaluationStatus::Completed => {
                info!(evaluation = %id, "already completed; nothing to do");
                return Ok(());
            }
            EvaluationStatus::Failed => {
                return Err(Error::config(format!(
                    "Evaluation {} has failed and cannot be re-run",
                    id
                )));
            }
            _ => {}
        }

        // A stale interrupt from a previous run must not kill the resume.
        let interrupt = self.interrupt_handle(id)?;
        interrupt.store(false, Ordering::SeqCst);

        if evaluation.status != EvaluationStatus::Running {
            evaluation.start()?;
            self.evaluations.update(&evaluation)?;
        }

        let benchmark = self
            .benchmarks
            .get(&evaluation.benchmark_id)?
            .ok_or_else(|| Error::not_found("Benchmark", evaluation.benchmark_id.to_string()))?;

        let strategy = self.strategies.resolve(&evaluation.agent_config.strategy_id)?;

        let outcome = self
            .run_questions(&evaluation, &benchmark.questions, strategy.as_ref(), &interrupt)
            .await?;

        match outcome {
            RunOutcome::Interrupted => {
                evaluation.interrupt()?;
                info!(evaluation = %id, "interrupted");
            }
            RunOutcome::Fatal(reason) => {
                warn!(evaluation = %id, category = %reason.category, "fatal failure");
                evaluation.fail(reason)?;
            }
            RunOutcome::Completed => {
                evaluation.complete()?;
                info!(evaluation = %id, "completed");
            }
        }
        self.evaluations.update(&evaluation)?;

        self.interrupt_registry()?.remove(id);
        Ok(())
    }

    async fn run_questions(
        &self,
        evaluation: &Evaluation,
        questions: &[Question],
        strategy: &dyn ReasoningStrategy,
        interrupt: &AtomicBool,
    ) -> Result<RunOutcome> {
        // The client is constructed once per run; a configuration failure
        // here (missing credentials) is fatal for the evaluation.
        let client = match self.clients.create(&evaluation.agent_config) {
            Ok(client) => client,
            Err(reason) => return Ok(RunOutcome::Fatal(reason)),
        };

        let done = self.results.processed_question_ids(&evaluation.id)?;
        let total = questions.len();
        let mut completed = done.len();

        let base_options = RequestOptions::from_agent_config(&evaluation.agent_config)
            .with_output_schema_id(strategy.output_schema_id());

        for question in questions {
            if interrupt.load(Ordering::SeqCst) {
                return Ok(RunOutcome::Interrupted);
            }
            if done.contains(&question.id) {
                debug!(question = %question.id, "already processed; skipping");
                continue;
            }

            let messages = strategy.build_prompt(question, &evaluation.agent_config);

            let started = Instant::now();
            let response = client
                .chat_completion(&evaluation.agent_config.model_name, &messages, &base_options)
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let row = match response.and_then(|r| {
                strategy
                    .process_response(&r)
                    .map(|outcome| (r, outcome))
            }) {
                Ok((response, outcome)) => {
                    let is_correct =
                        (self.comparator)(&outcome.final_answer, &question.expected_answer);

                    let mut trace =
                        ReasoningTrace::new(strategy.id(), outcome.reasoning_text.clone())
                            .with_metadata(outcome.metadata.clone());
                    if let Some(confidence) = response.metadata.get("confidence") {
                        trace
                            .metadata
                            .insert("confidence".to_string(), confidence.clone());
                    }

                    EvaluationQuestionResult::answered(
                        evaluation.id.clone(),
                        &question.id,
                        &question.text,
                        &question.expected_answer,
                        &outcome.final_answer,
                        is_correct,
                        elapsed_ms,
                        trace,
                    )
                }
                Err(reason) if reason.is_fatal() => {
                    return Ok(RunOutcome::Fatal(reason));
                }
                Err(reason) => {
                    debug!(question = %question.id, failure = %reason, "question failed");
                    EvaluationQuestionResult::failed(
                        evaluation.id.clone(),
                        &question.id,
                        &question.text,
                        &question.expected_answer,
                        strategy.id(),
                        elapsed_ms,
                        &reason,
                    )
                }
            };

            // One row, one transaction. An aborted insert leaves no trace,
            // which is exactly what resume relies on.
            if let Err(e) = self.results.insert(&row) {
                return Ok(RunOutcome::Fatal(FailureReason::configuration(format!(
                    "Failed to persist result for question '{}': {}",
                    question.id, e
                ))));
            }

            completed += 1;
            self.report_progress(completed, total, &row);
        }

        Ok(RunOutcome::Completed)
    }

    fn report_progress(&self, completed: usize, total: usize, row: &EvaluationQuestionResult) {
        let message = match &row.error_message {
            Some(error) => format!("question {}: error ({})", row.question_id, error),
            None if row.is_correct => format!("question {}: correct", row.question_id),
            None => format!("question {}: incorrect", row.question_id),
        };
        if let Some(sink) = &self.progress_sink {
            sink(Progress { completed, total }, &message);
        }
    }

    fn load(&self, id: &EvaluationId) -> Result<Evaluation> {
        self.evaluations
            .get(id)?
            .ok_or_else(|| Error::not_found("Evaluation", id.to_string()))
    }
}

enum RunOutcome {
    Completed,
    Interrupted,
    Fatal(FailureReason),
}
