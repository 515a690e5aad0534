//! The evaluation aggregate and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::agent_config::AgentConfig;
use super::benchmark::BenchmarkId;
use super::failure::FailureReason;

/// Unique identifier for an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationId(pub Uuid);

impl EvaluationId {
    /// Generate a new random evaluation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::not_found("Evaluation", s))
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an evaluation.
///
/// Permitted transitions: Pending -> Running; Running -> Completed | Failed |
/// Interrupted; Interrupted -> Running (resume). Completed and Failed are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl EvaluationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Terminal states are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{}", s)
    }
}

/// A run of one reasoning strategy + model against one benchmark.
///
/// Owns its per-question result rows; references a benchmark it never owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub agent_config: AgentConfig,
    pub benchmark_id: BenchmarkId,
    pub status: EvaluationStatus,
    pub created_at: DateTime<Utc>,
    /// Set the first time the evaluation leaves Pending.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the evaluation reaches Completed, Failed, or Interrupted.
    pub completed_at: Option<DateTime<Utc>>,
    /// Present iff status is Failed.
    pub failure_reason: Option<FailureReason>,
}

impl Evaluation {
    pub fn new(agent_config: AgentConfig, benchmark_id: BenchmarkId) -> Self {
        Self {
            id: EvaluationId::new(),
            agent_config,
            benchmark_id,
            status: EvaluationStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Transition Pending or Interrupted into Running.
    ///
    /// Resuming an interrupted evaluation clears its completion timestamp.
    pub fn start(&mut self) -> Result<()> {
        match self.status {
            EvaluationStatus::Pending | EvaluationStatus::Interrupted => {
                self.status = EvaluationStatus::Running;
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
                self.completed_at = None;
                Ok(())
            }
            from => Err(Error::invalid_transition(from, EvaluationStatus::Running)),
        }
    }

    /// Transition Running into Completed.
    pub fn complete(&mut self) -> Result<()> {
        self.finish(EvaluationStatus::Completed, None)
    }

    /// Transition Running into Failed, attaching the fatal failure.
    pub fn fail(&mut self, reason: FailureReason) -> Result<()> {
        self.finish(EvaluationStatus::Failed, Some(reason))
    }

    /// Transition Running into Interrupted.
    pub fn interrupt(&mut self) -> Result<()> {
        self.finish(EvaluationStatus::Interrupted, None)
    }

    fn finish(&mut self, to: EvaluationStatus, reason: Option<FailureReason>) -> Result<()> {
        if self.status != EvaluationStatus::Running {
            return Err(Error::invalid_transition(self.status, to));
        }
        self.status = to;
        self.completed_at = Some(Utc::now());
        self.failure_reason = reason;
        Ok(())
    }

    /// Whether `execute` may (re)run this evaluation.
    pub fn is_resumable(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureCategory;

    fn evaluation() -> Evaluation {
        Evaluation::new(AgentConfig::new("none", "gpt-4"), BenchmarkId::new())
    }

    #[test]
    fn test_new_is_pending() {
        let eval = evaluation();
        assert_eq!(eval.status, EvaluationStatus::Pending);
        assert!(eval.started_at.is_none());
        assert!(eval.completed_at.is_none());
        assert!(eval.failure_reason.is_none());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut eval = evaluation();
        eval.start().unwrap();
        assert_eq!(eval.status, EvaluationStatus::Running);
        assert!(eval.started_at.is_some());

        eval.complete().unwrap();
        assert_eq!(eval.status, EvaluationStatus::Completed);
        assert!(eval.completed_at.is_some());
    }

    #[test]
    fn test_fail_attaches_reason() {
        let mut eval = evaluation();
        eval.start().unwrap();
        eval.fail(FailureReason::new(
            FailureCategory::AuthenticationError,
            "bad key",
            "401",
        ))
        .unwrap();

        assert_eq!(eval.status, EvaluationStatus::Failed);
        assert_eq!(
            eval.failure_reason.as_ref().unwrap().category,
            FailureCategory::AuthenticationError
        );
    }

    #[test]
    fn test_interrupt_and_resume() {
        let mut eval = evaluation();
        eval.start().unwrap();
        let started = eval.started_at;
        eval.interrupt().unwrap();
        assert_eq!(eval.status, EvaluationStatus::Interrupted);
        assert!(eval.completed_at.is_some());

        eval.start().unwrap();
        assert_eq!(eval.status, EvaluationStatus::Running);
        // started_at keeps the original first-start time; interruption is erased.
        assert_eq!(eval.started_at, started);
        assert!(eval.completed_at.is_none());
    }

    #[test]
    fn test_terminal_states_immutable() {
        let mut eval = evaluation();
        eval.start().unwrap();
        eval.complete().unwrap();

        assert!(eval.start().is_err());
        assert!(eval.complete().is_err());
        assert!(eval.interrupt().is_err());
    }

    #[test]
    fn test_cannot_complete_pending() {
        let mut eval = evaluation();
        let err = eval.complete().unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_failure_reason_iff_failed() {
        let mut eval = evaluation();
        eval.start().unwrap();
        eval.complete().unwrap();
        assert!(eval.failure_reason.is_none());
    }

    proptest::proptest! {
        // Any sequence of attempted transitions preserves the timestamp and
        // failure-reason invariants, whether the transitions are accepted
        // or rejected.
        #[test]
        fn prop_lifecycle_invariants(ops in proptest::collection::vec(0u8..4u8, 0..12)) {
            let mut eval = evaluation();
            for op in ops {
                let _ = match op {
                    0 => eval.start(),
                    1 => eval.complete(),
                    2 => eval.fail(FailureReason::new(
                        FailureCategory::Unknown,
                        "injected",
                        "prop test",
                    )),
                    _ => eval.interrupt(),
                };

                proptest::prop_assert_eq!(
                    eval.started_at.is_some(),
                    eval.status != EvaluationStatus::Pending
                );
                proptest::prop_assert_eq!(
                    eval.completed_at.is_some(),
                    matches!(
                        eval.status,
                        EvaluationStatus::Completed
                            | EvaluationStatus::Failed
                            | EvaluationStatus::Interrupted
                    )
                );
                proptest::prop_assert_eq!(
                    eval.failure_reason.is_some(),
                    eval.status == EvaluationStatus::Failed
                );
            }
        }
    }
}
