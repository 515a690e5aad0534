//! Evaluation repository.

use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{
    AgentConfig, BenchmarkId, Evaluation, EvaluationId, EvaluationStatus, FailureReason,
};
use crate::error::{Error, Result};

use super::{parse_datetime, with_conn, SharedConnection};

const COLUMNS: &str = "evaluation_id, agent_config, benchmark_id, status,
                       created_at, started_at, completed_at, failure_reason";

/// Persistence for the evaluation aggregate.
pub struct EvaluationStore {
    conn: SharedConnection,
}

impl EvaluationStore {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    pub fn create(&self, evaluation: &Evaluation) -> Result<()> {
        let agent_config = serde_json::to_string(&evaluation.agent_config)?;
        let failure_reason = evaluation
            .failure_reason
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        with_conn(&self.conn, |conn| {
            conn.execute(
                &format!("INSERT INTO evaluations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COLUMNS),
                params![
                    evaluation.id.to_string(),
                    agent_config,
                    evaluation.benchmark_id.to_string(),
                    evaluation.status.to_string(),
                    evaluation.created_at.to_rfc3339(),
                    evaluation.started_at.map(|t| t.to_rfc3339()),
                    evaluation.completed_at.map(|t| t.to_rfc3339()),
                    failure_reason,
                ],
            )?;
            Ok(())
        })
    }

    /// Persist the mutable lifecycle fields. Its own short transaction.
    pub fn update(&self, evaluation: &Evaluation) -> Result<()> {
        let failure_reason = evaluation
            .failure_reason
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let updated = with_conn(&self.conn, |conn| {
            conn.execute(
                "UPDATE evaluations
                 SET status = ?2, started_at = ?3, completed_at = ?4, failure_reason = ?5
                 WHERE evaluation_id = ?1",
                params![
                    evaluation.id.to_string(),
                    evaluation.status.to_string(),
                    evaluation.started_at.map(|t| t.to_rfc3339()),
                    evaluation.completed_at.map(|t| t.to_rfc3339()),
                    failure_reason,
                ],
            )
        })?;

        if updated == 0 {
            return Err(Error::not_found("Evaluation", evaluation.id.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, id: &EvaluationId) -> Result<Option<Evaluation>> {
        with_conn(&self.conn, |conn| {
            conn.query_row(
                &format!("SELECT {} FROM evaluations WHERE evaluation_id = ?1", COLUMNS),
                params![id.to_string()],
                row_to_evaluation,
            )
            .optional()
        })
    }

    /// List evaluations, optionally filtered, newest first.
    pub fn list(
        &self,
        status: Option<EvaluationStatus>,
        benchmark_id: Option<&BenchmarkId>,
    ) -> Result<Vec<Evaluation>> {
        with_conn(&self.conn, |conn| {
            let mut sql = format!("SELECT {} FROM evaluations WHERE 1=1", COLUMNS);
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(status) = status {
                sql.push_str(" AND status = ?");
                params_vec.push(Box::new(status.to_string()));
            }
            if let Some(benchmark_id) = benchmark_id {
                sql.push_str(" AND benchmark_id = ?");
                params_vec.push(Box::new(benchmark_id.to_string()));
            }
            sql.push_str(" ORDER BY created_at DESC");

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_refs.as_slice(), row_to_evaluation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Delete an evaluation; its result rows cascade.
    pub fn delete(&self, id: &EvaluationId) -> Result<bool> {
        with_conn(&self.conn, |conn| {
            let rows = conn.execute(
                "DELETE FROM evaluations WHERE evaluation_id = ?1",
                params![id.to_string()],
            )?;
            Ok(rows > 0)
        })
    }
}

fn row_to_evaluation(row: &Row) -> rusqlite::Result<Evaluation> {
    let id: String = row.get(0)?;
    let agent_config: String = row.get(1)?;
    let benchmark_id: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let started_at: Option<String> = row.get(5)?;
    let completed_at: Option<String> = row.get(6)?;
    let failure_reason: Option<String> = row.get(7)?;

    let agent_config: AgentConfig =
        serde_json::from_str(&agent_config).map_err(decode_error)?;
    let failure_reason: Option<FailureReason> = failure_reason
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(decode_error)?;

    Ok(Evaluation {
        id: EvaluationId(uuid::Uuid::parse_str(&id).map_err(decode_error)?),
        agent_config,
        benchmark_id: BenchmarkId(uuid::Uuid::parse_str(&benchmark_id).map_err(decode_error)?),
        status: EvaluationStatus::parse(&status).unwrap_or(EvaluationStatus::Failed),
        created_at: parse_datetime(&created_at),
        started_at: started_at.as_deref().map(parse_datetime),
        completed_at: completed_at.as_deref().map(parse_datetime),
        failure_reason,
    })
}

fn decode_error(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Benchmark, FailureCategory, Question};
    use crate::store::Database;

    fn setup() -> (Database, BenchmarkId) {
        let db = Database::in_memory().unwrap();
        let bench = Benchmark::new("B", "d", vec![Question::new("1", "q", "a")]).unwrap();
        db.benchmarks().create(&bench).unwrap();
        (db, bench.id)
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let (db, benchmark_id) = setup();
        let store = db.evaluations();

        let config = AgentConfig::new("chain_of_thought", "claude-3-sonnet")
            .with_model_parameter("max_tokens", 512);
        let eval = Evaluation::new(config, benchmark_id);
        store.create(&eval).unwrap();

        let loaded = store.get(&eval.id).unwrap().unwrap();
        assert_eq!(loaded.id, eval.id);
        assert_eq!(loaded.agent_config, eval.agent_config);
        assert_eq!(loaded.status, EvaluationStatus::Pending);
        assert!(loaded.started_at.is_none());
    }

    #[test]
    fn test_update_lifecycle_fields() {
        let (db, benchmark_id) = setup();
        let store = db.evaluations();

        let mut eval = Evaluation::new(AgentConfig::new("none", "gpt-4"), benchmark_id);
        store.create(&eval).unwrap();

        eval.start().unwrap();
        store.update(&eval).unwrap();
        let loaded = store.get(&eval.id).unwrap().unwrap();
        assert_eq!(loaded.status, EvaluationStatus::Running);
        assert!(loaded.started_at.is_some());

        eval.fail(FailureReason::new(
            FailureCategory::AuthenticationError,
            "bad key",
            "401",
        ))
        .unwrap();
        store.update(&eval).unwrap();
        let loaded = store.get(&eval.id).unwrap().unwrap();
        assert_eq!(loaded.status, EvaluationStatus::Failed);
        assert_eq!(
            loaded.failure_reason.unwrap().category,
            FailureCategory::AuthenticationError
        );
    }

    #[test]
    fn test_update_missing_row() {
        let (db, benchmark_id) = setup();
        let eval = Evaluation::new(AgentConfig::new("none", "gpt-4"), benchmark_id);
        let err = db.evaluations().update(&eval).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_list_filters() {
        let (db, benchmark_id) = setup();
        let store = db.evaluations();

        let mut running = Evaluation::new(AgentConfig::new("none", "gpt-4"), benchmark_id.clone());
        running.start().unwrap();
        let pending = Evaluation::new(AgentConfig::new("none", "gpt-4"), benchmark_id.clone());
        store.create(&running).unwrap();
        store.create(&pending).unwrap();

        let all = store.list(None, None).unwrap();
        assert_eq!(all.len(), 2);

        let only_running = store.list(Some(EvaluationStatus::Running), None).unwrap();
        assert_eq!(only_running.len(), 1);
        assert_eq!(only_running[0].id, running.id);

        let by_benchmark = store.list(None, Some(&benchmark_id)).unwrap();
        assert_eq!(by_benchmark.len(), 2);
    }

    #[test]
    fn test_unknown_benchmark_rejected_by_foreign_key() {
        let (db, _) = setup();
        let eval = Evaluation::new(AgentConfig::new("none", "gpt-4"), BenchmarkId::new());
        assert!(db.evaluations().create(&eval).is_err());
    }
}
