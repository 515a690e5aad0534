//! Question result repository. Rows are insert-only.

use rusqlite::{params, Row};
use std::collections::HashSet;

use crate::domain::{EvaluationId, EvaluationQuestionResult, ReasoningTrace, ResultId};
use crate::error::{Error, Result};

use super::{parse_datetime, with_conn, SharedConnection};

const COLUMNS: &str = "id, evaluation_id, question_id, question_text, expected_answer,
                       actual_answer, is_correct, execution_time_ms, reasoning_trace,
                       error_message, processed_at";

/// Persistence for per-question results.
pub struct QuestionResultStore {
    conn: SharedConnection,
}

impl QuestionResultStore {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Insert one result. Atomic; the unique `(evaluation_id, question_id)`
    /// constraint rejects re-processing.
    pub fn insert(&self, result: &EvaluationQuestionResult) -> Result<()> {
        let trace = serde_json::to_string(&result.reasoning_trace)?;

        with_conn(&self.conn, |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO evaluation_question_results ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    COLUMNS
                ),
                params![
                    result.id.to_string(),
                    result.evaluation_id.to_string(),
                    result.question_id,
                    result.question_text,
                    result.expected_answer,
                    result.actual_answer,
                    result.is_correct,
                    result.execution_time_ms as i64,
                    trace,
                    result.error_message,
                    result.processed_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .map_err(|e| match e {
            Error::Storage(msg) if msg.contains("UNIQUE") => Error::storage(format!(
                "Result for question '{}' in evaluation {} already recorded",
                result.question_id, result.evaluation_id
            )),
            other => other,
        })
    }

    /// All results for an evaluation, in processing order.
    pub fn for_evaluation(&self, id: &EvaluationId) -> Result<Vec<EvaluationQuestionResult>> {
        with_conn(&self.conn, |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM evaluation_question_results
                 WHERE evaluation_id = ?1 ORDER BY processed_at, question_id",
                COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![id.to_string()], row_to_result)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// The set of question ids already persisted for an evaluation.
    ///
    /// Resume is defined over this set, not over row positions.
    pub fn processed_question_ids(&self, id: &EvaluationId) -> Result<HashSet<String>> {
        with_conn(&self.conn, |conn| {
            let mut stmt = conn.prepare(
                "SELECT question_id FROM evaluation_question_results WHERE evaluation_id = ?1",
            )?;
            let ids = stmt
                .query_map(params![id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(ids)
        })
    }

    pub fn count_for_evaluation(&self, id: &EvaluationId) -> Result<usize> {
        with_conn(&self.conn, |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM evaluation_question_results WHERE evaluation_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

fn row_to_result(row: &Row) -> rusqlite::Result<EvaluationQuestionResult> {
    let id: String = row.get(0)?;
    let evaluation_id: String = row.get(1)?;
    let trace: String = row.get(8)?;
    let processed_at: String = row.get(10)?;

    let reasoning_trace: ReasoningTrace = serde_json::from_str(&trace).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(EvaluationQuestionResult {
        id: ResultId(uuid::Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?),
        evaluation_id: EvaluationId(uuid::Uuid::parse_str(&evaluation_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?),
        question_id: row.get(2)?,
        question_text: row.get(3)?,
        expected_answer: row.get(4)?,
        actual_answer: row.get(5)?,
        is_correct: row.get(6)?,
        execution_time_ms: row.get::<_, i64>(7)? as u64,
        reasoning_trace,
        error_message: row.get(9)?,
        processed_at: parse_datetime(&processed_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentConfig, Benchmark, Evaluation, Question};
    use crate::store::Database;

    fn setup() -> (Database, EvaluationId) {
        let db = Database::in_memory().unwrap();
        let bench = Benchmark::new("B", "d", vec![Question::new("1", "q", "a")]).unwrap();
        db.benchmarks().create(&bench).unwrap();
        let eval = Evaluation::new(AgentConfig::new("none", "gpt-4"), bench.id);
        db.evaluations().create(&eval).unwrap();
        (db, eval.id)
    }

    fn result(evaluation_id: &EvaluationId, question_id: &str) -> EvaluationQuestionResult {
        EvaluationQuestionResult::answered(
            evaluation_id.clone(),
            question_id,
            "What is 2+2?",
            "4",
            "4",
            true,
            120,
            ReasoningTrace::new("none", ""),
        )
    }

    #[test]
    fn test_insert_and_load_round_trip() {
        let (db, eval_id) = setup();
        let store = db.results();

        let row = result(&eval_id, "1");
        store.insert(&row).unwrap();

        let loaded = store.for_evaluation(&eval_id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].question_id, "1");
        assert_eq!(loaded[0].actual_answer, "4");
        assert!(loaded[0].is_correct);
        assert_eq!(loaded[0].processed_at, row.processed_at);
    }

    #[test]
    fn test_duplicate_question_rejected() {
        let (db, eval_id) = setup();
        let store = db.results();

        store.insert(&result(&eval_id, "1")).unwrap();
        let err = store.insert(&result(&eval_id, "1")).unwrap_err();
        assert!(err.to_string().contains("already recorded"));

        assert_eq!(store.count_for_evaluation(&eval_id).unwrap(), 1);
    }

    #[test]
    fn test_processed_question_ids() {
        let (db, eval_id) = setup();
        let store = db.results();

        store.insert(&result(&eval_id, "1")).unwrap();
        store.insert(&result(&eval_id, "2")).unwrap();

        let ids = store.processed_question_ids(&eval_id).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("2"));
    }

    #[test]
    fn test_cascade_delete_with_evaluation() {
        let (db, eval_id) = setup();
        db.results().insert(&result(&eval_id, "1")).unwrap();

        assert!(db.evaluations().delete(&eval_id).unwrap());
        assert_eq!(db.results().count_for_evaluation(&eval_id).unwrap(), 0);
    }

    #[test]
    fn test_insert_requires_existing_evaluation() {
        let (db, _) = setup();
        let orphan = result(&EvaluationId::new(), "1");
        assert!(db.results().insert(&orphan).is_err());
    }
}
