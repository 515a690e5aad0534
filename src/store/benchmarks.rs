//! Benchmark repository.

use rusqlite::{params, OptionalExtension};

use crate::domain::{Benchmark, BenchmarkId, Question};
use crate::error::{Error, Result};

use super::{with_conn, SharedConnection};

/// Persistence for benchmarks. Rows are immutable after creation.
pub struct BenchmarkStore {
    conn: SharedConnection,
}

impl BenchmarkStore {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Persist a benchmark atomically: the row embeds the full question list.
    ///
    /// Fails if the name is already taken.
    pub fn create(&self, benchmark: &Benchmark) -> Result<()> {
        let questions = serde_json::to_string(&benchmark.questions)?;

        with_conn(&self.conn, |conn| {
            conn.execute(
                "INSERT INTO benchmarks (benchmark_id, name, description, format_version, questions)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    benchmark.id.to_string(),
                    benchmark.name,
                    benchmark.description,
                    benchmark.format_version,
                    questions,
                ],
            )?;
            Ok(())
        })
        .map_err(|e| match e {
            Error::Storage(msg) if msg.contains("UNIQUE") => Error::config(format!(
                "Benchmark name '{}' already exists",
                benchmark.name
            )),
            other => other,
        })
    }

    pub fn get(&self, id: &BenchmarkId) -> Result<Option<Benchmark>> {
        self.query_one(
            "SELECT benchmark_id, name, description, format_version, questions
             FROM benchmarks WHERE benchmark_id = ?1",
            &id.to_string(),
        )
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Benchmark>> {
        self.query_one(
            "SELECT benchmark_id, name, description, format_version, questions
             FROM benchmarks WHERE name = ?1",
            name,
        )
    }

    fn query_one(&self, sql: &str, param: &str) -> Result<Option<Benchmark>> {
        let row = with_conn(&self.conn, |conn| {
            conn.query_row(sql, params![param], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .optional()
        })?;

        row.map(|(id, name, description, format_version, questions)| {
            let questions: Vec<Question> = serde_json::from_str(&questions)?;
            Ok(Benchmark {
                id: BenchmarkId::parse(&id)
                    .map_err(|e| Error::storage(format!("bad benchmark id: {}", e)))?,
                name,
                description,
                questions,
                format_version,
            })
        })
        .transpose()
    }

    /// List all benchmarks, ordered by name.
    pub fn list(&self) -> Result<Vec<Benchmark>> {
        let rows = with_conn(&self.conn, |conn| {
            let mut stmt = conn.prepare(
                "SELECT benchmark_id, name, description, format_version, questions
                 FROM benchmarks ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, name, description, format_version, questions)| {
                let questions: Vec<Question> = serde_json::from_str(&questions)?;
                Ok(Benchmark {
                    id: BenchmarkId::parse(&id)
                        .map_err(|e| Error::storage(format!("bad benchmark id: {}", e)))?,
                    name,
                    description,
                    questions,
                    format_version,
                })
            })
            .collect()
    }

    /// Delete a benchmark. Refused while evaluations reference it.
    pub fn delete(&self, id: &BenchmarkId) -> Result<bool> {
        let referencing: i64 = with_conn(&self.conn, |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM evaluations WHERE benchmark_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
        })?;

        if referencing > 0 {
            return Err(Error::config(format!(
                "Benchmark {} is referenced by {} evaluation(s) and cannot be deleted",
                id, referencing
            )));
        }

        with_conn(&self.conn, |conn| {
            let rows = conn.execute(
                "DELETE FROM benchmarks WHERE benchmark_id = ?1",
                params![id.to_string()],
            )?;
            Ok(rows > 0)
        })
    }
}
