//! SQLite-backed repositories for benchmarks, evaluations, and results.
//!
//! A [`Database`] owns one connection behind a mutex; the per-aggregate
//! stores share it. Every write is a single-statement transaction, which is
//! what makes interrupted evaluations resumable: a question result is either
//! fully persisted or absent.

mod benchmarks;
mod evaluations;
mod results;
pub mod schema;

pub use benchmarks::BenchmarkStore;
pub use evaluations::EvaluationStore;
pub use results::QuestionResultStore;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// Handle to the SQLite database, shared by all stores.
#[derive(Clone)]
pub struct Database {
    conn: SharedConnection,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage(e.to_string()))?;
        schema::initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage(e.to_string()))?;
        schema::initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open from a `DATABASE_URL`-style value: a path, `sqlite:<path>`,
    /// or `:memory:`.
    pub fn from_url(url: &str) -> Result<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(path)
        }
    }

    pub fn benchmarks(&self) -> BenchmarkStore {
        BenchmarkStore::new(self.conn.clone())
    }

    pub fn evaluations(&self) -> EvaluationStore {
        EvaluationStore::new(self.conn.clone())
    }

    pub fn results(&self) -> QuestionResultStore {
        QuestionResultStore::new(self.conn.clone())
    }

    /// Cheap connectivity probe for health checks.
    pub fn ping(&self) -> Result<()> {
        with_conn(&self.conn, |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
        })
        .map(|_| ())
    }
}

pub(crate) fn with_conn<F, T>(conn: &SharedConnection, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> rusqlite::Result<T>,
{
    let conn = conn
        .lock()
        .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
    f(&conn).map_err(|e| Error::storage(e.to_string()))
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
