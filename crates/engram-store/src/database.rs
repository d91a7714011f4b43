// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use engram_core::EngramError;
use tokio_rusqlite::Connection;

use crate::migrations::run_migrations;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert tokio-rusqlite errors into [`EngramError::Datastore`].
fn map_tr_err(e: tokio_rusqlite::Error) -> EngramError {
    EngramError::Datastore {
        source: Box::new(e),
    }
}

/// Handle to the single SQLite connection.
///
/// The `Database` struct IS the single writer: query modules go through
/// [`Database::call`], so every write is serialized on tokio-rusqlite's
/// background thread and every query runs under the per-call budget.
pub struct Database {
    conn: Connection,
    query_timeout: Duration,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run all
    /// pending migrations. `query_timeout` is the per-call datastore budget.
    pub async fn open(
        path: impl AsRef<Path>,
        query_timeout: Duration,
    ) -> Result<Self, EngramError> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(EngramError::datastore)?;
        Self::initialize(conn, query_timeout).await
    }

    /// Open an in-memory database with the full schema. For tests.
    pub async fn open_in_memory() -> Result<Self, EngramError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(EngramError::datastore)?;
        Self::initialize(conn, DEFAULT_QUERY_TIMEOUT).await
    }

    /// Override the per-query budget.
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    async fn initialize(conn: Connection, query_timeout: Duration) -> Result<Self, EngramError> {
        // Startup runs outside the query budget: migrations may take a while.
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")
                .and_then(|()| conn.pragma_update(None, "synchronous", "NORMAL"))
                .and_then(|()| conn.pragma_update(None, "foreign_keys", "ON"))
                .map_err(EngramError::datastore)?;
            run_migrations(conn)
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(inner) => inner,
            other => EngramError::Datastore {
                source: Box::new(other),
            },
        })?;
        Ok(Self {
            conn,
            query_timeout,
        })
    }

    /// Run a closure on the connection thread under the per-query budget.
    ///
    /// The budget bounds how long the caller waits; a statement that is
    /// already running completes on the connection thread regardless.
    pub async fn call<T, F>(&self, f: F) -> Result<T, EngramError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        match tokio::time::timeout(self.query_timeout, self.conn.call(f)).await {
            Ok(result) => result.map_err(map_tr_err),
            Err(_) => Err(EngramError::Timeout {
                duration: self.query_timeout,
            }),
        }
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_applies_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let tables: Vec<String> = db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();

        assert!(tables.contains(&"conversations".to_string()));
        assert!(tables.contains(&"knowledge_sources".to_string()));
        assert!(tables.contains(&"memories".to_string()));
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.connection().call(run_migrations).await.unwrap();
    }

    #[tokio::test]
    async fn slow_queries_hit_the_budget() {
        let db = Database::open_in_memory()
            .await
            .unwrap()
            .with_query_timeout(Duration::from_millis(20));

        let err = db
            .call(|_conn| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Timeout { .. }));
    }
}
