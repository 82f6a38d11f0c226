// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use rusqlite::OpenFlags;
use tracing::{debug, info};

use tutorbook_config::model::StorageConfig;
use tutorbook_core::{HealthStatus, OpContext, TutorbookError};

use crate::migrations;
use crate::writer::UNIT_OF_WORK_BEHAVIOR;

const IN_MEMORY: &str = ":memory:";

/// Handle to the Tutorbook SQLite database.
///
/// Owns the single writer connection and, for file databases, a read-only
/// connection used by lock-free reads (balance, history, validator prechecks).
/// The handle is passed explicitly to every component; there is no global.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    reader: Option<tokio_rusqlite::Connection>,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("has_reader", &self.reader.is_some())
            .finish()
    }
}

impl Database {
    /// Open (or create) the database at `path` with default storage settings.
    ///
    /// Applies PRAGMAs, runs pending migrations, and opens the read connection.
    pub async fn open(path: &str) -> Result<Self, TutorbookError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open the database described by `config`.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, TutorbookError> {
        let path = config.database_path.clone();
        let in_memory = path == IN_MEMORY;

        if !in_memory
            && let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| TutorbookError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(map_sql_err)?;

        let wal_mode = config.wal_mode && !in_memory;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                // journal_mode returns the resulting mode as a row.
                conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
                conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        flatten_call(conn.call(|conn| migrations::run_migrations(conn)).await)?;

        let reader = if in_memory {
            None
        } else {
            let reader = tokio_rusqlite::Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .await
            .map_err(map_sql_err)?;
            reader
                .call(move |conn| conn.busy_timeout(busy_timeout))
                .await
                .map_err(map_tr_err)?;
            Some(reader)
        };

        info!(path = %path, wal_mode, "database opened");
        Ok(Self { conn, reader, path })
    }

    /// Open a private in-memory database. Reads share the writer connection.
    pub async fn open_in_memory() -> Result<Self, TutorbookError> {
        Self::open(IN_MEMORY).await
    }

    /// Path this database was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The single writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run a read-only closure on the read connection.
    ///
    /// Never blocks on writers in WAL mode. Falls back to the writer for
    /// in-memory databases.
    pub async fn read<T, F>(&self, f: F) -> Result<T, TutorbookError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, TutorbookError> + Send + 'static,
    {
        let conn = self.reader.as_ref().unwrap_or(&self.conn);
        flatten_call(conn.call(move |conn| f(conn)).await)
    }

    /// Run a closure on the writer outside of an explicit transaction.
    ///
    /// Used for single-statement writes such as registering users and lessons.
    pub async fn write<T, F>(&self, f: F) -> Result<T, TutorbookError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, TutorbookError> + Send + 'static,
    {
        flatten_call(self.conn.call(move |conn| f(conn)).await)
    }

    /// Run `work` as one atomic unit of work.
    ///
    /// The transaction starts with `BEGIN IMMEDIATE`, so the database write
    /// lock is held from the first read; a second process blocks on it for up
    /// to `busy_timeout`. `ctx` is checked before beginning and again before
    /// commit. If the caller drops this future, the unit's cancellation token
    /// fires and the transaction rolls back instead of committing.
    pub async fn unit_of_work<T, E, F>(&self, ctx: &OpContext, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<TutorbookError> + Send + 'static,
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E> + Send + 'static,
    {
        ctx.ensure_active()?;

        let scope = ctx.child();
        let _cancel_on_drop = scope.cancellation_token().clone().drop_guard();

        let result = self
            .conn
            .call(move |conn| -> Result<T, E> {
                scope.ensure_active()?;
                let tx = conn
                    .transaction_with_behavior(UNIT_OF_WORK_BEHAVIOR)
                    .map_err(map_sql_err)?;
                let value = work(&tx)?;
                // Rolled back on drop if the context ended while we worked.
                scope.ensure_active()?;
                tx.commit().map_err(map_sql_err)?;
                Ok(value)
            })
            .await;

        flatten_call(result)
    }

    /// Verify the database answers queries.
    pub async fn health_check(&self) -> HealthStatus {
        let result = self
            .conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await;
        match result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }

    /// Checkpoint the WAL and close both connections.
    pub async fn close(self) -> Result<(), TutorbookError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");

        if let Some(reader) = self.reader {
            reader.close().await.map_err(map_tr_err)?;
        }
        self.conn.close().await.map_err(map_tr_err)?;
        debug!(path = %self.path, "database closed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into a storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TutorbookError {
    TutorbookError::Storage {
        source: Box::new(e),
    }
}

/// Convert a rusqlite error raised inside a closure into a storage error.
pub fn map_sql_err(e: rusqlite::Error) -> TutorbookError {
    TutorbookError::Storage {
        source: Box::new(e),
    }
}

/// Whether `e` is a UNIQUE or PRIMARY KEY constraint violation.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Unwrap the result of `Connection::call` whose closure returns a domain error.
fn flatten_call<T, E>(result: Result<T, tokio_rusqlite::Error<E>>) -> Result<T, E>
where
    E: From<TutorbookError>,
{
    match result {
        Ok(value) => Ok(value),
        Err(tokio_rusqlite::Error::Error(e)) => Err(e),
        Err(tokio_rusqlite::Error::ConnectionClosed) => Err(TutorbookError::Storage {
            source: "database connection is closed".into(),
        }
        .into()),
        Err(_) => Err(TutorbookError::Storage {
            source: "database connection failed while closing".into(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn count_users(conn: &rusqlite::Connection) -> Result<i64, TutorbookError> {
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(map_sql_err)
    }

    fn insert_user(conn: &rusqlite::Connection, id: &str) -> Result<(), TutorbookError> {
        conn.execute(
            "INSERT INTO users (id, display_name, role, created_at)
             VALUES (?1, 'Test', 'student', '2026-01-01T00:00:00.000Z')",
            [id],
        )
        .map_err(map_sql_err)?;
        Ok(())
    }

    #[tokio::test]
    async fn open_rejects_a_file_that_is_not_a_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("notes.db");
        std::fs::write(&db_path, "plain text, not sqlite\n".repeat(64)).unwrap();

        let err = Database::open(db_path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, TutorbookError::Storage { .. }));
    }

    #[tokio::test]
    async fn open_creates_schema_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("deeper").join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<String> = db
            .read(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                    .map_err(map_sql_err)?;
                let rows = stmt
                    .query_map([], |row| row.get(0))
                    .map_err(map_sql_err)?
                    .collect::<Result<Vec<String>, _>>()
                    .map_err(map_sql_err)?;
                Ok(rows)
            })
            .await
            .unwrap();
        for expected in [
            "bookings",
            "cancelled_bookings",
            "credit_transactions",
            "credits",
            "lessons",
            "users",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn wal_mode_and_foreign_keys_are_enabled() {
        let (db, _dir) = setup_db().await;
        let (mode, fk): (String, i64) = db
            .write(|conn| {
                let mode = conn
                    .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(map_sql_err)?;
                let fk = conn
                    .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                    .map_err(map_sql_err)?;
                Ok((mode, fk))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(fk, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let path = db_path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        db.write(|conn| insert_user(conn, "u-1")).await.unwrap();
        db.close().await.unwrap();

        let db = Database::open(path).await.unwrap();
        assert_eq!(db.read(count_users).await.unwrap(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unit_of_work_commits_on_success() {
        let (db, _dir) = setup_db().await;
        let ctx = OpContext::background();
        db.unit_of_work(&ctx, |tx| {
            insert_user(tx, "u-1")?;
            insert_user(tx, "u-2")
        })
        .await
        .unwrap();
        assert_eq!(db.read(count_users).await.unwrap(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unit_of_work_rolls_back_on_error() {
        let (db, _dir) = setup_db().await;
        let ctx = OpContext::background();
        let result: Result<(), TutorbookError> = db
            .unit_of_work(&ctx, |tx| {
                insert_user(tx, "u-1")?;
                Err(TutorbookError::Internal("boom".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(db.read(count_users).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_context_never_begins() {
        let (db, _dir) = setup_db().await;
        let ctx = OpContext::background();
        ctx.cancel();
        let result = db.unit_of_work(&ctx, |tx| insert_user(tx, "u-1")).await;
        assert!(matches!(result, Err(TutorbookError::Cancelled)));
        assert_eq!(db.read(count_users).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_during_work_rolls_back() {
        let (db, _dir) = setup_db().await;
        let ctx = OpContext::background();
        let handle = ctx.clone();
        let result = db
            .unit_of_work(&ctx, move |tx| {
                insert_user(tx, "u-1")?;
                handle.cancel();
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TutorbookError::Cancelled)));
        assert_eq!(db.read(count_users).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_deadline_rolls_back() {
        let (db, _dir) = setup_db().await;
        let ctx = OpContext::with_timeout(Duration::from_millis(20));
        let result = db
            .unit_of_work(&ctx, |tx| {
                insert_user(tx, "u-1")?;
                std::thread::sleep(Duration::from_millis(40));
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TutorbookError::Timeout { .. })));
        assert_eq!(db.read(count_users).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_database_reads_through_writer() {
        let db = Database::open_in_memory().await.unwrap();
        db.write(|conn| insert_user(conn, "u-1")).await.unwrap();
        assert_eq!(db.read(count_users).await.unwrap(), 1);
        assert_eq!(db.health_check().await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn duplicate_primary_key_is_a_unique_violation() {
        let (db, _dir) = setup_db().await;
        let duplicate = db
            .write(|conn| {
                insert_user(conn, "u-1")?;
                let err = conn
                    .execute(
                        "INSERT INTO users (id, display_name, role, created_at)
                         VALUES ('u-1', 'Again', 'student', '2026-01-01T00:00:00.000Z')",
                        [],
                    )
                    .unwrap_err();
                Ok(is_unique_violation(&err))
            })
            .await
            .unwrap();
        assert!(duplicate);
        db.close().await.unwrap();
    }
}
