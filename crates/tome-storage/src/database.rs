// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serializes writers. Do NOT open additional connections for writes.

use std::path::Path;

use tokio_rusqlite::Connection;
use tome_core::TomeError;
use tracing::{debug, info};

use crate::migrations;

/// Handle to the registry database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub async fn open(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, TomeError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).await.map_err(open_err)?;
        let db = Self { conn };
        db.initialize(wal_mode).await?;
        info!(path = %path.display(), "registry database opened");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema.
    pub async fn open_in_memory() -> Result<Self, TomeError> {
        let conn = Connection::open_in_memory().await.map_err(open_err)?;
        let db = Self { conn };
        db.initialize(false).await?;
        Ok(db)
    }

    async fn initialize(&self, wal_mode: bool) -> Result<(), TomeError> {
        let applied = self
            .conn
            .call(move |conn| {
                if wal_mode {
                    let mode: String =
                        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;
                     PRAGMA synchronous = NORMAL;",
                )?;
                migrations::run_migrations(conn)
            })
            .await
            .map_err(map_tr_err)?
            .map_err(|message| TomeError::Storage {
                source: format!("migration failed: {message}").into(),
            })?;
        debug!(applied, "registry migrations applied");
        Ok(())
    }

    /// The underlying connection, for callers composing their own closures.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a closure on the connection thread.
    pub async fn call<T, F>(&self, work: F) -> Result<T, TomeError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        self.conn.call(work).await.map_err(map_tr_err)
    }

    /// Run `work` inside one transaction.
    ///
    /// Commits when `work` returns `Ok`. On `Err`, or if `work` panics, the
    /// transaction is dropped uncommitted and SQLite rolls it back.
    pub async fn with_transaction<T, F>(&self, work: F) -> Result<T, TomeError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let out = work(&tx)?;
                tx.commit()?;
                Ok(out)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL so the database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), TomeError> {
        self.call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

fn open_err(e: impl std::fmt::Display) -> TomeError {
    TomeError::Storage {
        source: format!("failed to open database: {e}").into(),
    }
}

/// Convert a tokio-rusqlite error into a storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TomeError {
    TomeError::Storage {
        source: e.to_string().into(),
    }
}
