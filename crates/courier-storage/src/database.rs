// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: PRAGMA setup, migrations, and lifecycle.
//!
//! Every statement runs on tokio-rusqlite's single background thread, which
//! serializes writes. Do NOT open a second connection for writes.

use std::path::Path;

use courier_core::CourierError;
use tracing::info;

use crate::migrations;

/// Convert a tokio-rusqlite error into `CourierError::Storage`.
pub(crate) fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> CourierError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CourierError::storage(e)
}

/// An open, migrated SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode.
    pub async fn open(path: &str) -> Result<Self, CourierError> {
        Self::open_with(path, true).await
    }

    /// Open (or create) the database at `path`, choosing the journal mode.
    ///
    /// Missing parent directories are created.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, CourierError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(CourierError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(CourierError::storage)?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        info!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// A private in-memory database, migrated and ready for use.
    pub async fn open_in_memory() -> Result<Self, CourierError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(CourierError::storage)?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), CourierError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    let mode: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get(0),
                    )?;
                    tracing::debug!(journal_mode = %mode, "journal mode set");
                }
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.pragma_update(None, "busy_timeout", 5000)?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(map_tr_err)
    }

    /// The underlying connection. All calls share the single writer thread.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Close the connection, flushing the WAL.
    pub async fn close(self) -> Result<(), CourierError> {
        self.conn.close().await.map_err(CourierError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn table_names(db: &Database) -> Vec<String> {
        db.connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt =
                    conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let tables = table_names(&db).await;
        assert!(tables.contains(&"kv".to_string()));
        assert!(tables.contains(&"cache_entries".to_string()));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_enables_wal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let mode: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let path = path.to_str().unwrap();

        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        assert!(table_names(&db).await.contains(&"kv".to_string()));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("c.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_database_is_migrated() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(table_names(&db).await.contains(&"cache_entries".to_string()));
    }
}
