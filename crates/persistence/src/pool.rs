use std::path::Path;

use ck_domain::error::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Thin wrapper over a `SqlitePool`, applying the schema migration on open.
pub struct Db {
    pub(crate) pool: SqlitePool,
}

impl Db {
    /// Open (or create) the database at `path` and apply the schema.
    /// `max_connections` comes from config (`POOL_SIZE`).
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| Error::DependencyFailure(format!("opening sqlite at {}: {e}", path.display())))?;

        sqlx::raw_sql(include_str!("../migrations/001_cirkelline_schema.sql"))
            .execute(&pool)
            .await
            .map_err(|e| Error::DependencyFailure(format!("applying schema migration: {e}")))?;

        Ok(Self { pool })
    }

    /// Open an in-memory database, used by tests and dry-run mode.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::DependencyFailure(format!("opening in-memory sqlite: {e}")))?;

        sqlx::raw_sql(include_str!("../migrations/001_cirkelline_schema.sql"))
            .execute(&pool)
            .await
            .map_err(|e| Error::DependencyFailure(format!("applying schema migration: {e}")))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap reachability probe used before binding the HTTP listener.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DependencyFailure(format!("db ping: {e}")))?;
        Ok(())
    }
}
