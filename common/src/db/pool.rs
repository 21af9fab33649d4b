// SQLite connection pool for the task registry

use crate::errors::RegistryError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

const CREATE_TASKS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY,
        path TEXT UNIQUE NOT NULL,
        every TEXT NOT NULL,
        auto_add BOOLEAN NOT NULL,
        auto_push BOOLEAN NOT NULL,
        static_msg TEXT,
        exclude_patterns TEXT
    )
"#;

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    /// Open (creating if needed) the registry database at `path`
    ///
    /// # Errors
    /// Returns `RegistryError::Store` if the file cannot be opened or the
    /// schema cannot be created
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RegistryError::Store(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to open task database");
                RegistryError::Store(e.to_string())
            })?;

        let db = Self { pool };
        db.initialize_schema().await?;

        info!("Task database opened");
        Ok(db)
    }

    /// In-memory database, used by tests
    pub async fn in_memory() -> Result<Self, RegistryError> {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.initialize_schema().await?;
        Ok(db)
    }

    async fn initialize_schema(&self) -> Result<(), RegistryError> {
        sqlx::query(CREATE_TASKS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool gracefully
    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Task database closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_file_and_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tasks.db");

        let db = DbPool::open(&path).await.unwrap();
        assert!(path.exists());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.db");

        DbPool::open(&path).await.unwrap().close().await;
        assert!(DbPool::open(&path).await.is_ok());
    }
}
