// Task repository implementation

use crate::db::DbPool;
use crate::errors::RegistryError;
use crate::models::{normalize_path_str, NewTask, TaskRecord};
use async_trait::async_trait;
use tracing::instrument;

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, path, every, auto_add, auto_push,
        COALESCE(static_msg, '') AS static_msg,
        COALESCE(exclude_patterns, '') AS exclude_patterns
    FROM tasks
"#;

/// Persisted set of registered tasks
///
/// The scheduler only ever reads the full set; mutation happens through the
/// command-line surface and is observed on the next reconciliation.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// All registered tasks, ordered by ID
    async fn get_all(&self) -> Result<Vec<TaskRecord>, RegistryError>;

    /// Insert a task, replacing any existing task with the same path
    async fn upsert(&self, task: &NewTask) -> Result<TaskRecord, RegistryError>;

    async fn find_by_path(&self, path: &str) -> Result<Option<TaskRecord>, RegistryError>;

    async fn delete_by_id(&self, id: i64) -> Result<(), RegistryError>;

    async fn delete_by_path(&self, path: &str) -> Result<(), RegistryError>;
}

/// SQLite-backed task registry
pub struct TaskRepository {
    pool: DbPool,
}

impl TaskRepository {
    /// Create a new TaskRepository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRegistry for TaskRepository {
    #[instrument(skip(self))]
    async fn get_all(&self) -> Result<Vec<TaskRecord>, RegistryError> {
        let tasks = sqlx::query_as::<_, TaskRecord>(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .fetch_all(self.pool.pool())
            .await?;

        tracing::debug!(count = tasks.len(), "Loaded tasks");
        Ok(tasks)
    }

    /// Upsert keyed on the normalized path
    ///
    /// `INSERT OR REPLACE` deletes the conflicting row before inserting the
    /// new one.
    #[instrument(skip(self, task), fields(path = %task.path))]
    async fn upsert(&self, task: &NewTask) -> Result<TaskRecord, RegistryError> {
        let record = sqlx::query_as::<_, TaskRecord>(
            r#"
            INSERT OR REPLACE INTO tasks
                (path, every, auto_add, auto_push, static_msg, exclude_patterns)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING
                id, path, every, auto_add, auto_push,
                COALESCE(static_msg, '') AS static_msg,
                COALESCE(exclude_patterns, '') AS exclude_patterns
            "#,
        )
        .bind(normalize_path_str(&task.path))
        .bind(&task.every)
        .bind(task.auto_add)
        .bind(task.auto_push)
        .bind(&task.static_msg)
        .bind(&task.exclude_patterns)
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(task_id = record.id, path = %record.path, "Task registered");
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn find_by_path(&self, path: &str) -> Result<Option<TaskRecord>, RegistryError> {
        let task = sqlx::query_as::<_, TaskRecord>(&format!("{} WHERE path = ?", SELECT_COLUMNS))
            .bind(normalize_path_str(path))
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(task)
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> Result<(), RegistryError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("no task found with ID: {}", id)));
        }

        tracing::info!(task_id = id, "Task removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_by_path(&self, path: &str) -> Result<(), RegistryError> {
        let path = normalize_path_str(path);
        let result = sqlx::query("DELETE FROM tasks WHERE path = ?")
            .bind(&path)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!(
                "no task found for path: {}",
                path
            )));
        }

        tracing::info!(path = %path, "Task removed");
        Ok(())
    }
}
