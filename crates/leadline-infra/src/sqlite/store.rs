//! SQLite workflow store implementation.
//!
//! Implements `WorkflowStore` from `leadline-core` using sqlx with split
//! read/write pools. Workflow definitions and execution records are stored
//! as JSON blobs; denormalized columns carry what queries filter and sort
//! on.

use chrono::Utc;
use leadline_core::store::WorkflowStore;
use leadline_types::error::StoreError;
use leadline_types::execution::Execution;
use leadline_types::workflow::Workflow;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowStore`.
pub struct SqliteWorkflowStore {
    pool: DatabasePool,
}

impl SqliteWorkflowStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    definition: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            definition: row.try_get("definition")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, StoreError> {
        serde_json::from_str(&self.definition)
            .map_err(|e| StoreError::Query(format!("invalid workflow definition JSON: {e}")))
    }
}

struct ExecutionRow {
    record: String,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            record: row.try_get("record")?,
        })
    }

    fn into_execution(self) -> Result<Execution, StoreError> {
        serde_json::from_str(&self.record)
            .map_err(|e| StoreError::Query(format!("invalid execution record JSON: {e}")))
    }
}

fn status_str<T: serde::Serialize>(status: &T) -> Result<String, StoreError> {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        _ => Err(StoreError::Query("unserializable status".to_string())),
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Connection,
        other => StoreError::Query(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// WorkflowStore implementation
// ---------------------------------------------------------------------------

impl WorkflowStore for SqliteWorkflowStore {
    async fn load_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, StoreError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => {
                let parsed = WorkflowRow::from_row(&row).map_err(map_sqlx)?;
                Ok(Some(parsed.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let definition = serde_json::to_string(workflow)
            .map_err(|e| StoreError::Query(format!("failed to serialize workflow: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, status, definition, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(status_str(&workflow.status)?)
        .bind(definition)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn save_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let record = serde_json::to_string(execution)
            .map_err(|e| StoreError::Query(format!("failed to serialize execution: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO executions
                (id, workflow_id, workflow_name, status, record, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                record = excluded.record,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(&execution.workflow_name)
        .bind(status_str(&execution.status)?)
        .bind(record)
        .bind(execution.started_at.to_rfc3339())
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query("SELECT record FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => {
                let parsed = ExecutionRow::from_row(&row).map_err(map_sqlx)?;
                Ok(Some(parsed.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM executions
            WHERE workflow_id = ?
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(workflow_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                let parsed = ExecutionRow::from_row(row).map_err(map_sqlx)?;
                parsed.into_execution()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
