//! Workflow store trait definition.
//!
//! Defines the storage interface the coordinator depends on: loading
//! workflow definitions and persisting execution records. The
//! infrastructure layer (leadline-infra) implements this trait with SQLite
//! persistence; tests use in-memory fakes. The engine never defines storage
//! schema or query semantics.

use leadline_types::error::StoreError;
use leadline_types::execution::Execution;
use leadline_types::workflow::Workflow;
use uuid::Uuid;

/// Store trait for workflow definitions and execution records.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowStore: Send + Sync {
    /// Get a workflow definition by its UUID.
    fn load_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, StoreError>> + Send;

    /// Upsert a workflow definition (insert or replace by ID).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Upsert an execution record (insert or replace by ID).
    ///
    /// The coordinator calls this once when the execution is created and
    /// once when it reaches a terminal status.
    fn save_execution(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Get an execution by its UUID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, StoreError>> + Send;

    /// List executions for a given workflow, newest first.
    fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, StoreError>> + Send;
}
