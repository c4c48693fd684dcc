//! SQLite persistence for workflows and execution records.

pub mod pool;
pub mod store;

pub use pool::DatabasePool;
pub use store::SqliteWorkflowStore;
