//! Analysis task records, lifecycle state machine and storage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTaskStore;
pub use store::{CreateTaskRequest, TaskError, TaskFilter, TaskStats, TaskStore};
pub use types::{
    AnalysisTask, AnalysisType, StatusUpdate, TaskParameters, TaskStatus, TransitionViolation,
};
