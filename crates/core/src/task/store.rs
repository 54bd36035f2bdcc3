//! Task storage trait and types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AnalysisTask, AnalysisType, StatusUpdate, TaskParameters, TaskStatus};

/// Error type for task store operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// The update violates the lifecycle state machine.
    #[error("Cannot move task {task_id} from {from} to {to}: {reason}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
        reason: String,
    },

    /// Backend failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl TaskError {
    /// True when the write was refused because the record already left the
    /// state the writer expected (e.g. it is terminal).
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, TaskError::InvalidTransition { .. })
    }
}

/// Request to create a new task record.
#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub analysis_type: AnalysisType,
    /// Already-resolved dataset ids.
    pub dataset_ids: Vec<String>,
    pub parameters: TaskParameters,
}

/// Filter for querying tasks.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    /// Filter by status.
    pub status: Option<TaskStatus>,
    /// Filter by analysis type.
    pub analysis_type: Option<AnalysisType>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl TaskFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            analysis_type: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_analysis_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = Some(analysis_type);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Task counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// Trait for task storage backends.
///
/// Implementations must refuse updates that violate the lifecycle state
/// machine (see [`AnalysisTask::check`]) with [`TaskError::InvalidTransition`].
pub trait TaskStore: Send + Sync {
    /// Create a new task in Pending.
    fn create(&self, request: CreateTaskRequest) -> Result<AnalysisTask, TaskError>;

    /// Get a task by ID.
    fn get(&self, id: &str) -> Result<Option<AnalysisTask>, TaskError>;

    /// List tasks matching the filter, newest first.
    fn list(&self, filter: &TaskFilter) -> Result<Vec<AnalysisTask>, TaskError>;

    /// Count tasks matching the filter (limit/offset ignored).
    fn count(&self, filter: &TaskFilter) -> Result<i64, TaskError>;

    /// Apply a status/progress/result write.
    fn update_status(&self, id: &str, update: StatusUpdate) -> Result<AnalysisTask, TaskError>;

    /// Counts per status.
    fn stats(&self) -> Result<TaskStats, TaskError> {
        let by = |status| self.count(&TaskFilter::new().with_status(status));
        let stats = TaskStats {
            pending: by(TaskStatus::Pending)?,
            running: by(TaskStatus::Running)?,
            completed: by(TaskStatus::Completed)?,
            failed: by(TaskStatus::Failed)?,
            cancelled: by(TaskStatus::Cancelled)?,
            total: self.count(&TaskFilter::new())?,
        };
        Ok(stats)
    }
}
