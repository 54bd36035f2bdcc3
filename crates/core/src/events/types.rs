use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::ResultSummary;
use crate::task::{AnalysisTask, AnalysisType, TaskStatus};

/// Announced on every persisted state change of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub analysis_type: AnalysisType,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    /// Snapshot of a task record as stored.
    pub fn from_task(task: &AnalysisTask) -> Self {
        Self {
            task_id: task.id.clone(),
            analysis_type: task.analysis_type,
            status: task.status,
            progress: task.progress,
            result: task.result.clone(),
            error_message: task.error_message.clone(),
            timestamp: task.updated_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
