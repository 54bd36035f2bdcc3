//! Task record and lifecycle types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::ResultSummary;

/// Opaque analyzer configuration, passed through unmodified.
pub type TaskParameters = BTreeMap<String, serde_json::Value>;

/// The closed set of analyses the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Gene prediction and functional annotation.
    Annotation,
    /// Multi-locus sequence typing.
    SequenceTyping,
    /// Antimicrobial resistance gene detection.
    ResistanceGenes,
    /// Virulence factor detection.
    VirulenceGenes,
    /// Combined tree over all inputs.
    Phylogeny,
}

impl AnalysisType {
    /// All analysis types, in declaration order.
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::Annotation,
        AnalysisType::SequenceTyping,
        AnalysisType::ResistanceGenes,
        AnalysisType::VirulenceGenes,
        AnalysisType::Phylogeny,
    ];

    /// Canonical tag used in records, config and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Annotation => "annotation",
            AnalysisType::SequenceTyping => "sequence_typing",
            AnalysisType::ResistanceGenes => "resistance_genes",
            AnalysisType::VirulenceGenes => "virulence_genes",
            AnalysisType::Phylogeny => "phylogeny",
        }
    }

    /// Minimum number of resolved datasets required at admission.
    pub fn min_datasets(&self) -> usize {
        match self {
            AnalysisType::Phylogeny => 2,
            _ => 1,
        }
    }

    /// Minimum number of successfully processed datasets required at
    /// finalization. Zero means partial failures never fail the task.
    pub fn min_successful_items(&self) -> usize {
        match self {
            AnalysisType::Phylogeny => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accepts `sequence_typing`, `SequenceTyping`, `sequence-typing`, ...
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "annotation" => Ok(AnalysisType::Annotation),
            "sequencetyping" | "mlst" => Ok(AnalysisType::SequenceTyping),
            "resistancegenes" | "resistance" => Ok(AnalysisType::ResistanceGenes),
            "virulencegenes" | "virulence" => Ok(AnalysisType::VirulenceGenes),
            "phylogeny" => Ok(AnalysisType::Phylogeny),
            _ => Err(format!("unknown analysis type: {s}")),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted, pipeline not started yet.
    Pending,
    /// Pipeline is processing datasets.
    Running,
    /// All datasets processed.
    Completed,
    /// Unrecoverable pipeline error.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl TaskStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Returns true if the task still holds an execution handle.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine has an edge from `self` to `next`.
    ///
    /// `Running -> Running` is the progress-update edge.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("invalid task status: {other}")),
        }
    }
}

/// A submitted analysis request and its lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisTask {
    /// Unique identifier (UUID).
    pub id: String,

    /// Which analysis to run.
    pub analysis_type: AnalysisType,

    /// Resolved dataset ids, in request order.
    pub dataset_ids: Vec<String>,

    /// Analyzer configuration.
    #[serde(default)]
    pub parameters: TaskParameters,

    /// Current status.
    pub status: TaskStatus,

    /// Progress in [0, 100].
    pub progress: u8,

    /// Result summary, only when Completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultSummary>,

    /// Error message, only when Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A status write issued by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    pub progress: u8,
    pub result: Option<ResultSummary>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    /// Running at the given progress.
    pub fn running(progress: u8) -> Self {
        Self {
            status: TaskStatus::Running,
            progress,
            result: None,
            error_message: None,
        }
    }

    /// Completed; progress is forced to 100.
    pub fn completed(result: ResultSummary) -> Self {
        Self {
            status: TaskStatus::Completed,
            progress: 100,
            result: Some(result),
            error_message: None,
        }
    }

    /// Failed at the last observed progress.
    pub fn failed(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            progress,
            result: None,
            error_message: Some(message.into()),
        }
    }

    /// Cancelled, keeping the progress of items actually completed.
    pub fn cancelled(progress: u8) -> Self {
        Self {
            status: TaskStatus::Cancelled,
            progress,
            result: None,
            error_message: None,
        }
    }
}

/// Why a status write was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionViolation {
    /// No edge between the two states.
    IllegalEdge,
    /// Progress would decrease while Running.
    ProgressRegressed { current: u8, requested: u8 },
    /// Progress outside [0, 100].
    ProgressOutOfRange(u8),
}

impl fmt::Display for TransitionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionViolation::IllegalEdge => write!(f, "illegal transition"),
            TransitionViolation::ProgressRegressed { current, requested } => {
                write!(f, "progress would regress from {current} to {requested}")
            }
            TransitionViolation::ProgressOutOfRange(p) => write!(f, "progress {p} out of range"),
        }
    }
}

impl AnalysisTask {
    /// Checks an update against the state machine without applying it.
    pub fn check(&self, update: &StatusUpdate) -> Result<(), TransitionViolation> {
        if !self.status.can_transition_to(update.status) {
            return Err(TransitionViolation::IllegalEdge);
        }
        if update.progress > 100 {
            return Err(TransitionViolation::ProgressOutOfRange(update.progress));
        }
        if self.status == TaskStatus::Running
            && update.status == TaskStatus::Running
            && update.progress < self.progress
        {
            return Err(TransitionViolation::ProgressRegressed {
                current: self.progress,
                requested: update.progress,
            });
        }
        Ok(())
    }

    /// Applies a checked update, keeping field invariants: result only when
    /// Completed, error only when Failed.
    pub fn apply(&mut self, update: StatusUpdate, at: DateTime<Utc>) -> Result<(), TransitionViolation> {
        self.check(&update)?;
        self.status = update.status;
        self.progress = update.progress;
        self.result = match update.status {
            TaskStatus::Completed => update.result,
            _ => None,
        };
        self.error_message = match update.status {
            TaskStatus::Failed => update.error_message,
            _ => None,
        };
        self.updated_at = at;
        Ok(())
    }
}
