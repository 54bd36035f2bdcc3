//! Types for the task orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::CatalogError;
use crate::task::{AnalysisType, TaskError, TaskParameters, TaskStats};

/// Reasons a submission is refused. No task record exists afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("unknown analysis type: {0}")]
    UnknownType(String),

    #[error("no datasets given")]
    NoDatasets,

    #[error("none of the requested datasets exist")]
    NoValidDatasets,

    #[error("{analysis_type} needs at least {required} datasets, {found} resolved")]
    TooFewDatasets {
        analysis_type: AnalysisType,
        required: usize,
        found: usize,
    },

    #[error("no analyzer registered for {0}")]
    NoAnalyzer(AnalysisType),
}

impl AdmissionError {
    /// Short label used in metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::UnknownType(_) => "unknown_type",
            AdmissionError::NoDatasets => "no_datasets",
            AdmissionError::NoValidDatasets => "no_valid_datasets",
            AdmissionError::TooFewDatasets { .. } => "too_few_datasets",
            AdmissionError::NoAnalyzer(_) => "no_analyzer",
        }
    }
}

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Submission rejected.
    #[error("admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    /// Task store error.
    #[error("task store error: {0}")]
    TaskStore(#[from] TaskError),

    /// Dataset catalog error.
    #[error("dataset catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The orchestrator no longer accepts work.
    #[error("orchestrator is shut down")]
    ShutDown,
}

impl OrchestratorError {
    pub fn admission(&self) -> Option<&AdmissionError> {
        match self {
            OrchestratorError::Admission(err) => Some(err),
            _ => None,
        }
    }
}

/// A request to run an analysis.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    /// Analysis type tag, e.g. `sequence_typing` or `mlst`.
    pub analysis_type: String,
    /// Dataset ids in processing order. Duplicates are ignored.
    pub dataset_ids: Vec<String>,
    pub parameters: TaskParameters,
}

impl SubmitRequest {
    pub fn new<I, S>(analysis_type: impl Into<String>, dataset_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            analysis_type: analysis_type.into(),
            dataset_ids: dataset_ids.into_iter().map(Into::into).collect(),
            parameters: TaskParameters::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: TaskParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether new submissions are accepted.
    pub accepting: bool,
    /// Tasks holding an execution handle.
    pub active_tasks: usize,
    /// Stored tasks by status.
    pub tasks: TaskStats,
}
