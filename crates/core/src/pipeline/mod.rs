//! Per-type analysis pipelines.
//!
//! A pipeline visits a task's datasets in order, folds each analyzer finding
//! into a [`ResultSummary`] and reports weighted progress back to the
//! orchestrator through [`PipelineControl`].

mod progress;
mod runner;
mod summary;

pub use progress::ProgressWeights;
pub use runner::{PipelineControl, PipelineOutcome, PipelineRunner};
pub use summary::{GeneProfile, ItemFailure, ResultDetails, ResultSummary, TypingAssignment};
