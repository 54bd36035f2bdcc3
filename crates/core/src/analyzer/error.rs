//! Error types for analyzers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors an analyzer can report for a dataset.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The dataset could not be analyzed; the task carries on with the rest.
    #[error("{0}")]
    Item(String),

    /// The task cannot continue.
    #[error("{0}")]
    Fatal(String),

    /// The output area could not be written. Always fatal.
    #[error("Cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalyzerError {
    /// Returns true if this error must fail the whole task.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AnalyzerError::Item(_))
    }
}
