//! Trait definitions for the analyzer module.

use async_trait::async_trait;

use crate::dataset::DatasetRecord;
use crate::task::{AnalysisType, TaskParameters};

use super::error::AnalyzerError;
use super::output::OutputArea;
use super::types::{ItemOutput, ProcessedItem};

/// A pluggable analysis implementation for one analysis type.
///
/// The pipeline calls [`process`](Analyzer::process) once per dataset, in
/// request order, then [`combine`](Analyzer::combine) once over the datasets
/// that succeeded.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Returns the name of this analyzer implementation.
    fn name(&self) -> &str;

    /// The analysis type this analyzer serves.
    fn analysis_type(&self) -> AnalysisType;

    /// Analyze a single dataset, writing any artifacts to `output`.
    async fn process(
        &self,
        dataset: &DatasetRecord,
        params: &TaskParameters,
        output: &OutputArea,
    ) -> Result<ItemOutput, AnalyzerError>;

    /// Finalization step over all successful items.
    ///
    /// Analyzers without a combined artifact keep the default.
    async fn combine(
        &self,
        _items: &[ProcessedItem],
        _params: &TaskParameters,
        _output: &OutputArea,
    ) -> Result<Option<ItemOutput>, AnalyzerError> {
        Ok(None)
    }
}
