//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the analyzer, catalog and
//! task store traits, allowing the orchestrator to be exercised end to end without real
//! genomic tooling.
//!
//! # Example
//!
//! ```rust,ignore
//! use pams_core::testing::{fixtures, MockAnalyzer, MockDatasetCatalog};
//!
//! let catalog = MockDatasetCatalog::with_ids(&["g1", "g2"]);
//! let analyzer = MockAnalyzer::new(AnalysisType::SequenceTyping);
//!
//! // Script behavior
//! analyzer.fail_item("g2", "assembly truncated");
//! analyzer.hold("g1");
//!
//! // Register the analyzer and build an orchestrator...
//! ```

mod mock_analyzer;
mod mock_catalog;
mod mock_task_store;

pub use mock_analyzer::{MockAnalyzer, RecordedCall};
pub use mock_catalog::MockDatasetCatalog;
pub use mock_task_store::MockTaskStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::dataset::{DatasetRecord, NewDataset};
    use crate::task::{AnalysisTask, AnalysisType, TaskParameters, TaskStatus};

    /// Create a dataset record with reasonable defaults.
    pub fn dataset(id: &str) -> DatasetRecord {
        DatasetRecord {
            id: id.to_string(),
            name: format!("genome-{id}"),
            strain: Some("Escherichia coli".to_string()),
            file_path: Some(format!("/data/genomes/{id}.fasta")),
            total_length: Some(5_000_000),
            gc_content: Some(0.506),
            registered_at: Utc::now(),
        }
    }

    /// Create dataset records for each id, in order.
    pub fn datasets(ids: &[&str]) -> Vec<DatasetRecord> {
        ids.iter().map(|id| dataset(id)).collect()
    }

    /// Registration request matching [`dataset`].
    pub fn new_dataset(id: &str) -> NewDataset {
        NewDataset::new(id, format!("genome-{id}"))
            .with_strain("Escherichia coli")
            .with_file_path(format!("/data/genomes/{id}.fasta"))
    }

    /// Create a Pending task over the given datasets.
    pub fn task(analysis_type: AnalysisType, dataset_ids: &[&str]) -> AnalysisTask {
        let now = Utc::now();
        AnalysisTask {
            id: uuid::Uuid::new_v4().to_string(),
            analysis_type,
            dataset_ids: dataset_ids.iter().map(|id| id.to_string()).collect(),
            parameters: TaskParameters::new(),
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
