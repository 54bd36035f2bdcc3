//! Dataset catalog - the registry of genome datasets tasks can reference.
//!
//! The orchestrator only reads from the catalog, at admission time.

mod sqlite;
mod types;

pub use sqlite::SqliteDatasetCatalog;
pub use types::{DatasetRecord, NewDataset};

use thiserror::Error;

/// Errors from catalog backends.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Dataset not found: {0}")]
    NotFound(String),

    #[error("Dataset already registered: {0}")]
    AlreadyExists(String),

    #[error("Catalog database error: {0}")]
    Database(String),
}

/// Read access to registered datasets.
pub trait DatasetCatalog: Send + Sync {
    /// Returns the records for the ids that exist, in the order requested.
    ///
    /// Unknown ids are skipped, not reported.
    fn resolve(&self, ids: &[String]) -> Result<Vec<DatasetRecord>, CatalogError>;
}
