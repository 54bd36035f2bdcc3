//! Mock dataset catalog for testing.

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::dataset::{CatalogError, DatasetCatalog, DatasetRecord};

/// In-memory [`DatasetCatalog`] with scriptable failures.
#[derive(Debug, Default)]
pub struct MockDatasetCatalog {
    records: Mutex<Vec<DatasetRecord>>,
    /// If set, the next resolve fails with this message.
    next_error: Mutex<Option<String>>,
    resolve_calls: AtomicUsize,
}

impl MockDatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with datasets named after their ids.
    pub fn with_ids(ids: &[&str]) -> Self {
        let catalog = Self::new();
        for id in ids {
            catalog.add_id(id);
        }
        catalog
    }

    pub fn add(&self, record: DatasetRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn add_id(&self, id: &str) {
        self.add(DatasetRecord {
            id: id.to_string(),
            name: format!("genome-{id}"),
            strain: None,
            file_path: None,
            total_length: None,
            gc_content: None,
            registered_at: Utc::now(),
        });
    }

    /// Configure the next resolve to fail.
    pub fn set_next_error(&self, message: &str) {
        *self.next_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

impl DatasetCatalog for MockDatasetCatalog {
    fn resolve(&self, ids: &[String]) -> Result<Vec<DatasetRecord>, CatalogError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.next_error.lock().unwrap().take() {
            return Err(CatalogError::Database(message));
        }

        let records = self.records.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| records.iter().find(|r| &r.id == id).cloned())
            .collect())
    }
}
