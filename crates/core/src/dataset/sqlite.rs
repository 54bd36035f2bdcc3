//! SQLite-backed dataset catalog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use super::{CatalogError, DatasetCatalog, DatasetRecord, NewDataset};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str =
    "SELECT id, name, strain, file_path, total_length, gc_content, registered_at FROM datasets";

/// SQLite-backed dataset catalog.
pub struct SqliteDatasetCatalog {
    conn: Mutex<Connection>,
}

impl SqliteDatasetCatalog {
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|e| CatalogError::Database(e.to_string()))?;
        // Tasks and datasets may share one file through separate connections.
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS datasets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                strain TEXT,
                file_path TEXT,
                total_length INTEGER,
                gc_content REAL,
                registered_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| CatalogError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DatasetRecord> {
        let registered_at: String = row.get(6)?;
        let registered_at = DateTime::parse_from_rfc3339(&registered_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        Ok(DatasetRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            strain: row.get(2)?,
            file_path: row.get(3)?,
            total_length: row.get(4)?,
            gc_content: row.get(5)?,
            registered_at,
        })
    }

    /// Register a new dataset.
    pub fn register(&self, dataset: NewDataset) -> Result<DatasetRecord, CatalogError> {
        let conn = self.conn()?;
        let now = Utc::now();

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO datasets (id, name, strain, file_path, total_length, gc_content, registered_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    dataset.id,
                    dataset.name,
                    dataset.strain,
                    dataset.file_path,
                    dataset.total_length,
                    dataset.gc_content,
                    now.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        if inserted == 0 {
            return Err(CatalogError::AlreadyExists(dataset.id));
        }

        Ok(DatasetRecord {
            id: dataset.id,
            name: dataset.name,
            strain: dataset.strain,
            file_path: dataset.file_path,
            total_length: dataset.total_length,
            gc_content: dataset.gc_content,
            registered_at: now,
        })
    }

    /// Get a single dataset.
    pub fn get(&self, id: &str) -> Result<DatasetRecord, CatalogError> {
        let conn = self.conn()?;
        match conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?"),
            params![id],
            Self::row_to_record,
        ) {
            Ok(record) => Ok(record),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(CatalogError::NotFound(id.to_string())),
            Err(e) => Err(CatalogError::Database(e.to_string())),
        }
    }

    /// All datasets, ordered by registration time.
    pub fn list(&self) -> Result<Vec<DatasetRecord>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY registered_at ASC, rowid ASC"))
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_record)
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CatalogError::Database(e.to_string()))
    }
}

impl DatasetCatalog for SqliteDatasetCatalog {
    fn resolve(&self, ids: &[String]) -> Result<Vec<DatasetRecord>, CatalogError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE id IN ({placeholders})"))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let found: HashMap<String, DatasetRecord> = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), Self::row_to_record)
            .map_err(|e| CatalogError::Database(e.to_string()))?
            .map(|row| row.map(|record| (record.id.clone(), record)))
            .collect::<Result<_, _>>()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(ids: &[&str]) -> SqliteDatasetCatalog {
        let catalog = SqliteDatasetCatalog::in_memory().unwrap();
        for id in ids {
            catalog
                .register(NewDataset::new(*id, format!("genome-{id}")))
                .unwrap();
        }
        catalog
    }

    #[test]
    fn test_register_and_get() {
        let catalog = SqliteDatasetCatalog::in_memory().unwrap();
        let record = catalog
            .register(
                NewDataset::new("g1", "EC-001")
                    .with_strain("E. coli O157:H7")
                    .with_file_path("/data/ec001.fasta"),
            )
            .unwrap();

        let fetched = catalog.get("g1").unwrap();
        assert_eq!(fetched, record);
        assert_eq!(fetched.strain.as_deref(), Some("E. coli O157:H7"));
    }

    #[test]
    fn test_register_duplicate_fails() {
        let catalog = catalog_with(&["g1"]);
        let err = catalog.register(NewDataset::new("g1", "again")).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(id) if id == "g1"));
    }

    #[test]
    fn test_get_missing() {
        let catalog = catalog_with(&[]);
        assert!(matches!(catalog.get("g9"), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_resolve_keeps_request_order_and_skips_unknown() {
        let catalog = catalog_with(&["g1", "g2", "g3"]);
        let ids: Vec<String> = ["g3", "missing", "g1"].iter().map(|s| s.to_string()).collect();

        let resolved = catalog.resolve(&ids).unwrap();
        let resolved_ids: Vec<&str> = resolved.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(resolved_ids, vec!["g3", "g1"]);
    }

    #[test]
    fn test_resolve_empty() {
        let catalog = catalog_with(&["g1"]);
        assert!(catalog.resolve(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_list() {
        let catalog = catalog_with(&["g1", "g2"]);
        let all = catalog.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "g1");
    }
}
