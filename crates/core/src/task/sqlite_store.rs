//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use super::{
    AnalysisTask, CreateTaskRequest, StatusUpdate, TaskError, TaskFilter, TaskStatus, TaskStore,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str = "SELECT id, analysis_type, dataset_ids, parameters, status, progress, result, error_message, created_at, updated_at FROM analysis_tasks";

/// SQLite-backed task store.
#[derive(Debug)]
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = Connection::open(path).map_err(|e| TaskError::Database(e.to_string()))?;
        // Tasks and datasets may share one file through separate connections.
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_tasks (
                id TEXT PRIMARY KEY,
                analysis_type TEXT NOT NULL,
                dataset_ids TEXT NOT NULL,
                parameters TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                result TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analysis_tasks_status ON analysis_tasks(status);
            CREATE INDEX IF NOT EXISTS idx_analysis_tasks_created_at ON analysis_tasks(created_at);
            "#,
        )
        .map_err(|e| TaskError::Database(e.to_string()))?;
        Ok(())
    }

    /// Fixed-width RFC 3339 so lexical order matches time order.
    fn timestamp(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &TaskFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(analysis_type) = filter.analysis_type {
            conditions.push("analysis_type = ?");
            params.push(Box::new(analysis_type.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn conversion_error(idx: usize, msg: impl Into<String>) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into().into())
    }

    fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Self::conversion_error(idx, e.to_string()))
    }

    fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
        serde_json::from_str(raw).map_err(|e| Self::conversion_error(idx, e.to_string()))
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<AnalysisTask> {
        let id: String = row.get(0)?;
        let analysis_type: String = row.get(1)?;
        let dataset_ids: String = row.get(2)?;
        let parameters: String = row.get(3)?;
        let status: String = row.get(4)?;
        let progress: u8 = row.get(5)?;
        let result: Option<String> = row.get(6)?;
        let error_message: Option<String> = row.get(7)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(AnalysisTask {
            id,
            analysis_type: analysis_type
                .parse()
                .map_err(|e: String| Self::conversion_error(1, e))?,
            dataset_ids: Self::parse_json(2, &dataset_ids)?,
            parameters: Self::parse_json(3, &parameters)?,
            status: status
                .parse()
                .map_err(|e: String| Self::conversion_error(4, e))?,
            progress,
            result: result
                .as_deref()
                .map(|raw| Self::parse_json(6, raw))
                .transpose()?,
            error_message,
            created_at: Self::parse_time(8, &created_at)?,
            updated_at: Self::parse_time(9, &updated_at)?,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<AnalysisTask>, TaskError> {
        let result = conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?"),
            params![id],
            Self::row_to_task,
        );

        match result {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TaskError::Database(e.to_string())),
        }
    }
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, request: CreateTaskRequest) -> Result<AnalysisTask, TaskError> {
        let conn = self.conn()?;

        let now = Utc::now();
        let task = AnalysisTask {
            id: uuid::Uuid::new_v4().to_string(),
            analysis_type: request.analysis_type,
            dataset_ids: request.dataset_ids,
            parameters: request.parameters,
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };

        let dataset_ids_json = serde_json::to_string(&task.dataset_ids)
            .map_err(|e| TaskError::Database(e.to_string()))?;
        let parameters_json = serde_json::to_string(&task.parameters)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO analysis_tasks (id, analysis_type, dataset_ids, parameters, status, progress, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                task.id,
                task.analysis_type.as_str(),
                dataset_ids_json,
                parameters_json,
                task.status.as_str(),
                task.progress,
                Self::timestamp(&now),
                Self::timestamp(&now),
            ],
        )
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(task)
    }

    fn get(&self, id: &str) -> Result<Option<AnalysisTask>, TaskError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<AnalysisTask>, TaskError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "{SELECT_COLUMNS} {where_clause} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_task)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn count(&self, filter: &TaskFilter) -> Result<i64, TaskError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM analysis_tasks {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn update_status(&self, id: &str, update: StatusUpdate) -> Result<AnalysisTask, TaskError> {
        let conn = self.conn()?;

        let mut task = Self::fetch(&conn, id)?.ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        let from = task.status;
        let to = update.status;
        task.apply(update, Utc::now())
            .map_err(|violation| TaskError::InvalidTransition {
                task_id: id.to_string(),
                from,
                to,
                reason: violation.to_string(),
            })?;

        let result_json = task
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| TaskError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE analysis_tasks SET status = ?, progress = ?, result = ?, error_message = ?, updated_at = ? WHERE id = ?",
            params![
                task.status.as_str(),
                task.progress,
                result_json,
                task.error_message,
                Self::timestamp(&task.updated_at),
                id,
            ],
        )
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(task)
    }
}
