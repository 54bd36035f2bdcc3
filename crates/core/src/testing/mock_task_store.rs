//! Task store wrapper with scriptable update failures.

use std::sync::{Condvar, Mutex};

use crate::task::{
    AnalysisTask, CreateTaskRequest, SqliteTaskStore, StatusUpdate, TaskError, TaskFilter,
    TaskStatus, TaskStore,
};

#[derive(Debug, Default)]
struct Hold {
    status: Option<TaskStatus>,
    reached: bool,
}

/// [`TaskStore`] over an in-memory SQLite store.
///
/// Status updates can be made to fail, or be parked before they reach the
/// inner store so a test can act while a write is in flight.
#[derive(Debug)]
pub struct MockTaskStore {
    inner: SqliteTaskStore,
    /// If set, every status update fails with this message.
    update_error: Mutex<Option<String>>,
    hold: Mutex<Hold>,
    hold_changed: Condvar,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::wrapping(SqliteTaskStore::in_memory().expect("in-memory task store"))
    }

    pub fn wrapping(inner: SqliteTaskStore) -> Self {
        Self {
            inner,
            update_error: Mutex::new(None),
            hold: Mutex::new(Hold::default()),
            hold_changed: Condvar::new(),
        }
    }

    /// Fail every status update from now on.
    pub fn fail_updates(&self, message: &str) {
        *self.update_error.lock().unwrap() = Some(message.to_string());
    }

    /// Block updates to `status` until [`release`](Self::release).
    pub fn hold(&self, status: TaskStatus) {
        let mut hold = self.hold.lock().unwrap();
        hold.status = Some(status);
        hold.reached = false;
    }

    pub fn release(&self) {
        self.hold.lock().unwrap().status = None;
        self.hold_changed.notify_all();
    }

    /// Wait until an update to the held status is parked.
    pub async fn wait_until_held(&self) {
        while !self.hold.lock().unwrap().reached {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    fn park(&self, status: TaskStatus) {
        let mut hold = self.hold.lock().unwrap();
        if hold.status != Some(status) {
            return;
        }
        hold.reached = true;
        while hold.status == Some(status) {
            hold = self.hold_changed.wait(hold).unwrap();
        }
    }
}

impl Default for MockTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore for MockTaskStore {
    fn create(&self, request: CreateTaskRequest) -> Result<AnalysisTask, TaskError> {
        self.inner.create(request)
    }

    fn get(&self, id: &str) -> Result<Option<AnalysisTask>, TaskError> {
        self.inner.get(id)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<AnalysisTask>, TaskError> {
        self.inner.list(filter)
    }

    fn count(&self, filter: &TaskFilter) -> Result<i64, TaskError> {
        self.inner.count(filter)
    }

    fn update_status(&self, id: &str, update: StatusUpdate) -> Result<AnalysisTask, TaskError> {
        if let Some(message) = self.update_error.lock().unwrap().clone() {
            return Err(TaskError::Database(message));
        }
        self.park(update.status);
        self.inner.update_status(id, update)
    }
}
