//! Execution handles for live tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::metrics;

/// The in-memory means of stopping one live task.
#[derive(Debug, Default)]
pub(crate) struct ExecutionHandle {
    cancelled: AtomicBool,
    /// Held around every "store write + event" pair for the task.
    gate: Mutex<()>,
}

impl ExecutionHandle {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live handles keyed by task id.
///
/// Removing a handle is how a terminal path claims its task: whoever takes
/// it (cancel or finalize) is the only one allowed to write the terminal
/// state.
#[derive(Debug, Default)]
pub(crate) struct HandleRegistry {
    handles: Mutex<HashMap<String, Arc<ExecutionHandle>>>,
}

impl HandleRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ExecutionHandle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, task_id: &str) -> Arc<ExecutionHandle> {
        let handle = Arc::new(ExecutionHandle::default());
        if self
            .lock()
            .insert(task_id.to_string(), Arc::clone(&handle))
            .is_none()
        {
            metrics::ACTIVE_TASKS.inc();
        }
        handle
    }

    pub(crate) fn take(&self, task_id: &str) -> Option<Arc<ExecutionHandle>> {
        let handle = self.lock().remove(task_id);
        if handle.is_some() {
            metrics::ACTIVE_TASKS.dec();
        }
        handle
    }

    pub(crate) fn contains(&self, task_id: &str) -> bool {
        self.lock().contains_key(task_id)
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}
