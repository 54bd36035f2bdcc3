//! Task orchestrator implementation.
//!
//! Drives tasks through the lifecycle:
//! - Admission: synchronous validation and record creation
//! - Execution: one spawned tokio task per admitted task
//! - Finalization: terminal write, event, handle teardown

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::analyzer::AnalyzerRegistry;
use crate::dataset::{DatasetCatalog, DatasetRecord};
use crate::events::{EventNotifier, TaskEvent};
use crate::metrics;
use crate::pipeline::{PipelineControl, PipelineOutcome, PipelineRunner};
use crate::task::{
    AnalysisTask, AnalysisType, CreateTaskRequest, StatusUpdate, TaskFilter, TaskStats,
    TaskStatus, TaskStore,
};

use super::config::OrchestratorConfig;
use super::handles::{ExecutionHandle, HandleRegistry};
use super::types::{AdmissionError, OrchestratorError, OrchestratorStatus, SubmitRequest};

/// PipelineControl implementation that persists progress to the task store.
struct TaskControl {
    task_id: String,
    handle: Arc<ExecutionHandle>,
    task_store: Arc<dyn TaskStore>,
    notifier: EventNotifier,
    last_progress: AtomicU8,
}

impl TaskControl {
    /// Persist `update` and announce it, unless the task was cancelled.
    fn write(&self, update: StatusUpdate) -> bool {
        let _gate = self.handle.gate();
        if self.handle.is_cancelled() {
            return false;
        }
        self.write_locked(update)
    }

    /// Persist and announce; the caller holds the gate.
    fn write_locked(&self, update: StatusUpdate) -> bool {
        match self.task_store.update_status(&self.task_id, update) {
            Ok(task) => {
                self.last_progress.store(task.progress, Ordering::SeqCst);
                self.notifier.publish(TaskEvent::from_task(&task));
                true
            }
            Err(e) => {
                warn!("Failed to update task {}: {}", self.task_id, e);
                false
            }
        }
    }

    fn last_progress(&self) -> u8 {
        self.last_progress.load(Ordering::SeqCst)
    }
}

impl PipelineControl for TaskControl {
    fn stop_requested(&self) -> bool {
        self.handle.is_cancelled()
    }

    fn report_progress(&self, progress: u8) -> bool {
        // Only strictly increasing values are written.
        if progress <= self.last_progress() {
            return !self.handle.is_cancelled();
        }
        self.write(StatusUpdate::running(progress))
    }
}

/// The task orchestrator - admits tasks and supervises their pipelines.
pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    task_store: Arc<dyn TaskStore>,
    catalog: Arc<dyn DatasetCatalog>,
    pipeline: Arc<PipelineRunner>,
    notifier: EventNotifier,

    // Runtime state
    accepting: Arc<AtomicBool>,
    handles: Arc<HandleRegistry>,
    limiter: Option<Arc<Semaphore>>,
}

impl TaskOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        task_store: Arc<dyn TaskStore>,
        catalog: Arc<dyn DatasetCatalog>,
        registry: AnalyzerRegistry,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        let pipeline = PipelineRunner::new(Arc::new(registry), output_root)
            .with_item_timeout(config.item_timeout());
        let limiter = match config.max_concurrent_tasks {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Self {
            config,
            task_store,
            catalog,
            pipeline: Arc::new(pipeline),
            notifier: EventNotifier::default(),
            accepting: Arc::new(AtomicBool::new(true)),
            handles: Arc::new(HandleRegistry::default()),
            limiter,
        }
    }

    /// Use a specific notifier (e.g. one with a configured capacity).
    pub fn with_notifier(mut self, notifier: EventNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Admit a task and start it in the background.
    ///
    /// Returns the Pending record without waiting for the pipeline. Must be
    /// called from within a Tokio runtime.
    pub fn submit(&self, request: SubmitRequest) -> Result<AnalysisTask, OrchestratorError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(OrchestratorError::ShutDown);
        }

        let (analysis_type, datasets) = match self.admit(&request) {
            Ok(admitted) => admitted,
            Err(OrchestratorError::Admission(e)) => {
                metrics::ADMISSIONS_REJECTED
                    .with_label_values(&[e.reason()])
                    .inc();
                info!("Rejected {} submission: {}", request.analysis_type, e);
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        let task = self.task_store.create(CreateTaskRequest {
            analysis_type,
            dataset_ids: datasets.iter().map(|d| d.id.clone()).collect(),
            parameters: request.parameters,
        })?;
        self.notifier.publish(TaskEvent::from_task(&task));
        metrics::TASKS_SUBMITTED
            .with_label_values(&[analysis_type.as_str()])
            .inc();

        let handle = self.handles.register(&task.id);
        self.spawn_execution(task.clone(), datasets, handle);

        info!(
            "Admitted task {} ({}, {} datasets)",
            task.id,
            analysis_type,
            task.dataset_ids.len()
        );
        Ok(task)
    }

    /// Validate a submission and resolve its datasets.
    fn admit(
        &self,
        request: &SubmitRequest,
    ) -> Result<(AnalysisType, Vec<DatasetRecord>), OrchestratorError> {
        let analysis_type: AnalysisType = request
            .analysis_type
            .parse()
            .map_err(|_| AdmissionError::UnknownType(request.analysis_type.clone()))?;

        if request.dataset_ids.is_empty() {
            return Err(AdmissionError::NoDatasets.into());
        }

        if !self.pipeline.registry().contains(analysis_type) {
            return Err(AdmissionError::NoAnalyzer(analysis_type).into());
        }

        let mut seen = HashSet::new();
        let unique: Vec<String> = request
            .dataset_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let datasets = self.catalog.resolve(&unique)?;
        if datasets.len() < unique.len() {
            debug!(
                "Dropped {} unknown dataset ids from {} submission",
                unique.len() - datasets.len(),
                analysis_type
            );
        }

        if datasets.is_empty() {
            return Err(AdmissionError::NoValidDatasets.into());
        }

        let required = analysis_type.min_datasets();
        if datasets.len() < required {
            return Err(AdmissionError::TooFewDatasets {
                analysis_type,
                required,
                found: datasets.len(),
            }
            .into());
        }

        Ok((analysis_type, datasets))
    }

    /// Spawn the task's execution.
    fn spawn_execution(
        &self,
        task: AnalysisTask,
        datasets: Vec<DatasetRecord>,
        handle: Arc<ExecutionHandle>,
    ) {
        let control = Arc::new(TaskControl {
            task_id: task.id.clone(),
            handle,
            task_store: Arc::clone(&self.task_store),
            notifier: self.notifier.clone(),
            last_progress: AtomicU8::new(task.progress),
        });
        let pipeline = Arc::clone(&self.pipeline);
        let handles = Arc::clone(&self.handles);
        let limiter = self.limiter.clone();

        tokio::spawn(async move {
            let _permit = match limiter {
                Some(limiter) => match limiter.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            if !control.write(StatusUpdate::running(0)) {
                if control.handle.is_cancelled() {
                    debug!("Task {} cancelled before it started", task.id);
                } else if handles.take(&task.id).is_some() {
                    // Pending has no edge to Failed; the record stays Pending.
                    metrics::TASK_WRITE_FAILURES
                        .with_label_values(&["start"])
                        .inc();
                    error!("Task {} could not be started, left pending", task.id);
                }
                return;
            }
            info!("Task {} running", task.id);

            let outcome = {
                let control = Arc::clone(&control);
                let task = task.clone();
                let run = tokio::spawn(async move {
                    pipeline.run(&task, &datasets, control.as_ref()).await
                });
                match run.await {
                    Ok(outcome) => outcome,
                    Err(e) => PipelineOutcome::Failed(format!("pipeline aborted: {e}")),
                }
            };

            Self::finalize(&handles, &control, task.analysis_type, outcome);
        });
    }

    /// Write the terminal state reached by the pipeline.
    fn finalize(
        handles: &HandleRegistry,
        control: &TaskControl,
        analysis_type: AnalysisType,
        outcome: PipelineOutcome,
    ) {
        let task_id = &control.task_id;

        // Claim the task. Without the handle a cancel got here first.
        if handles.take(task_id).is_none() {
            debug!("Task {} already cancelled, skipping finalization", task_id);
            return;
        }

        let update = match outcome {
            PipelineOutcome::Completed(summary) => StatusUpdate::completed(summary),
            PipelineOutcome::Failed(message) => {
                error!("Task {} failed: {}", task_id, message);
                StatusUpdate::failed(control.last_progress(), message)
            }
            // Stopped while still holding the handle: progress could not be
            // persisted.
            PipelineOutcome::Stopped => StatusUpdate::failed(
                control.last_progress(),
                "progress update was not persisted",
            ),
        };
        let status = update.status;

        let _gate = control.handle.gate();
        if control.write_locked(update) {
            metrics::TASKS_FINISHED
                .with_label_values(&[analysis_type.as_str(), status.as_str()])
                .inc();
            info!("Task {} {}", task_id, status);
        } else {
            metrics::TASK_WRITE_FAILURES
                .with_label_values(&["finalize"])
                .inc();
            error!(
                "Task {} finished as {} but the record could not be updated",
                task_id, status
            );
        }
    }

    /// Cancel a task.
    ///
    /// Returns `Ok(false)` only for an unknown id. Cancelling a task that is
    /// already terminal, or finishing, is a successful no-op.
    pub fn cancel(&self, task_id: &str) -> Result<bool, OrchestratorError> {
        let Some(handle) = self.handles.take(task_id) else {
            return Ok(self.task_store.get(task_id)?.is_some());
        };
        handle.cancel();

        let _gate = handle.gate();
        let Some(task) = self.task_store.get(task_id)? else {
            return Ok(false);
        };
        if task.status.is_terminal() {
            return Ok(true);
        }

        let progress = task.progress;
        match self
            .task_store
            .update_status(task_id, StatusUpdate::cancelled(progress))
        {
            Ok(task) => {
                self.notifier.publish(TaskEvent::from_task(&task));
                metrics::TASKS_FINISHED
                    .with_label_values(&[task.analysis_type.as_str(), TaskStatus::Cancelled.as_str()])
                    .inc();
                info!("Task {} cancelled at {}%", task_id, progress);
                Ok(true)
            }
            Err(e) if e.is_invalid_transition() => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop accepting work and cancel every live task.
    ///
    /// Returns the number of tasks cancelled.
    pub fn shutdown(&self) -> usize {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator already shut down");
        }

        let mut cancelled = 0;
        for task_id in self.handles.ids() {
            match self.cancel(&task_id) {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to cancel task {} during shutdown: {}", task_id, e),
            }
        }
        info!("Orchestrator shut down, {} tasks cancelled", cancelled);
        cancelled
    }

    /// Get a task by ID.
    pub fn get(&self, task_id: &str) -> Result<Option<AnalysisTask>, OrchestratorError> {
        Ok(self.task_store.get(task_id)?)
    }

    /// List tasks, newest first.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<AnalysisTask>, OrchestratorError> {
        Ok(self.task_store.list(filter)?)
    }

    /// Task counts by status.
    pub fn stats(&self) -> Result<TaskStats, OrchestratorError> {
        Ok(self.task_store.stats()?)
    }

    /// Subscribe to task events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.notifier.subscribe()
    }

    /// Number of tasks holding an execution handle.
    pub fn active_count(&self) -> usize {
        self.handles.len()
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.handles.contains(task_id)
    }

    /// Get current orchestrator status.
    pub fn status(&self) -> Result<OrchestratorStatus, OrchestratorError> {
        Ok(OrchestratorStatus {
            accepting: self.accepting.load(Ordering::SeqCst),
            active_tasks: self.handles.len(),
            tasks: self.task_store.stats()?,
        })
    }
}
