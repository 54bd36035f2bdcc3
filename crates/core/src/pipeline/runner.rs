//! Sequential per-dataset pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::analyzer::{AnalyzerError, AnalyzerRegistry, OutputArea, ProcessedItem};
use crate::dataset::DatasetRecord;
use crate::metrics;
use crate::task::AnalysisTask;

use super::summary::ResultSummary;

/// Hooks the pipeline uses to talk back to whoever supervises the task.
pub trait PipelineControl: Send + Sync {
    /// True once cancellation was requested.
    fn stop_requested(&self) -> bool;

    /// Persist and announce progress. Returns false when the task can no
    /// longer advance and the pipeline must stop.
    fn report_progress(&self, progress: u8) -> bool;
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Every dataset was visited and finalization succeeded.
    Completed(ResultSummary),
    /// An unrecoverable error; carries the originating message.
    Failed(String),
    /// Stopped at a checkpoint.
    Stopped,
}

/// Runs a task's datasets through the analyzer registered for its type.
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    registry: Arc<AnalyzerRegistry>,
    output_root: PathBuf,
    item_timeout: Option<Duration>,
}

impl PipelineRunner {
    pub fn new(registry: Arc<AnalyzerRegistry>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            output_root: output_root.into(),
            item_timeout: None,
        }
    }

    /// Bound every analyzer call; a call that overruns fails the task.
    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    pub fn output_area(&self, task_id: &str) -> OutputArea {
        OutputArea::for_task(&self.output_root, task_id)
    }

    /// Process `datasets` in order.
    ///
    /// Cancellation is checked after setup, before each dataset and before
    /// finalization. A dataset that has started is always finished.
    pub async fn run(
        &self,
        task: &AnalysisTask,
        datasets: &[DatasetRecord],
        control: &dyn PipelineControl,
    ) -> PipelineOutcome {
        let Some(entry) = self.registry.get(task.analysis_type) else {
            return PipelineOutcome::Failed(format!(
                "no analyzer registered for {}",
                task.analysis_type
            ));
        };
        let analyzer = Arc::clone(&entry.analyzer);
        let weights = entry.weights;
        let type_label = task.analysis_type.as_str();

        let output = self.output_area(&task.id);
        let mut summary = ResultSummary::new(task.analysis_type, output.dir());
        let mut processed: Vec<ProcessedItem> = Vec::with_capacity(datasets.len());

        if control.stop_requested() || !control.report_progress(weights.after_setup()) {
            return PipelineOutcome::Stopped;
        }

        for (index, dataset) in datasets.iter().enumerate() {
            if control.stop_requested() {
                info!(
                    "Task {} stopping with {} datasets left",
                    task.id,
                    datasets.len() - index
                );
                return PipelineOutcome::Stopped;
            }

            let started = Instant::now();
            let result = match self.item_timeout {
                Some(limit) => {
                    match tokio::time::timeout(
                        limit,
                        analyzer.process(dataset, &task.parameters, &output),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(AnalyzerError::Fatal(format!(
                            "{} timed out after {}s on dataset {}",
                            analyzer.name(),
                            limit.as_secs_f64(),
                            dataset.id
                        ))),
                    }
                }
                None => analyzer.process(dataset, &task.parameters, &output).await,
            };
            let elapsed = started.elapsed().as_secs_f64();

            match result {
                Ok(item) => {
                    metrics::ITEM_DURATION
                        .with_label_values(&[type_label, "success"])
                        .observe(elapsed);
                    let finding = item.finding.clone();
                    if let Err(message) = summary.record_item(&dataset.id, item) {
                        return PipelineOutcome::Failed(message);
                    }
                    processed.push(ProcessedItem {
                        dataset: dataset.clone(),
                        finding,
                    });
                }
                Err(AnalyzerError::Item(message)) => {
                    metrics::ITEM_DURATION
                        .with_label_values(&[type_label, "item_error"])
                        .observe(elapsed);
                    metrics::ITEM_FAILURES
                        .with_label_values(&[type_label])
                        .inc();
                    warn!(
                        "Task {}: dataset {} failed, continuing: {}",
                        task.id, dataset.id, message
                    );
                    summary.record_failure(&dataset.id, message);
                }
                Err(err) => {
                    metrics::ITEM_DURATION
                        .with_label_values(&[type_label, "fatal"])
                        .observe(elapsed);
                    error!(
                        "Task {}: {} failed on dataset {}: {}",
                        task.id,
                        analyzer.name(),
                        dataset.id,
                        err
                    );
                    return PipelineOutcome::Failed(err.to_string());
                }
            }

            if !control.report_progress(weights.after_items(index + 1, datasets.len())) {
                return PipelineOutcome::Stopped;
            }
        }

        if control.stop_requested() {
            return PipelineOutcome::Stopped;
        }

        let required = task.analysis_type.min_successful_items();
        if processed.len() < required {
            return PipelineOutcome::Failed(format!(
                "{} needs at least {} successfully processed datasets, got {}",
                task.analysis_type,
                required,
                processed.len()
            ));
        }

        match analyzer.combine(&processed, &task.parameters, &output).await {
            Ok(Some(combined)) => {
                if let Err(message) = summary.record_combined(combined) {
                    return PipelineOutcome::Failed(message);
                }
            }
            Ok(None) => {}
            Err(err) => return PipelineOutcome::Failed(err.to_string()),
        }

        debug!(
            "Task {} pipeline finished: {} processed, {} failed",
            task.id,
            summary.datasets_processed,
            summary.failures.len()
        );
        PipelineOutcome::Completed(summary)
    }
}
