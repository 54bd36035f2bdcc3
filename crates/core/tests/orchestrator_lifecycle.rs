//! Orchestrator lifecycle integration tests.
//!
//! These tests verify the complete task lifecycle through the orchestrator:
//! pending -> running -> completed | failed | cancelled

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast::{self, error::TryRecvError};

use pams_core::{
    testing::{fixtures, MockAnalyzer},
    AdmissionError, AnalysisTask, AnalysisType, AnalyzerRegistry, OrchestratorConfig,
    OrchestratorError, ResultDetails, SqliteDatasetCatalog, SqliteTaskStore, SubmitRequest,
    TaskEvent, TaskOrchestrator, TaskStatus, TaskStore,
};

/// Test helper wiring SQLite stores and mock analyzers into an orchestrator.
struct TestHarness {
    task_store: Arc<SqliteTaskStore>,
    analyzers: HashMap<AnalysisType, Arc<MockAnalyzer>>,
    orchestrator: TaskOrchestrator,
    output_root: PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(dataset_ids: &[&str]) -> Self {
        Self::with_config(dataset_ids, OrchestratorConfig::default())
    }

    fn with_config(dataset_ids: &[&str], config: OrchestratorConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_root = temp_dir.path().join("results");
        Self::build(dataset_ids, config, temp_dir, output_root)
    }

    /// Harness whose output root cannot be created.
    fn with_unwritable_output(dataset_ids: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_root = temp_dir.path().join("not-a-dir");
        std::fs::write(&output_root, b"").expect("Failed to create blocker file");
        Self::build(dataset_ids, OrchestratorConfig::default(), temp_dir, output_root)
    }

    fn build(
        dataset_ids: &[&str],
        config: OrchestratorConfig,
        temp_dir: TempDir,
        output_root: PathBuf,
    ) -> Self {
        let task_store = Arc::new(
            SqliteTaskStore::new(&temp_dir.path().join("tasks.db"))
                .expect("Failed to create task store"),
        );
        let catalog = Arc::new(
            SqliteDatasetCatalog::new(&temp_dir.path().join("datasets.db"))
                .expect("Failed to create catalog"),
        );
        for id in dataset_ids {
            catalog
                .register(fixtures::new_dataset(id))
                .expect("Failed to register dataset");
        }

        let mut registry = AnalyzerRegistry::new();
        let mut analyzers = HashMap::new();
        for analysis_type in AnalysisType::ALL {
            let analyzer = Arc::new(MockAnalyzer::new(analysis_type));
            registry.register(analyzer.clone());
            analyzers.insert(analysis_type, analyzer);
        }

        let orchestrator = TaskOrchestrator::new(
            config,
            Arc::clone(&task_store) as Arc<dyn TaskStore>,
            catalog,
            registry,
            output_root.clone(),
        );

        Self {
            task_store,
            analyzers,
            orchestrator,
            output_root,
            _temp_dir: temp_dir,
        }
    }

    fn analyzer(&self, analysis_type: AnalysisType) -> &Arc<MockAnalyzer> {
        &self.analyzers[&analysis_type]
    }

    fn task(&self, task_id: &str) -> AnalysisTask {
        self.task_store
            .get(task_id)
            .expect("Failed to read task")
            .expect("Task missing")
    }

    fn output_files(&self, task_id: &str) -> Vec<String> {
        let dir = self.output_root.join(format!("task_{task_id}"));
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    async fn wait_for_terminal(&self, task_id: &str, timeout: Duration) -> AnalysisTask {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(10);

        while start.elapsed() < timeout {
            let task = self.task(task_id);
            if task.status.is_terminal() && !self.orchestrator.is_active(task_id) {
                return task;
            }
            tokio::time::sleep(poll_interval).await;
        }
        panic!("task {task_id} did not reach a terminal state");
    }
}

/// Collect the events of one task until its terminal event.
async fn collect_events(rx: &mut broadcast::Receiver<TaskEvent>, task_id: &str) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.task_id != task_id {
                continue;
            }
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("no terminal event");
    events
}

fn assert_no_more_events(rx: &mut broadcast::Receiver<TaskEvent>, task_id: &str) {
    loop {
        match rx.try_recv() {
            Ok(event) => assert_ne!(event.task_id, task_id, "unexpected event {event:?}"),
            Err(TryRecvError::Empty) => return,
            Err(e) => panic!("unexpected receive error {e}"),
        }
    }
}

fn statuses(events: &[TaskEvent]) -> Vec<TaskStatus> {
    events.iter().map(|e| e.status).collect()
}

fn progress_values(events: &[TaskEvent]) -> Vec<u8> {
    events.iter().map(|e| e.progress).collect()
}

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Admission Tests
// =============================================================================

#[tokio::test]
async fn test_phylogeny_with_single_dataset_is_rejected() {
    let harness = TestHarness::new(&["g1", "g2"]);

    let err = harness
        .orchestrator
        .submit(SubmitRequest::new("phylogeny", ["g1"]))
        .unwrap_err();

    assert_eq!(
        err.admission(),
        Some(&AdmissionError::TooFewDatasets {
            analysis_type: AnalysisType::Phylogeny,
            required: 2,
            found: 1
        })
    );
    assert_eq!(harness.orchestrator.stats().unwrap().total, 0);
    assert!(harness.analyzer(AnalysisType::Phylogeny).processed_ids().is_empty());
}

#[tokio::test]
async fn test_phylogeny_counts_only_valid_unique_datasets() {
    let harness = TestHarness::new(&["g1", "g2"]);

    let err = harness
        .orchestrator
        .submit(SubmitRequest::new("Phylogeny", ["g1", "g1", "ghost"]))
        .unwrap_err();

    assert!(matches!(
        err.admission(),
        Some(AdmissionError::TooFewDatasets { found: 1, .. })
    ));
    assert_eq!(harness.orchestrator.stats().unwrap().total, 0);
}

#[tokio::test]
async fn test_empty_dataset_list_is_rejected() {
    let harness = TestHarness::new(&["g1"]);

    let err = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", Vec::<String>::new()))
        .unwrap_err();

    assert_eq!(err.admission(), Some(&AdmissionError::NoDatasets));
    assert!(harness.orchestrator.list(&Default::default()).unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_type_is_rejected() {
    let harness = TestHarness::new(&["g1"]);

    let err = harness
        .orchestrator
        .submit(SubmitRequest::new("metagenomics", ["g1"]))
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Admission(AdmissionError::UnknownType(ref tag)) if tag == "metagenomics"
    ));
    assert_eq!(harness.orchestrator.stats().unwrap().total, 0);
}

#[tokio::test]
async fn test_unresolvable_datasets_are_rejected() {
    let harness = TestHarness::new(&["g1"]);

    let err = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["ghost-1", "ghost-2"]))
        .unwrap_err();

    assert_eq!(err.admission(), Some(&AdmissionError::NoValidDatasets));
    assert_eq!(harness.orchestrator.stats().unwrap().total, 0);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_sequence_typing_completes_with_entry_per_dataset() {
    let harness = TestHarness::new(&["g1", "g2"]);
    let mut rx = harness.orchestrator.subscribe();

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("SequenceTyping", ["g1", "g2"]))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.progress, 0);

    let events = collect_events(&mut rx, &task.id).await;

    assert_eq!(events.first().unwrap().status, TaskStatus::Pending);
    assert_eq!(events.last().unwrap().status, TaskStatus::Completed);
    assert!(events[1..events.len() - 1]
        .iter()
        .all(|e| e.status == TaskStatus::Running));

    let progress = progress_values(&events);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert!(progress.contains(&10));
    assert!(progress.contains(&50));
    assert_eq!(*progress.last().unwrap(), 100);

    let done = harness.wait_for_terminal(&task.id, WAIT).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.error_message.is_none());

    let result = done.result.expect("completed task has a result");
    assert_eq!(result.datasets_processed, 2);
    match result.details {
        ResultDetails::SequenceTyping { assignments } => {
            let ids: Vec<&str> = assignments.iter().map(|a| a.dataset_id.as_str()).collect();
            assert_eq!(ids, vec!["g1", "g2"]);
        }
        other => panic!("unexpected details {other:?}"),
    }
    assert_eq!(result.output_dir, harness.output_root.join(format!("task_{}", task.id)));
    assert_eq!(harness.output_files(&task.id), vec!["g1.mock", "g2.mock"]);
}

#[tokio::test]
async fn test_running_progress_is_strictly_increasing() {
    let ids = ["g1", "g2", "g3", "g4", "g5", "g6", "g7"];
    let harness = TestHarness::new(&ids);
    let mut rx = harness.orchestrator.subscribe();

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ids))
        .unwrap();
    let events = collect_events(&mut rx, &task.id).await;

    let running: Vec<u8> = events
        .iter()
        .filter(|e| e.status == TaskStatus::Running)
        .map(|e| e.progress)
        .collect();
    assert_eq!(running.first(), Some(&0));
    assert!(running.windows(2).all(|w| w[0] < w[1]), "{running:?}");
    assert_eq!(running.last(), Some(&90));
}

#[tokio::test]
async fn test_partial_failure_is_recorded_in_result() {
    let harness = TestHarness::new(&["g1", "g2", "g3"]);
    harness
        .analyzer(AnalysisType::ResistanceGenes)
        .fail_item("g2", "assembly truncated");

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("resistance_genes", ["g1", "g2", "g3"]))
        .unwrap();
    let done = harness.wait_for_terminal(&task.id, WAIT).await;

    assert_eq!(done.status, TaskStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result.datasets_processed, 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].dataset_id, "g2");
    assert_eq!(result.failures[0].message, "assembly truncated");
}

#[tokio::test]
async fn test_fatal_error_fails_task_with_progress_unchanged() {
    let harness = TestHarness::new(&["g1", "g2", "g3"]);
    harness
        .analyzer(AnalysisType::Annotation)
        .fail_fatal("g2", "reference database unavailable");
    let mut rx = harness.orchestrator.subscribe();

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g1", "g2", "g3"]))
        .unwrap();
    let events = collect_events(&mut rx, &task.id).await;

    let last = events.last().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert_eq!(
        last.error_message.as_deref(),
        Some("reference database unavailable")
    );

    let done = harness.wait_for_terminal(&task.id, WAIT).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.progress, 37);
    assert!(done.result.is_none());
    assert_eq!(
        harness.analyzer(AnalysisType::Annotation).processed_ids(),
        vec!["g1", "g2"]
    );
    assert_eq!(harness.orchestrator.active_count(), 0);
}

#[tokio::test]
async fn test_unwritable_output_area_fails_task() {
    let harness = TestHarness::with_unwritable_output(&["g1"]);

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("virulence", ["g1"]))
        .unwrap();
    let done = harness.wait_for_terminal(&task.id, WAIT).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error_message.unwrap().contains("Cannot write"));
    assert_eq!(done.progress, 10);
}

#[tokio::test]
async fn test_phylogeny_fails_when_too_few_datasets_succeed() {
    let harness = TestHarness::new(&["g1", "g2", "g3"]);
    let phylogeny = harness.analyzer(AnalysisType::Phylogeny);
    phylogeny.fail_item("g2", "alignment empty");
    phylogeny.fail_item("g3", "alignment empty");

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("phylogeny", ["g1", "g2", "g3"]))
        .unwrap();
    let done = harness.wait_for_terminal(&task.id, WAIT).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error_message.unwrap().contains("at least 2"));
    assert_eq!(done.progress, 90);
    assert_eq!(phylogeny.combine_calls(), 0);
}

#[tokio::test]
async fn test_phylogeny_builds_combined_tree() {
    let harness = TestHarness::new(&["g1", "g2", "g3"]);

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("phylogeny", ["g1", "g2", "g3"]))
        .unwrap();
    let done = harness.wait_for_terminal(&task.id, WAIT).await;

    assert_eq!(done.status, TaskStatus::Completed);
    match done.result.unwrap().details {
        ResultDetails::Phylogeny {
            taxa, tree_file, ..
        } => {
            assert_eq!(taxa, vec!["g1", "g2", "g3"]);
            assert!(tree_file.unwrap().exists());
        }
        other => panic!("unexpected details {other:?}"),
    }
}

#[tokio::test]
async fn test_item_timeout_fails_task() {
    let harness = TestHarness::with_config(
        &["g1"],
        OrchestratorConfig {
            max_concurrent_tasks: 0,
            item_timeout_secs: Some(1),
        },
    );
    harness
        .analyzer(AnalysisType::Annotation)
        .set_delay(Duration::from_secs(30));

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g1"]))
        .unwrap();
    let done = harness.wait_for_terminal(&task.id, WAIT).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_concurrent_tasks_run_independently() {
    let harness = TestHarness::new(&["g1", "g2", "g3"]);
    harness.analyzer(AnalysisType::Annotation).hold("g1");

    let blocked = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g1"]))
        .unwrap();
    let free = harness
        .orchestrator
        .submit(SubmitRequest::new("virulence", ["g2", "g3"]))
        .unwrap();

    let done = harness.wait_for_terminal(&free.id, WAIT).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(harness.task(&blocked.id).status, TaskStatus::Running);

    harness.analyzer(AnalysisType::Annotation).release("g1");
    let done = harness.wait_for_terminal(&blocked.id, WAIT).await;
    assert_eq!(done.status, TaskStatus::Completed);

    let stats = harness.orchestrator.stats().unwrap();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.total, 2);
}

// =============================================================================
// Cancellation Tests
// =============================================================================

#[tokio::test]
async fn test_cancel_after_first_of_three_datasets() {
    let harness = TestHarness::new(&["g1", "g2", "g3"]);
    let analyzer = harness.analyzer(AnalysisType::Annotation);
    analyzer.hold("g2");
    let mut rx = harness.orchestrator.subscribe();

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g1", "g2", "g3"]))
        .unwrap();
    analyzer.wait_until_held("g2").await;

    assert!(harness.orchestrator.cancel(&task.id).unwrap());
    assert!(!harness.orchestrator.is_active(&task.id));

    let events = collect_events(&mut rx, &task.id).await;
    let last = events.last().unwrap();
    assert_eq!(last.status, TaskStatus::Cancelled);
    assert_eq!(last.progress, 37);

    // The in-flight dataset is allowed to finish; nothing after it runs.
    analyzer.release("g2");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cancelled = harness.task(&task.id);
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.progress, 37);
    assert!(cancelled.result.is_none());
    assert_eq!(analyzer.processed_ids(), vec!["g1", "g2"]);
    assert!(!harness.output_files(&task.id).contains(&"g3.mock".to_string()));
    assert_no_more_events(&mut rx, &task.id);
    assert_eq!(harness.orchestrator.active_count(), 0);
}

#[tokio::test]
async fn test_cancel_before_start_skips_running() {
    let harness = TestHarness::with_config(
        &["g1", "g2"],
        OrchestratorConfig {
            max_concurrent_tasks: 1,
            item_timeout_secs: None,
        },
    );
    let analyzer = harness.analyzer(AnalysisType::Annotation);
    analyzer.hold("g1");
    let mut rx = harness.orchestrator.subscribe();

    let first = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g1"]))
        .unwrap();
    analyzer.wait_until_held("g1").await;
    let queued = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g2"]))
        .unwrap();

    assert!(harness.orchestrator.cancel(&queued.id).unwrap());
    let events = collect_events(&mut rx, &queued.id).await;
    assert_eq!(
        statuses(&events),
        vec![TaskStatus::Pending, TaskStatus::Cancelled]
    );

    analyzer.release("g1");
    harness.wait_for_terminal(&first.id, WAIT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.task(&queued.id).status, TaskStatus::Cancelled);
    assert_no_more_events(&mut rx, &queued.id);
}

#[tokio::test]
async fn test_cancel_terminal_task_is_a_no_op() {
    let harness = TestHarness::new(&["g1"]);

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g1"]))
        .unwrap();
    let done = harness.wait_for_terminal(&task.id, WAIT).await;
    assert_eq!(done.status, TaskStatus::Completed);

    let mut rx = harness.orchestrator.subscribe();
    assert!(harness.orchestrator.cancel(&task.id).unwrap());
    assert!(harness.orchestrator.cancel(&task.id).unwrap());

    assert_eq!(harness.task(&task.id), done);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_cancel_unknown_task_returns_false() {
    let harness = TestHarness::new(&["g1"]);
    assert!(!harness.orchestrator.cancel("no-such-task").unwrap());
}

#[tokio::test]
async fn test_shutdown_cancels_live_tasks() {
    let harness = TestHarness::new(&["g1", "g2"]);
    let analyzer = harness.analyzer(AnalysisType::SequenceTyping);
    analyzer.hold("g1");

    let task = harness
        .orchestrator
        .submit(SubmitRequest::new("mlst", ["g1", "g2"]))
        .unwrap();
    analyzer.wait_until_held("g1").await;

    assert_eq!(harness.orchestrator.shutdown(), 1);
    analyzer.release("g1");

    let done = harness.wait_for_terminal(&task.id, WAIT).await;
    assert_eq!(done.status, TaskStatus::Cancelled);
    assert!(done.progress < 100);
    assert_eq!(analyzer.processed_ids(), vec!["g1"]);
    assert!(matches!(
        harness
            .orchestrator
            .submit(SubmitRequest::new("mlst", ["g1"])),
        Err(OrchestratorError::ShutDown)
    ));
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let harness = TestHarness::new(&["g1", "g2"]);
    harness.analyzer(AnalysisType::Annotation).fail_fatal("g2", "boom");

    let ok = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g1"]))
        .unwrap();
    let failed = harness
        .orchestrator
        .submit(SubmitRequest::new("annotation", ["g2"]))
        .unwrap();
    harness.wait_for_terminal(&ok.id, WAIT).await;
    harness.wait_for_terminal(&failed.id, WAIT).await;

    let filter = pams_core::TaskFilter::new().with_status(TaskStatus::Failed);
    let listed = harness.orchestrator.list(&filter).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, failed.id);

    let stats = harness.orchestrator.stats().unwrap();
    assert_eq!((stats.completed, stats.failed, stats.total), (1, 1, 2));
}
