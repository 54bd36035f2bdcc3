//! Mock analyzer for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::analyzer::{
    Analyzer, AnalyzerError, Finding, GeneHit, ItemOutput, OutputArea, ProcessedItem,
};
use crate::dataset::DatasetRecord;
use crate::task::{AnalysisType, TaskParameters};

/// A recorded `process` call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Dataset the call was made for.
    pub dataset_id: String,
    /// Parameters as received.
    pub parameters: TaskParameters,
}

/// Mock implementation of the Analyzer trait.
///
/// Provides controllable behavior for testing:
/// - Scripted per-dataset item or fatal failures
/// - Simulated per-call delay
/// - Holding a dataset at the start of `process` until released
/// - Call recording
///
/// # Example
///
/// ```rust,ignore
/// use pams_core::testing::MockAnalyzer;
///
/// let analyzer = Arc::new(MockAnalyzer::new(AnalysisType::Annotation));
/// analyzer.fail_item("g2", "assembly truncated");
///
/// // ... run a task ...
///
/// assert_eq!(analyzer.processed_ids(), vec!["g1", "g2", "g3"]);
/// ```
#[derive(Debug)]
pub struct MockAnalyzer {
    analysis_type: AnalysisType,
    name: String,
    /// Dataset id -> message for partial failures.
    item_failures: Mutex<HashMap<String, String>>,
    /// Dataset id -> message for fatal failures.
    fatal_failures: Mutex<HashMap<String, String>>,
    /// Overrides the finding returned for every dataset.
    finding: Mutex<Option<Finding>>,
    /// Simulated processing time per dataset.
    delay: Mutex<Duration>,
    /// Recorded calls, in order.
    calls: Mutex<Vec<RecordedCall>>,
    combine_calls: AtomicUsize,
    /// Datasets that must wait for `release` before being processed.
    holds: Mutex<HashMap<String, Arc<Semaphore>>>,
    /// Held datasets that reached their hold point.
    waiting: Mutex<HashSet<String>>,
    waiting_changed: Notify,
}

impl MockAnalyzer {
    /// Create a new mock analyzer for an analysis type.
    pub fn new(analysis_type: AnalysisType) -> Self {
        Self {
            analysis_type,
            name: format!("mock-{}", analysis_type.as_str()),
            item_failures: Mutex::new(HashMap::new()),
            fatal_failures: Mutex::new(HashMap::new()),
            finding: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            combine_calls: AtomicUsize::new(0),
            holds: Mutex::new(HashMap::new()),
            waiting: Mutex::new(HashSet::new()),
            waiting_changed: Notify::new(),
        }
    }

    /// Make `dataset_id` fail as a partial (per-dataset) failure.
    pub fn fail_item(&self, dataset_id: &str, message: &str) {
        self.item_failures
            .lock()
            .unwrap()
            .insert(dataset_id.to_string(), message.to_string());
    }

    /// Make `dataset_id` fail the whole task.
    pub fn fail_fatal(&self, dataset_id: &str, message: &str) {
        self.fatal_failures
            .lock()
            .unwrap()
            .insert(dataset_id.to_string(), message.to_string());
    }

    /// Return this finding for every dataset instead of the type default.
    pub fn set_finding(&self, finding: Finding) {
        *self.finding.lock().unwrap() = Some(finding);
    }

    /// Set the simulated processing time.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Block `process` for `dataset_id` until [`release`](Self::release).
    pub fn hold(&self, dataset_id: &str) {
        self.holds
            .lock()
            .unwrap()
            .insert(dataset_id.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let a held dataset proceed.
    pub fn release(&self, dataset_id: &str) {
        if let Some(gate) = self.holds.lock().unwrap().get(dataset_id) {
            gate.add_permits(1);
        }
    }

    /// Wait until a held dataset reached its hold point.
    pub async fn wait_until_held(&self, dataset_id: &str) {
        loop {
            let notified = self.waiting_changed.notified();
            if self.waiting.lock().unwrap().contains(dataset_id) {
                return;
            }
            notified.await;
        }
    }

    /// Get all recorded calls.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Dataset ids `process` was called with, in order.
    pub fn processed_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.dataset_id.clone())
            .collect()
    }

    /// Get the number of combine calls.
    pub fn combine_calls(&self) -> usize {
        self.combine_calls.load(Ordering::SeqCst)
    }

    fn default_finding(&self) -> Finding {
        match self.analysis_type {
            AnalysisType::Annotation => Finding::Annotation {
                genes_predicted: 100,
                proteins_annotated: 85,
            },
            AnalysisType::SequenceTyping => Finding::SequenceType {
                sequence_type: "ST-131".to_string(),
                confidence: 1.0,
                alleles: Vec::new(),
            },
            AnalysisType::ResistanceGenes | AnalysisType::VirulenceGenes => {
                Finding::Genes(vec![GeneHit {
                    name: "mock-gene".to_string(),
                    score: 0.9,
                }])
            }
            AnalysisType::Phylogeny => Finding::Taxon { variable_sites: 10 },
        }
    }

    async fn wait_if_held(&self, dataset_id: &str) {
        let gate = self.holds.lock().unwrap().get(dataset_id).cloned();
        if let Some(gate) = gate {
            self.waiting.lock().unwrap().insert(dataset_id.to_string());
            self.waiting_changed.notify_waiters();
            // Closed semaphores are never produced here.
            let _ = gate.acquire().await;
        }
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    async fn process(
        &self,
        dataset: &DatasetRecord,
        params: &TaskParameters,
        output: &OutputArea,
    ) -> Result<ItemOutput, AnalyzerError> {
        self.calls.lock().unwrap().push(RecordedCall {
            dataset_id: dataset.id.clone(),
            parameters: params.clone(),
        });

        self.wait_if_held(&dataset.id).await;

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.fatal_failures.lock().unwrap().get(&dataset.id) {
            return Err(AnalyzerError::Fatal(message.clone()));
        }
        if let Some(message) = self.item_failures.lock().unwrap().get(&dataset.id) {
            return Err(AnalyzerError::Item(message.clone()));
        }

        let finding = self
            .finding
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.default_finding());
        let artifact = output
            .write(&format!("{}.mock", dataset.id), dataset.name.as_bytes())
            .await?;

        Ok(ItemOutput::new(finding).with_artifact(artifact))
    }

    async fn combine(
        &self,
        items: &[ProcessedItem],
        _params: &TaskParameters,
        output: &OutputArea,
    ) -> Result<Option<ItemOutput>, AnalyzerError> {
        self.combine_calls.fetch_add(1, Ordering::SeqCst);
        if self.analysis_type != AnalysisType::Phylogeny {
            return Ok(None);
        }

        let taxa: Vec<String> = items.iter().map(|i| i.dataset.id.clone()).collect();
        let tree_file = output
            .write("phylogeny.nwk", format!("({});", taxa.join(",")))
            .await?;
        Ok(Some(
            ItemOutput::new(Finding::Tree {
                taxa,
                snp_count: 1000,
                tree_file: tree_file.clone(),
            })
            .with_artifact(tree_file),
        ))
    }
}
