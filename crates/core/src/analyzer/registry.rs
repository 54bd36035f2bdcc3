//! Analysis type to analyzer mapping.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::ProgressWeights;
use crate::task::AnalysisType;

use super::simulated::SimulatedAnalyzer;
use super::traits::Analyzer;

/// An analyzer together with the progress split its pipeline uses.
#[derive(Clone)]
pub struct RegisteredAnalyzer {
    pub analyzer: Arc<dyn Analyzer>,
    pub weights: ProgressWeights,
}

/// Maps each analysis type to at most one analyzer.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    entries: BTreeMap<AnalysisType, RegisteredAnalyzer>,
    default_weights: ProgressWeights,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weights used by later [`register`](Self::register) calls.
    ///
    /// A split that does not sum to 100 is ignored.
    pub fn with_default_weights(mut self, weights: ProgressWeights) -> Self {
        if weights.is_valid() {
            self.default_weights = weights;
        } else {
            tracing::warn!("Ignoring default progress weights {:?}: must sum to 100", weights);
        }
        self
    }

    /// Registry with a [`SimulatedAnalyzer`] for every analysis type.
    pub fn simulated(latency: Duration) -> Self {
        let mut registry = Self::new();
        for analysis_type in AnalysisType::ALL {
            registry.register(Arc::new(
                SimulatedAnalyzer::new(analysis_type).with_latency(latency),
            ));
        }
        registry
    }

    /// Register an analyzer for its analysis type, replacing any previous one.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> Option<RegisteredAnalyzer> {
        let weights = self.default_weights;
        self.register_with_weights(analyzer, weights)
    }

    /// Register with an explicit progress split.
    ///
    /// A split that does not sum to 100 falls back to the default weights.
    pub fn register_with_weights(
        &mut self,
        analyzer: Arc<dyn Analyzer>,
        weights: ProgressWeights,
    ) -> Option<RegisteredAnalyzer> {
        let weights = if weights.is_valid() {
            weights
        } else {
            tracing::warn!(
                "Progress weights {:?} for {} do not sum to 100, using {:?}",
                weights,
                analyzer.analysis_type(),
                self.default_weights
            );
            self.default_weights
        };
        tracing::debug!(
            "Registered analyzer {} for {}",
            analyzer.name(),
            analyzer.analysis_type()
        );
        self.entries
            .insert(analyzer.analysis_type(), RegisteredAnalyzer { analyzer, weights })
    }

    pub fn get(&self, analysis_type: AnalysisType) -> Option<&RegisteredAnalyzer> {
        self.entries.get(&analysis_type)
    }

    pub fn contains(&self, analysis_type: AnalysisType) -> bool {
        self.entries.contains_key(&analysis_type)
    }

    /// Registered types, in declaration order.
    pub fn types(&self) -> Vec<AnalysisType> {
        self.entries.keys().copied().collect()
    }
}

impl fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(ty, entry)| (ty.as_str(), entry.analyzer.name())),
            )
            .finish()
    }
}
