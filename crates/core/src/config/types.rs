use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::analyzer::{AnalyzerRegistry, SimulatedAnalyzer};
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::ProgressWeights;
use crate::task::AnalysisType;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub analyzers: AnalyzersConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration (tasks and datasets share one file)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pams.db")
}

/// Where task output areas are created
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("results")
}

/// Analyzer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzersConfig {
    /// Per-dataset latency of the simulated analyzers, in milliseconds.
    #[serde(default = "default_simulated_delay")]
    pub simulated_delay_ms: u64,
    /// Progress split used by every pipeline.
    #[serde(default)]
    pub progress: ProgressWeights,
    /// Progress split for specific analysis types.
    #[serde(default)]
    pub progress_overrides: BTreeMap<AnalysisType, ProgressWeights>,
}

impl Default for AnalyzersConfig {
    fn default() -> Self {
        Self {
            simulated_delay_ms: default_simulated_delay(),
            progress: ProgressWeights::default(),
            progress_overrides: BTreeMap::new(),
        }
    }
}

fn default_simulated_delay() -> u64 {
    1000
}

impl AnalyzersConfig {
    /// Progress split for one analysis type.
    pub fn weights_for(&self, analysis_type: AnalysisType) -> ProgressWeights {
        self.progress_overrides
            .get(&analysis_type)
            .copied()
            .unwrap_or(self.progress)
    }

    /// Registry with a simulated analyzer for every type.
    pub fn simulated_registry(&self) -> AnalyzerRegistry {
        let latency = Duration::from_millis(self.simulated_delay_ms);
        let mut registry = AnalyzerRegistry::new().with_default_weights(self.progress);
        for analysis_type in AnalysisType::ALL {
            registry.register_with_weights(
                Arc::new(SimulatedAnalyzer::new(analysis_type).with_latency(latency)),
                self.weights_for(analysis_type),
            );
        }
        registry
    }
}

/// Event channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    1024
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
