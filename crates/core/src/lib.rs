pub mod analyzer;
pub mod config;
pub mod dataset;
pub mod events;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod task;
pub mod testing;

pub use analyzer::{Analyzer, AnalyzerError, AnalyzerRegistry, OutputArea, SimulatedAnalyzer};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
};
pub use dataset::{CatalogError, DatasetCatalog, DatasetRecord, NewDataset, SqliteDatasetCatalog};
pub use events::{EventNotifier, TaskEvent};
pub use orchestrator::{
    AdmissionError, OrchestratorConfig, OrchestratorError, OrchestratorStatus, SubmitRequest,
    TaskOrchestrator,
};
pub use pipeline::{ProgressWeights, ResultDetails, ResultSummary};
pub use task::{
    AnalysisTask, AnalysisType, SqliteTaskStore, TaskError, TaskFilter, TaskStats, TaskStatus,
    TaskStore,
};
