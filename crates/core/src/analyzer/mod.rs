//! Analyzer plug-ins: the per-dataset work units behind each analysis type.

mod error;
mod output;
mod registry;
mod simulated;
mod traits;
mod types;

pub use error::AnalyzerError;
pub use output::OutputArea;
pub use registry::{AnalyzerRegistry, RegisteredAnalyzer};
pub use simulated::SimulatedAnalyzer;
pub use traits::Analyzer;
pub use types::{AlleleCall, Finding, GeneHit, ItemOutput, ProcessedItem};
