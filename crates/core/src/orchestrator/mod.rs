//! Task orchestrator: admission, execution supervision and cancellation.
//!
//! Every admitted task runs on its own tokio task:
//! - **Admission**: synchronous, inside `submit`; nothing is created on rejection
//! - **Execution**: the type's pipeline, one dataset at a time
//! - **Cancellation**: cooperative, observed between datasets

mod config;
mod handles;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::TaskOrchestrator;
pub use types::{AdmissionError, OrchestratorError, OrchestratorStatus, SubmitRequest};
