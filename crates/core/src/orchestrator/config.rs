//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the task orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum pipelines running at once (0 = unlimited).
    /// Tasks over the limit stay Pending until a slot frees up.
    #[serde(default)]
    pub max_concurrent_tasks: usize,

    /// Upper bound for a single analyzer call, in seconds.
    /// An overrun fails the task. Unset means no limit.
    #[serde(default)]
    pub item_timeout_secs: Option<u64>,
}

impl OrchestratorConfig {
    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_secs.map(Duration::from_secs)
    }
}
