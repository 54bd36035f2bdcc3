//! Progress weighting for pipeline phases.

use serde::{Deserialize, Serialize};

/// How the 0..=100 progress range is split between setup, the per-dataset
/// loop, and finalization. The three parts must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressWeights {
    #[serde(default = "default_setup")]
    pub setup: u8,
    #[serde(default = "default_items")]
    pub items: u8,
    #[serde(default = "default_finalize")]
    pub finalize: u8,
}

fn default_setup() -> u8 {
    10
}

fn default_items() -> u8 {
    80
}

fn default_finalize() -> u8 {
    10
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self {
            setup: default_setup(),
            items: default_items(),
            finalize: default_finalize(),
        }
    }
}

impl ProgressWeights {
    pub fn new(setup: u8, items: u8, finalize: u8) -> Self {
        Self {
            setup,
            items,
            finalize,
        }
    }

    pub fn is_valid(&self) -> bool {
        u16::from(self.setup) + u16::from(self.items) + u16::from(self.finalize) == 100
    }

    /// Progress once setup is done.
    pub fn after_setup(&self) -> u8 {
        self.setup.min(100)
    }

    /// Progress after `completed` of `total` datasets were processed.
    ///
    /// Equals `setup + round(completed / total * items)`, capped at 100.
    pub fn after_items(&self, completed: usize, total: usize) -> u8 {
        if total == 0 {
            return self.setup.saturating_add(self.items).min(100);
        }
        let completed = completed.min(total);
        let span = (completed as f64 / total as f64 * f64::from(self.items)).round() as u8;
        self.setup.saturating_add(span.min(self.items)).min(100)
    }
}
