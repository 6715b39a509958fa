use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// States deeper than this are registered but not expanded.
    pub max_depth: usize,
    pub max_nodes: usize,
    pub settle_ms: u64,
    pub max_back_retries: u32,
    /// Minimum width and height of a probe-worthy element.
    pub min_element_size: f64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            max_nodes: 50,
            settle_ms: 800,
            max_back_retries: 3,
            min_element_size: 12.0,
        }
    }
}

impl ExplorerConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
