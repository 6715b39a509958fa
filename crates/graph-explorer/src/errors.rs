use nav_graph::GraphError;
use perceiver_structural::PerceiverError;
use thiserror::Error;

/// Conditions that stop an exploration run outright. Failed probes are not
/// errors; they are logged, counted and skipped.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("cannot observe the surface: {0}")]
    Perceiver(#[from] PerceiverError),
    #[error("graph rejected an update: {0}")]
    Graph(#[from] GraphError),
}

impl ExplorerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExplorerError::Perceiver(err) => err.is_retryable(),
            ExplorerError::Graph(_) => false,
        }
    }
}
