//! Navigation graph: discovered UI states, the actions between them, and
//! snapshot persistence.

pub mod errors;
pub mod graph;
pub mod model;
pub mod snapshot;

use std::sync::Arc;

use parking_lot::RwLock;

pub use errors::{GraphError, GraphResult};
pub use graph::{NavGraph, NodeInsert};
pub use model::{ElementRecord, GraphMetadata, StateNode, TransitionEdge};
pub use snapshot::{GraphSnapshot, SNAPSHOT_VERSION};

/// Graph handle shared between the explorer (single writer) and readers.
pub type SharedGraph = Arc<RwLock<NavGraph>>;

pub fn shared(graph: NavGraph) -> SharedGraph {
    Arc::new(RwLock::new(graph))
}
