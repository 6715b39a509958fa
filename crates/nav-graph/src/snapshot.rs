//! Durable graph snapshots.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{GraphError, GraphResult};
use crate::graph::NavGraph;
use crate::model::{GraphMetadata, StateNode, TransitionEdge};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub nodes: Vec<StateNode>,
    pub edges: Vec<TransitionEdge>,
    pub metadata: GraphMetadata,
}

impl NavGraph {
    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            nodes: self.nodes().cloned().collect(),
            edges: self.edges().cloned().collect(),
            metadata: self.metadata().clone(),
        }
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> GraphResult<Self> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(GraphError::UnsupportedVersion(snapshot.version));
        }
        NavGraph::from_parts(snapshot.nodes, snapshot.edges, snapshot.metadata)
    }

    pub fn to_json(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_snapshot())?)
    }

    pub fn from_json(raw: &str) -> GraphResult<Self> {
        Self::from_snapshot(serde_json::from_str(raw)?)
    }

    /// Writes through a sibling temp file and renames it into place.
    pub fn save(&self, path: &Path) -> GraphResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &self.to_snapshot())?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        info!(
            target: "nav-graph",
            path = %path.display(),
            nodes = self.node_count(),
            edges = self.edge_count(),
            "graph snapshot saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> GraphResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: GraphSnapshot = serde_json::from_reader(reader)?;
        let graph = Self::from_snapshot(snapshot)?;
        info!(
            target: "nav-graph",
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            complete = graph.exploration_complete(),
            "graph snapshot loaded"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wayfinder_core_types::{Action, Bounds, Selector, StateId};

    use crate::model::ElementRecord;

    fn graph() -> NavGraph {
        let mut graph = NavGraph::new();
        graph.upsert_node(
            StateNode::new(StateId::new("fp_login"), "Login").with_elements(vec![ElementRecord {
                id: Some("login".into()),
                role: "button".into(),
                label: Some("Sign in".into()),
                bounds: Bounds::new(0.1, 0.8, 0.8, 0.05),
            }]),
        );
        graph.upsert_node(StateNode::new(StateId::new("fp_dash"), "Dashboard"));
        graph
            .record_edge(
                &StateId::new("fp_login"),
                &StateId::new("fp_dash"),
                Action::tap(Selector::by_id("login")),
            )
            .unwrap();
        graph.set_exploration_complete(true);
        graph
    }

    #[test]
    fn snapshot_uses_wire_field_names() {
        let value: Value = serde_json::from_str(&graph().to_json().unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["nodes"][0]["discoveredAt"].is_string());
        assert_eq!(value["edges"][0]["observedCount"], 1);
        assert_eq!(value["edges"][0]["action"]["type"], "tap");
        assert_eq!(value["metadata"]["explorationComplete"], true);
        assert!(value["metadata"]["createdAt"].is_string());
    }

    #[test]
    fn save_and_load_preserve_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphs").join("shop.json");
        let original = graph();
        original.save(&path).unwrap();

        let loaded = NavGraph::load(&path).unwrap();
        assert_eq!(loaded.to_snapshot(), original.to_snapshot());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn dangling_edges_are_rejected() {
        let mut snapshot = graph().to_snapshot();
        snapshot.nodes.truncate(1);
        let err = NavGraph::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, GraphError::DanglingEdge { .. }));
    }

    #[test]
    fn newer_versions_are_rejected() {
        let mut snapshot = graph().to_snapshot();
        snapshot.version = SNAPSHOT_VERSION + 1;
        assert!(matches!(
            NavGraph::from_snapshot(snapshot),
            Err(GraphError::UnsupportedVersion(2))
        ));
    }
}
