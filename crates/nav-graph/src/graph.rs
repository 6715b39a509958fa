//! In-memory navigation graph.
//!
//! Nodes keep insertion order so that layouts derived from the graph are
//! reproducible. Edges are unique per `(from, to, action)`; re-observing the
//! same transition only bumps its counter.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use tracing::debug;
use wayfinder_core_types::{Action, StateId};

use crate::errors::{GraphError, GraphResult};
use crate::model::{ElementRecord, GraphMetadata, StateNode, TransitionEdge};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeInsert {
    Inserted,
    Refreshed,
}

#[derive(Clone, Debug, Default)]
pub struct NavGraph {
    nodes: Vec<StateNode>,
    index: HashMap<StateId, usize>,
    edges: Vec<TransitionEdge>,
    edge_index: HashMap<(StateId, StateId, Action), usize>,
    metadata: GraphMetadata,
}

impl NavGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> impl Iterator<Item = &StateNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &TransitionEdge> {
        self.edges.iter()
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn contains(&self, id: &StateId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &StateId) -> Option<&StateNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    /// Registers a node, or refreshes the element snapshot of a known one.
    /// Label and discovery time of an existing node are kept.
    pub fn upsert_node(&mut self, node: StateNode) -> NodeInsert {
        if let Some(&idx) = self.index.get(&node.id) {
            self.nodes[idx].elements = node.elements;
            self.touch();
            return NodeInsert::Refreshed;
        }
        debug!(target: "nav-graph", state = %node.id.short(), label = %node.label, "state registered");
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        self.touch();
        NodeInsert::Inserted
    }

    pub fn refresh_elements(
        &mut self,
        id: &StateId,
        elements: Vec<ElementRecord>,
    ) -> GraphResult<()> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| GraphError::UnknownState(id.clone()))?;
        self.nodes[idx].elements = elements;
        self.touch();
        Ok(())
    }

    /// Records an observed transition and returns its updated counter.
    pub fn record_edge(&mut self, from: &StateId, to: &StateId, action: Action) -> GraphResult<u32> {
        for endpoint in [from, to] {
            if !self.contains(endpoint) {
                return Err(GraphError::UnknownState(endpoint.clone()));
            }
        }
        let key = (from.clone(), to.clone(), action);
        let count = match self.edge_index.get(&key) {
            Some(&idx) => {
                let edge = &mut self.edges[idx];
                edge.observed_count = edge.observed_count.saturating_add(1);
                edge.observed_count
            }
            None => {
                let (from, to, action) = key.clone();
                debug!(target: "nav-graph", from = %from.short(), to = %to.short(), %action, "edge recorded");
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(TransitionEdge {
                    from,
                    to,
                    action,
                    observed_count: 1,
                });
                1
            }
        };
        self.touch();
        Ok(count)
    }

    pub fn edges_from<'a>(&'a self, from: &'a StateId) -> impl Iterator<Item = &'a TransitionEdge> {
        self.edges.iter().filter(move |edge| &edge.from == from)
    }

    pub fn edges_between<'a>(
        &'a self,
        from: &'a StateId,
        to: &'a StateId,
    ) -> impl Iterator<Item = &'a TransitionEdge> {
        self.edges
            .iter()
            .filter(move |edge| &edge.from == from && &edge.to == to)
    }

    /// The most often observed edge between two states; earliest wins a tie.
    pub fn best_edge(&self, from: &StateId, to: &StateId) -> Option<&TransitionEdge> {
        self.edges
            .iter()
            .filter(|edge| &edge.from == from && &edge.to == to)
            .fold(None, |best: Option<&TransitionEdge>, edge| match best {
                Some(current) if current.observed_count >= edge.observed_count => Some(current),
                _ => Some(edge),
            })
    }

    /// Distinct successor states in edge order.
    pub fn neighbors(&self, id: &StateId) -> Vec<&StateId> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|edge| &edge.from == id)
            .map(|edge| &edge.to)
            .filter(|to| seen.insert(*to))
            .collect()
    }

    pub fn find<P>(&self, predicate: P) -> Vec<&StateNode>
    where
        P: Fn(&StateNode) -> bool,
    {
        self.nodes.iter().filter(|node| predicate(node)).collect()
    }

    /// Resolves a goal to a node: exact id, then case-insensitive label, then
    /// a unique label containing the goal.
    pub fn resolve_goal(&self, goal: &str) -> GraphResult<&StateNode> {
        let wanted = goal.trim();
        if wanted.is_empty() {
            return Err(GraphError::GoalNotFound(goal.to_string()));
        }
        if let Some(node) = self.node(&StateId::new(wanted)) {
            return Ok(node);
        }
        let lowered = wanted.to_lowercase();
        if let Some(node) = self
            .nodes
            .iter()
            .find(|node| node.label.trim().to_lowercase() == lowered)
        {
            return Ok(node);
        }
        let partial = self.find(|node| node.label.to_lowercase().contains(&lowered));
        match partial.as_slice() {
            [] => Err(GraphError::GoalNotFound(goal.to_string())),
            [node] => Ok(*node),
            many => Err(GraphError::AmbiguousGoal {
                goal: goal.to_string(),
                candidates: many.iter().map(|node| node.label.clone()).collect(),
            }),
        }
    }

    /// Shortest state sequence following recorded edges.
    pub fn state_path(&self, from: &StateId, to: &StateId) -> GraphResult<Option<Vec<StateId>>> {
        for endpoint in [from, to] {
            if !self.contains(endpoint) {
                return Err(GraphError::UnknownState(endpoint.clone()));
            }
        }
        let mut parents: HashMap<&StateId, &StateId> = HashMap::new();
        let mut visited: HashSet<&StateId> = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(parent) = parents.get(cursor) {
                    path.push((*parent).clone());
                    cursor = parent;
                }
                path.reverse();
                return Ok(Some(path));
            }
            for next in self.neighbors(current) {
                if visited.insert(next) {
                    parents.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        Ok(None)
    }

    pub fn exploration_complete(&self) -> bool {
        self.metadata.exploration_complete
    }

    pub fn set_exploration_complete(&mut self, complete: bool) {
        self.metadata.exploration_complete = complete;
        self.touch();
    }

    fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }

    pub(crate) fn from_parts(
        nodes: Vec<StateNode>,
        edges: Vec<TransitionEdge>,
        metadata: GraphMetadata,
    ) -> GraphResult<Self> {
        let mut graph = NavGraph {
            metadata,
            ..NavGraph::default()
        };
        for node in nodes {
            if graph.contains(&node.id) {
                return Err(GraphError::DuplicateState(node.id));
            }
            graph.index.insert(node.id.clone(), graph.nodes.len());
            graph.nodes.push(node);
        }
        for edge in edges {
            if !graph.contains(&edge.from) || !graph.contains(&edge.to) {
                return Err(GraphError::DanglingEdge {
                    from: edge.from,
                    to: edge.to,
                });
            }
            let key = (edge.from.clone(), edge.to.clone(), edge.action.clone());
            match graph.edge_index.get(&key) {
                Some(&idx) => {
                    let existing = &mut graph.edges[idx];
                    existing.observed_count =
                        existing.observed_count.saturating_add(edge.observed_count);
                }
                None => {
                    graph.edge_index.insert(key, graph.edges.len());
                    graph.edges.push(edge);
                }
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_core_types::Selector;

    fn id(value: &str) -> StateId {
        StateId::new(value)
    }

    fn sample() -> NavGraph {
        let mut graph = NavGraph::new();
        graph.upsert_node(StateNode::new(id("login"), "Login"));
        graph.upsert_node(StateNode::new(id("dash"), "Dashboard"));
        graph.upsert_node(StateNode::new(id("orders"), "Orders"));
        graph.upsert_node(StateNode::new(id("order-detail"), "Order detail"));
        graph
            .record_edge(&id("login"), &id("dash"), Action::tap(Selector::by_id("login")))
            .unwrap();
        graph
            .record_edge(&id("dash"), &id("orders"), Action::tap(Selector::by_id("nav-orders")))
            .unwrap();
        graph
    }

    #[test]
    fn repeated_edges_increment_counter() {
        let mut graph = sample();
        let count = graph
            .record_edge(&id("login"), &id("dash"), Action::tap(Selector::by_id("login")))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn edges_require_known_endpoints() {
        let mut graph = sample();
        let err = graph
            .record_edge(&id("login"), &id("ghost"), Action::Back)
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownState(ref s) if s.as_str() == "ghost"));
    }

    #[test]
    fn upsert_keeps_identity_and_refreshes_elements() {
        let mut graph = sample();
        let refreshed = StateNode::new(id("login"), "Renamed").with_elements(vec![ElementRecord {
            id: Some("user".into()),
            role: "textbox".into(),
            label: None,
            bounds: Default::default(),
        }]);
        assert_eq!(graph.upsert_node(refreshed), NodeInsert::Refreshed);
        let node = graph.node(&id("login")).unwrap();
        assert_eq!(node.label, "Login");
        assert_eq!(node.elements.len(), 1);
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn best_edge_prefers_most_observed() {
        let mut graph = sample();
        let by_text = Action::tap(Selector::by_text("Orders"));
        graph.record_edge(&id("dash"), &id("orders"), by_text.clone()).unwrap();
        graph.record_edge(&id("dash"), &id("orders"), by_text.clone()).unwrap();
        let best = graph.best_edge(&id("dash"), &id("orders")).unwrap();
        assert_eq!(best.action, by_text);
        assert!(graph.best_edge(&id("orders"), &id("dash")).is_none());
    }

    #[test]
    fn goal_resolution_order() {
        let graph = sample();
        assert_eq!(graph.resolve_goal("orders").unwrap().id, id("orders"));
        assert_eq!(graph.resolve_goal("DASH").unwrap().id, id("dash"));
        assert_eq!(graph.resolve_goal("detail").unwrap().id, id("order-detail"));
        assert!(matches!(
            graph.resolve_goal("order"),
            Err(GraphError::AmbiguousGoal { .. })
        ));
        let err = graph.resolve_goal("settings").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn state_path_follows_edges() {
        let graph = sample();
        let path = graph.state_path(&id("login"), &id("orders")).unwrap().unwrap();
        assert_eq!(path, vec![id("login"), id("dash"), id("orders")]);
        assert_eq!(graph.state_path(&id("orders"), &id("login")).unwrap(), None);
    }
}
