//! Solved path to action plan.

use grid_compiler::{Cell, CompiledGrid};
use nav_graph::NavGraph;
use tracing::debug;
use wayfinder_core_types::StateId;

use crate::errors::FlowError;
use crate::types::{Plan, PlanStep};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanTranslator;

impl PlanTranslator {
    /// Maps grid cells back to states, drops corridor cells and collapses
    /// repeats, then picks the recorded action for every consecutive pair.
    pub fn translate(
        &self,
        graph: &NavGraph,
        grid: &CompiledGrid,
        path: &[Cell],
    ) -> Result<Plan, FlowError> {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Err(FlowError::EmptyPath);
        };
        if first != grid.start() || last != grid.target() {
            return Err(FlowError::WrongEndpoints {
                start: first,
                end: last,
                expected_start: grid.start(),
                expected_end: grid.target(),
            });
        }
        let plan = self.from_states(graph, grid.states_along(path))?;
        debug!(
            target: "plan-translator",
            cells = path.len(),
            states = plan.states.len(),
            steps = plan.len(),
            "path translated"
        );
        Ok(plan)
    }

    /// Plan for an explicit state sequence. When several edges join a pair,
    /// the most often observed one is used.
    pub fn from_states(&self, graph: &NavGraph, states: Vec<StateId>) -> Result<Plan, FlowError> {
        if let Some(unknown) = states.iter().find(|state| !graph.contains(state)) {
            return Err(FlowError::UnknownState(unknown.clone()));
        }
        let mut steps = Vec::with_capacity(states.len().saturating_sub(1));
        for (index, pair) in states.windows(2).enumerate() {
            let (from, to) = (&pair[0], &pair[1]);
            let edge = graph
                .best_edge(from, to)
                .ok_or_else(|| FlowError::MissingEdge {
                    from: from.clone(),
                    to: to.clone(),
                })?;
            let description = format!("{} -> {}: {}", label(graph, from), label(graph, to), edge.action);
            steps.push(
                PlanStep::new(index, edge.action.clone())
                    .expecting(from.clone(), to.clone())
                    .with_description(description),
            );
        }
        Ok(Plan { states, steps })
    }
}

fn label(graph: &NavGraph, id: &StateId) -> String {
    graph
        .node(id)
        .map(|node| node.label.clone())
        .unwrap_or_else(|| id.short().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_compiler::GridCompiler;
    use nav_graph::StateNode;
    use path_solver::{BfsSolver, Solver};
    use wayfinder_core_types::{Action, Selector};

    fn id(value: &str) -> StateId {
        StateId::new(value)
    }

    fn shop() -> NavGraph {
        let mut graph = NavGraph::new();
        for (name, label) in [("login", "Login"), ("dash", "Dashboard"), ("orders", "Orders")] {
            graph.upsert_node(StateNode::new(id(name), label));
        }
        graph
            .record_edge(&id("login"), &id("dash"), Action::tap(Selector::by_id("login")))
            .unwrap();
        graph
            .record_edge(&id("dash"), &id("orders"), Action::tap(Selector::by_id("nav-orders")))
            .unwrap();
        graph
    }

    #[test]
    fn solved_path_becomes_edge_actions() {
        let graph = shop();
        let grid = GridCompiler::default()
            .compile(&graph, &id("login"), &id("orders"))
            .unwrap();
        let path = BfsSolver.solve(grid.grid(), grid.start(), grid.target()).unwrap();
        let plan = PlanTranslator.translate(&graph, &grid, &path).unwrap();

        assert_eq!(plan.states, vec![id("login"), id("dash"), id("orders")]);
        let actions: Vec<_> = plan.steps.iter().map(|s| s.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Action::tap(Selector::by_id("login")),
                Action::tap(Selector::by_id("nav-orders"))
            ]
        );
        assert_eq!(plan.steps[1].expected, Some(id("orders")));
        assert_eq!(plan.steps[0].description, "Login -> Dashboard: tap #login");
    }

    #[test]
    fn missing_edge_is_a_hard_error() {
        let graph = shop();
        let err = PlanTranslator
            .from_states(&graph, vec![id("login"), id("orders")])
            .unwrap_err();
        assert_eq!(
            err,
            FlowError::MissingEdge {
                from: id("login"),
                to: id("orders")
            }
        );
    }

    #[test]
    fn most_observed_edge_wins() {
        let mut graph = shop();
        let by_text = Action::tap(Selector::by_text("Orders"));
        for _ in 0..2 {
            graph.record_edge(&id("dash"), &id("orders"), by_text.clone()).unwrap();
        }
        let plan = PlanTranslator
            .from_states(&graph, vec![id("dash"), id("orders")])
            .unwrap();
        assert_eq!(plan.steps[0].action, by_text);
    }

    #[test]
    fn degenerate_path_is_an_empty_plan() {
        let graph = shop();
        let grid = GridCompiler::default()
            .compile(&graph, &id("orders"), &id("orders"))
            .unwrap();
        let path = BfsSolver.solve(grid.grid(), grid.start(), grid.target()).unwrap();
        let plan = PlanTranslator.translate(&graph, &grid, &path).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.states, vec![id("orders")]);
    }

    #[test]
    fn foreign_endpoints_are_rejected() {
        let graph = shop();
        let grid = GridCompiler::default()
            .compile(&graph, &id("login"), &id("orders"))
            .unwrap();
        assert!(matches!(
            PlanTranslator.translate(&graph, &grid, &[Cell::new(0, 2)]),
            Err(FlowError::WrongEndpoints { .. })
        ));
        assert_eq!(PlanTranslator.translate(&graph, &grid, &[]), Err(FlowError::EmptyPath));
    }
}
