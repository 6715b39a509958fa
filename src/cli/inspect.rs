use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use nav_graph::NavGraph;
use serde::Serialize;
use wayfinder_core_types::StateId;

use super::context::CliContext;

#[derive(Args, Clone)]
pub struct InspectArgs {
    /// Graph snapshot (defaults to graph_path from the config)
    #[arg(long, value_name = "FILE")]
    pub graph: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphReport {
    nodes: usize,
    edges: usize,
    exploration_complete: bool,
    states: Vec<StateLine>,
    transitions: Vec<EdgeLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateLine {
    id: String,
    label: String,
    elements: usize,
    outgoing: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EdgeLine {
    from: String,
    to: String,
    action: String,
    observed_count: u32,
}

pub async fn cmd_inspect(args: InspectArgs, ctx: &CliContext) -> Result<()> {
    let graph = ctx.load_graph(args.graph.as_ref())?;
    ctx.output().print(&report(&graph), render)
}

fn report(graph: &NavGraph) -> GraphReport {
    let label = |id: &StateId| graph.node(id).map(|node| node.label.clone()).unwrap_or_default();
    GraphReport {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        exploration_complete: graph.exploration_complete(),
        states: graph
            .nodes()
            .map(|node| StateLine {
                id: node.id.to_string(),
                label: node.label.clone(),
                elements: node.elements.len(),
                outgoing: graph.edges_from(&node.id).count(),
            })
            .collect(),
        transitions: graph
            .edges()
            .map(|edge| EdgeLine {
                from: label(&edge.from),
                to: label(&edge.to),
                action: edge.action.to_string(),
                observed_count: edge.observed_count,
            })
            .collect(),
    }
}

fn render(report: &GraphReport) -> String {
    let mut out = format!(
        "{} states, {} edges (exploration {})\n",
        report.nodes,
        report.edges,
        if report.exploration_complete { "complete" } else { "incomplete" }
    );
    out.push_str("\nStates:\n");
    for state in &report.states {
        out.push_str(&format!(
            "  {:<24} {}  elements={} outgoing={}\n",
            state.label, state.id, state.elements, state.outgoing
        ));
    }
    out.push_str("\nTransitions:\n");
    for edge in &report.transitions {
        out.push_str(&format!(
            "  {} -> {}  {} (seen {}x)\n",
            edge.from, edge.to, edge.action, edge.observed_count
        ));
    }
    out
}
