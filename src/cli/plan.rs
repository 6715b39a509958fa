use std::path::PathBuf;
use std::sync::Arc;

use action_flow::Plan;
use anyhow::Result;
use clap::Args;
use grid_compiler::Cell;
use serde::Serialize;

use super::context::CliContext;
use crate::navigator::{LocalPlanner, PlanSource, Route, RoutePlanner};

#[derive(Args, Clone)]
pub struct PlanArgs {
    /// Graph snapshot (defaults to graph_path from the config)
    #[arg(long, value_name = "FILE")]
    pub graph: Option<PathBuf>,

    /// Starting state: id, label or unique label fragment
    #[arg(long)]
    pub from: String,

    /// Goal state: id, label or unique label fragment
    #[arg(long)]
    pub to: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport {
    from: String,
    to: String,
    source: PlanSource,
    inference_time_ms: Option<u64>,
    grid: String,
    path: Vec<Cell>,
    plan: Plan,
}

impl PlanReport {
    fn new(from: String, to: String, route: Route) -> Self {
        Self {
            from,
            to,
            source: route.source,
            inference_time_ms: route.inference_time_ms,
            grid: route.compiled.render(Some(route.path.as_slice())),
            path: route.path,
            plan: route.plan,
        }
    }
}

pub async fn cmd_plan(args: PlanArgs, ctx: &CliContext) -> Result<()> {
    let graph = nav_graph::shared(ctx.load_graph(args.graph.as_ref())?);
    let config = ctx.config();
    let routes = RoutePlanner::new(graph, Arc::new(LocalPlanner::default()))
        .with_grid(config.grid.clone())
        .with_graph_fallback(config.navigator.graph_fallback);

    let from = routes.resolve(&args.from)?;
    let to = routes.resolve(&args.to)?;
    let route = routes.route(&from, &to).await?;
    let report = PlanReport::new(args.from, args.to, route);
    ctx.output().print(&report, render)
}

fn render(report: &PlanReport) -> String {
    let mut out = format!("{} -> {}\n\n{}\n", report.from, report.to, report.grid);
    if report.source == PlanSource::GraphFallback {
        out.push_str("(grid path did not match recorded edges; plan taken from the graph)\n");
    }
    if report.plan.is_empty() {
        out.push_str("Already there, nothing to do.\n");
    }
    for step in &report.plan.steps {
        out.push_str(&format!("  {}. {}\n", step.index + 1, step.description));
    }
    if let Some(ms) = report.inference_time_ms {
        out.push_str(&format!("\nsolved in {ms}ms\n"));
    }
    out
}
