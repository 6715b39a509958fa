use clap::Subcommand;

use super::hub::HubArgs;
use super::inspect::InspectArgs;
use super::plan::PlanArgs;
use super::planner::PlannerArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the hub that planner and device agents connect to
    Hub(HubArgs),

    /// Run a planner agent answering navigation requests
    Planner(PlannerArgs),

    /// Compile, solve and translate a route offline
    Plan(PlanArgs),

    /// Summarize a graph snapshot
    Inspect(InspectArgs),
}
