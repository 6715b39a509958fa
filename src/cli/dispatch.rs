use super::env::CliArgs;
use super::hub::cmd_hub;
use super::inspect::cmd_inspect;
use super::plan::cmd_plan;
use super::planner::cmd_planner;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Hub(args) => cmd_hub(args, ctx).await,
        Commands::Planner(args) => cmd_planner(args, ctx).await,
        Commands::Plan(args) => cmd_plan(args, ctx).await,
        Commands::Inspect(args) => cmd_inspect(args, ctx).await,
    }
}
