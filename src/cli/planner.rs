use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use transport_bridge::{BridgeClient, ClientConfig, PeerRole};

use super::context::CliContext;
use crate::agents::PlannerAgent;

#[derive(Args, Clone)]
pub struct PlannerArgs {
    /// Hub websocket url (overrides bridge.hub_url)
    #[arg(long, value_name = "URL")]
    pub hub: Option<String>,

    /// Identifier sent with register
    #[arg(long)]
    pub device_id: Option<String>,
}

pub async fn cmd_planner(args: PlannerArgs, ctx: &CliContext) -> Result<()> {
    let mut bridge = ctx.config().bridge.clone();
    if let Some(hub) = args.hub {
        bridge.hub_url = hub;
    }
    let mut config = ClientConfig::new(PeerRole::Planner, bridge);
    if let Some(device_id) = args.device_id {
        config = config.with_device(device_id, "planner");
    }
    info!("Planner agent connecting to {}", config.endpoint());

    let client = BridgeClient::new(config, Arc::new(PlannerAgent::default()));
    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Planner stopped by user");
        }
        stop.cancel();
    });
    client.run(&cancel).await;
    Ok(())
}
