use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::context::CliContext;
use crate::hub_app::HubApp;

#[derive(Args, Clone)]
pub struct HubArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8765")]
    pub bind: SocketAddr,

    /// Graph snapshot to serve and to overwrite on device uploads
    #[arg(long, value_name = "FILE")]
    pub graph: Option<PathBuf>,
}

pub async fn cmd_hub(args: HubArgs, ctx: &CliContext) -> Result<()> {
    let graph = ctx.load_graph_or_empty(args.graph.as_ref())?;
    let mut config = ctx.config().clone();
    config.graph_path = ctx.graph_path(args.graph.as_ref());
    if config.bridge.secret.is_none() {
        info!("No bridge secret configured, agents connect without authentication");
    }

    let app = HubApp::new(&config, nav_graph::shared(graph));
    let shutdown = CancellationToken::new();
    let sync = app.spawn_graph_sync(shutdown.clone());

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind hub on {}", args.bind))?;
    info!("Hub listening on ws://{}", args.bind);
    info!("Agents connect to /ws/planner and /ws/device; POST /navigate drives navigation");

    let stop = shutdown.clone();
    axum::serve(listener, app.router())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => info!("Hub stopped by user"),
                _ = stop.cancelled() => {}
            }
        })
        .await
        .context("hub exited unexpectedly")?;

    shutdown.cancel();
    sync.await.context("graph sync task panicked")?;
    Ok(())
}
