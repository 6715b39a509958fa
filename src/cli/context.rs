use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use nav_graph::NavGraph;
use tracing::{info, warn};

use super::output::OutputFormat;
use crate::config::WayfinderConfig;

pub struct CliContext {
    config: Arc<WayfinderConfig>,
    config_path: PathBuf,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: WayfinderConfig, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &WayfinderConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// `explicit` or the configured `graph_path`.
    pub fn graph_path(&self, explicit: Option<&PathBuf>) -> Option<PathBuf> {
        explicit.cloned().or_else(|| self.config.graph_path.clone())
    }

    /// Loads the graph snapshot at `path`; fails when none is given.
    pub fn load_graph(&self, explicit: Option<&PathBuf>) -> Result<NavGraph> {
        let path = self
            .graph_path(explicit)
            .context("no graph snapshot given (use --graph or set graph_path)")?;
        let graph = NavGraph::load(&path)
            .with_context(|| format!("failed to load graph snapshot {}", path.display()))?;
        info!(
            "Loaded graph from {}: {} states, {} edges",
            path.display(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Like [`load_graph`](Self::load_graph) but starts empty when the file
    /// does not exist yet.
    pub fn load_graph_or_empty(&self, explicit: Option<&PathBuf>) -> Result<NavGraph> {
        match self.graph_path(explicit) {
            Some(path) if path.exists() => self.load_graph(Some(&path)),
            Some(path) => {
                warn!("Graph snapshot not found, starting empty: {}", path.display());
                Ok(NavGraph::new())
            }
            None => {
                warn!("No graph snapshot configured, starting empty");
                Ok(NavGraph::new())
            }
        }
    }
}
