//! Configuration management
//!
//! One YAML document with a section per component. Every field has a
//! default, so an empty or partial file is valid.

use std::env;
use std::path::PathBuf;

use action_flow::RunnerConfig;
use graph_explorer::ExplorerConfig;
use grid_compiler::GridConfig;
use serde::{Deserialize, Serialize};
use tracing::info;
use transport_bridge::BridgeConfig;

/// Shared secret for hub connections.
pub const BRIDGE_SECRET_ENV: &str = "WAYFINDER_BRIDGE_SECRET";
/// Hub address agents connect to.
pub const HUB_URL_ENV: &str = "WAYFINDER_HUB_URL";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WayfinderConfig {
    pub explorer: ExplorerConfig,
    pub grid: GridConfig,
    pub runner: RunnerConfig,
    pub bridge: BridgeConfig,
    pub navigator: NavigatorConfig,
    /// Graph snapshot loaded by the hub and written after exploration.
    pub graph_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Fresh compile/solve/run rounds allowed after a state mismatch.
    pub max_replans: u32,
    /// Fall back to a direct graph search when a grid path cannot be
    /// translated into recorded edges.
    pub graph_fallback: bool,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            max_replans: 2,
            graph_fallback: false,
        }
    }
}

impl WayfinderConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = env::var(BRIDGE_SECRET_ENV) {
            if !secret.is_empty() {
                info!("Using bridge secret from {BRIDGE_SECRET_ENV}");
                self.bridge.secret = Some(secret);
            }
        }
        if let Ok(url) = env::var(HUB_URL_ENV) {
            if !url.is_empty() {
                info!("Using hub url from {HUB_URL_ENV}: {url}");
                self.bridge.hub_url = url;
            }
        }
    }
}
