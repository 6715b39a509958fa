//! Wayfinder library
//!
//! Explores a UI into a state graph and navigates it: a goal becomes a
//! compiled grid, the grid a solved path, the path a plan of recorded
//! actions. Exposes the orchestration glue for the binary and for
//! integration tests.

pub mod agents;
pub mod cli;
pub mod config;
pub mod errors;
pub mod hub_app;
pub mod navigator;

pub use agents::{DeviceAgent, PlannerAgent};
pub use config::{NavigatorConfig, WayfinderConfig};
pub use errors::{ErrorKind, NavigationError};
pub use hub_app::HubApp;
pub use navigator::{
    HubExecutor, HubPlanner, LocalExecutor, LocalPlanner, NavigationSummary, Navigator,
    PathPlanner, PlanExecutor, PlanSource, Route, RoutePlanner, SolvedPath,
};
