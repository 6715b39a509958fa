//! Automated discovery of a UI's state graph.
//!
//! The [`Explorer`] drives an [`ElementExtractor`](perceiver_structural::ElementExtractor)
//! and an [`ActionExecutor`] through a bounded depth-first search and records
//! what it finds into a shared [`nav_graph::NavGraph`].

pub mod config;
pub mod errors;
pub mod events;
pub mod explorer;
pub mod ports;
#[cfg(any(test, feature = "test-support"))]
pub mod surface;

pub use config::ExplorerConfig;
pub use errors::ExplorerError;
pub use events::{ExplorationReport, ExplorerEvent, ExplorerPhase};
pub use explorer::Explorer;
pub use ports::ActionExecutor;
#[cfg(any(test, feature = "test-support"))]
pub use surface::ScriptedSurface;
