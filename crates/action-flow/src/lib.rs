//! Plan translation and execution.
//!
//! [`PlanTranslator`] turns a solved grid path into the ordered edge actions
//! of the navigation graph; [`PlanRunner`] executes such a plan against the
//! live UI, verifying where every step lands.

pub mod errors;
pub mod runner;
pub mod strategies;
pub mod translator;
pub mod types;

pub use errors::FlowError;
pub use runner::PlanRunner;
pub use strategies::RunnerConfig;
pub use translator::PlanTranslator;
pub use types::{Plan, PlanStep, RunOutcome, StepReport};
