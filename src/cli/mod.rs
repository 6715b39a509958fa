pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod hub;
pub mod inspect;
pub mod output;
pub mod plan;
pub mod planner;
pub mod runtime;

pub use app::run;
