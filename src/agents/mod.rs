//! Request handlers for the two agents that dial into the hub.

pub mod device;
pub mod planner;

pub use device::DeviceAgent;
pub use planner::PlannerAgent;
