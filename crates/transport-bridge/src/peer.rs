use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Answers `navigation_request`.
    Planner,
    /// Holds the live UI; answers `execute_plan`.
    Device,
}

impl PeerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PeerRole::Planner => "planner",
            PeerRole::Device => "device",
        }
    }

    pub fn ws_path(self) -> &'static str {
        match self {
            PeerRole::Planner => "/ws/planner",
            PeerRole::Device => "/ws/device",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical connection. A reconnect of the same role gets a new `conn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId {
    pub role: PeerRole,
    pub conn: u64,
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.role, self.conn)
    }
}
