//! Transport bridge
//!
//! Request/response correlation over persistent websocket links. The hub
//! accepts one planner and one device connection; agents connect to it with
//! [`BridgeClient`], which keeps the link alive and reconnects on loss.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod client;
pub mod errors;
pub mod fsm;
pub mod hub;
pub mod keepalive;
pub mod messages;
pub mod peer;
pub mod pending;

pub use client::{BridgeClient, BridgeLink, ClientConfig, RequestHandler};
pub use errors::{BridgeError, BridgeResult};
pub use fsm::{ConnectionEvent, ConnectionFsm, ConnectionState, Effect};
pub use hub::{authenticate, Hub, HubEvent, PeerStatus, PlanReply, AUTH_HEADER};
pub use keepalive::{Beat, KeepAlive};
pub use messages::{BridgeMessage, WireStep};
pub use peer::{PeerId, PeerRole};
pub use pending::{Dispatch, PendingTable};

/// Timings and credentials shared by hub and clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub request_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Shared secret expected in the auth header; `None` disables the check.
    pub secret: Option<String>,
    /// Hub address agents connect to.
    pub hub_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            ping_interval_ms: 25_000,
            reconnect_delay_ms: 5_000,
            secret: None,
            hub_url: "ws://127.0.0.1:8765".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
