//! Wire messages.
//!
//! Every frame is a JSON object tagged by `type`. Requests and their
//! responses share a `requestId`; `ping`/`pong` and `ui_state` are
//! uncorrelated.

use action_flow::{PlanStep, RunOutcome, StepReport};
use grid_compiler::{Cell, TokenGrid};
use nav_graph::GraphSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wayfinder_core_types::{Action, Fingerprint, Point, ScrollDirection, Selector, StateId};

use crate::errors::BridgeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BridgeMessage {
    Register {
        device_id: String,
        payload: RegisterPayload,
    },
    Registered {
        your_device_id: String,
        server_time: i64,
    },
    NavigationRequest {
        request_id: String,
        payload: NavigationRequestPayload,
    },
    NavigationResult {
        request_id: String,
        payload: NavigationResultPayload,
    },
    ExecutePlan {
        request_id: String,
        payload: ExecutePlanPayload,
    },
    ActionResult {
        request_id: String,
        payload: StepReport,
    },
    PlanComplete {
        request_id: String,
        payload: PlanCompletePayload,
    },
    PlanError {
        request_id: String,
        payload: PlanErrorPayload,
    },
    GraphUpdate {
        request_id: String,
        payload: GraphUpdatePayload,
    },
    GraphAck {
        request_id: String,
        payload: GraphAckPayload,
    },
    UiState {
        payload: UiStatePayload,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        payload: ErrorPayload,
    },
    Ping,
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub device_type: String,
    #[serde(flatten)]
    pub capabilities: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRequestPayload {
    pub current_screen: StateId,
    pub target_screen: StateId,
    pub grid: TokenGrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationResultPayload {
    pub success: bool,
    #[serde(default)]
    pub path: Vec<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutePlanPayload {
    pub steps: Vec<WireStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCompletePayload {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphUpdatePayload {
    pub graph: GraphSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphAckPayload {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiStatePayload {
    pub screen_fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl BridgeMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::Register { .. } => "register",
            BridgeMessage::Registered { .. } => "registered",
            BridgeMessage::NavigationRequest { .. } => "navigation_request",
            BridgeMessage::NavigationResult { .. } => "navigation_result",
            BridgeMessage::ExecutePlan { .. } => "execute_plan",
            BridgeMessage::ActionResult { .. } => "action_result",
            BridgeMessage::PlanComplete { .. } => "plan_complete",
            BridgeMessage::PlanError { .. } => "plan_error",
            BridgeMessage::GraphUpdate { .. } => "graph_update",
            BridgeMessage::GraphAck { .. } => "graph_ack",
            BridgeMessage::UiState { .. } => "ui_state",
            BridgeMessage::Error { .. } => "error",
            BridgeMessage::Ping => "ping",
            BridgeMessage::Pong => "pong",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            BridgeMessage::NavigationRequest { request_id, .. }
            | BridgeMessage::NavigationResult { request_id, .. }
            | BridgeMessage::ExecutePlan { request_id, .. }
            | BridgeMessage::ActionResult { request_id, .. }
            | BridgeMessage::PlanComplete { request_id, .. }
            | BridgeMessage::PlanError { request_id, .. }
            | BridgeMessage::GraphUpdate { request_id, .. }
            | BridgeMessage::GraphAck { request_id, .. } => Some(request_id),
            BridgeMessage::Error { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Requests a peer is expected to answer.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            BridgeMessage::NavigationRequest { .. }
                | BridgeMessage::ExecutePlan { .. }
                | BridgeMessage::GraphUpdate { .. }
        )
    }

    /// Responses that settle a pending request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BridgeMessage::NavigationResult { .. }
                | BridgeMessage::PlanComplete { .. }
                | BridgeMessage::PlanError { .. }
                | BridgeMessage::GraphAck { .. }
                | BridgeMessage::Error { .. }
        )
    }

    pub fn error(request_id: Option<String>, message: impl Into<String>) -> Self {
        BridgeMessage::Error {
            request_id,
            payload: ErrorPayload {
                message: message.into(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(|err| BridgeError::Protocol(err.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(raw).map_err(|err| BridgeError::Protocol(err.to_string()))
    }
}

/// One plan step as carried by `execute_plan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStep {
    /// Position in the plan. Peers may leave it out; the receiver numbers
    /// steps by their order in the list.
    #[serde(default)]
    pub index: usize,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<ScrollDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_screen: Option<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&PlanStep> for WireStep {
    fn from(step: &PlanStep) -> Self {
        let mut wire = WireStep {
            index: step.index,
            action: step.action.kind().to_string(),
            selector: step.action.selector().cloned(),
            value: None,
            direction: None,
            points: None,
            duration_ms: None,
            expected_screen: step.expected.clone(),
            timeout_ms: step.timeout.map(|t| t.as_millis() as u64),
            description: Some(step.description.clone()).filter(|d| !d.is_empty()),
        };
        match &step.action {
            Action::Fill { value, .. } => wire.value = Some(value.clone()),
            Action::Scroll { direction, .. } => wire.direction = Some(*direction),
            Action::Swipe {
                points,
                duration_ms,
            } => {
                wire.points = Some(points.clone());
                wire.duration_ms = Some(*duration_ms);
            }
            Action::Wait { duration_ms } => wire.duration_ms = Some(*duration_ms),
            Action::Tap { .. } | Action::Back => {}
        }
        wire
    }
}

impl TryFrom<WireStep> for PlanStep {
    type Error = BridgeError;

    fn try_from(wire: WireStep) -> Result<Self, Self::Error> {
        let missing = |field: &str| BridgeError::Protocol(format!("{} step without {field}", wire.action));
        let action = match wire.action.as_str() {
            "tap" | "click" => Action::Tap {
                selector: wire.selector.clone().ok_or_else(|| missing("selector"))?,
            },
            "fill" | "type" => Action::Fill {
                selector: wire.selector.clone().ok_or_else(|| missing("selector"))?,
                value: wire.value.clone().ok_or_else(|| missing("value"))?,
            },
            "scroll" => Action::Scroll {
                selector: wire.selector.clone().ok_or_else(|| missing("selector"))?,
                direction: wire.direction.ok_or_else(|| missing("direction"))?,
            },
            "swipe" => Action::Swipe {
                points: wire.points.clone().ok_or_else(|| missing("points"))?,
                duration_ms: wire.duration_ms.unwrap_or(300),
            },
            "back" => Action::Back,
            "wait" => Action::Wait {
                duration_ms: wire.duration_ms.ok_or_else(|| missing("durationMs"))?,
            },
            other => return Err(BridgeError::Protocol(format!("unknown action {other:?}"))),
        };
        let mut step = PlanStep::new(wire.index, action);
        step.expected = wire.expected_screen;
        step.timeout = wire.timeout_ms.map(std::time::Duration::from_millis);
        if let Some(description) = wire.description {
            step.description = description;
        }
        Ok(step)
    }
}
