//! Error handling module
//!
//! Every navigation request ends in a summary or exactly one
//! [`NavigationError`]. Lower-level crate errors are folded in here with
//! enough context (step, states, kind) for the caller to decide on a retry.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use grid_compiler::GridError;
use nav_graph::GraphError;
use path_solver::SolverError;
use serde::Serialize;
use thiserror::Error;
use transport_bridge::BridgeError;
use wayfinder_core_types::{Fingerprint, StateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unreachable,
    ActionFailed,
    StateMismatch,
    TransportTimeout,
    PeerDisconnected,
    AuthRejected,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NavigationError {
    #[error("goal not found: {0}")]
    GoalNotFound(String),

    #[error("current screen is unknown: {0}")]
    UnknownPosition(String),

    #[error("no path from {from} to {to}")]
    Unreachable { from: StateId, to: StateId },

    #[error("step {step_index} failed after retries: {error}")]
    ActionFailed {
        step_index: usize,
        last_successful_step: Option<usize>,
        error: String,
    },

    #[error("step {step_index} landed on {observed} instead of {expected}")]
    StateMismatch {
        step_index: usize,
        expected: StateId,
        observed: Fingerprint,
    },

    #[error("navigation cancelled after {completed} steps")]
    Cancelled { completed: usize },

    #[error(transparent)]
    Transport(#[from] BridgeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl NavigationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NavigationError::GoalNotFound(_) | NavigationError::UnknownPosition(_) => {
                ErrorKind::NotFound
            }
            NavigationError::Unreachable { .. } => ErrorKind::Unreachable,
            NavigationError::ActionFailed { .. } => ErrorKind::ActionFailed,
            NavigationError::StateMismatch { .. } => ErrorKind::StateMismatch,
            NavigationError::Cancelled { .. } => ErrorKind::Cancelled,
            NavigationError::Transport(err) => match err {
                BridgeError::Timeout { .. } => ErrorKind::TransportTimeout,
                BridgeError::AuthRejected => ErrorKind::AuthRejected,
                BridgeError::PeerDisconnected(_)
                | BridgeError::PeerUnavailable(_)
                | BridgeError::Connection(_) => ErrorKind::PeerDisconnected,
                BridgeError::Rejected(_) | BridgeError::Protocol(_) => ErrorKind::Internal,
            },
            NavigationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Retrying the same request unchanged can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            NavigationError::Transport(err) => err.is_retryable(),
            NavigationError::StateMismatch { .. } => true,
            _ => false,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unreachable => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ActionFailed | ErrorKind::StateMismatch => StatusCode::CONFLICT,
            ErrorKind::TransportTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::PeerDisconnected => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::AuthRejected => StatusCode::UNAUTHORIZED,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GraphError> for NavigationError {
    fn from(err: GraphError) -> Self {
        if err.is_not_found() {
            NavigationError::GoalNotFound(err.to_string())
        } else {
            NavigationError::Internal(err.to_string())
        }
    }
}

impl From<GridError> for NavigationError {
    fn from(err: GridError) -> Self {
        match err {
            GridError::UnknownState(state) => {
                NavigationError::UnknownPosition(format!("state {state} is not in the graph"))
            }
            other => NavigationError::Internal(other.to_string()),
        }
    }
}

impl From<SolverError> for NavigationError {
    fn from(err: SolverError) -> Self {
        NavigationError::Internal(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
    retryable: bool,
}

impl IntoResponse for NavigationError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        };
        (self.status_code(), Json(serde_json::json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport_bridge::PeerRole;

    #[test]
    fn transport_errors_map_onto_taxonomy() {
        let timeout = NavigationError::from(BridgeError::Timeout {
            request_id: "r".into(),
            after_ms: 30_000,
        });
        assert_eq!(timeout.kind(), ErrorKind::TransportTimeout);
        assert!(timeout.is_retryable());

        let gone = NavigationError::from(BridgeError::PeerDisconnected(PeerRole::Device));
        assert_eq!(gone.kind(), ErrorKind::PeerDisconnected);
        assert!(gone.is_retryable());

        assert_eq!(
            NavigationError::from(BridgeError::AuthRejected).kind(),
            ErrorKind::AuthRejected
        );
    }

    #[test]
    fn unreachable_is_never_retried() {
        let err = NavigationError::Unreachable {
            from: StateId::new("a"),
            to: StateId::new("b"),
        };
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn unknown_goal_is_not_found() {
        let err = NavigationError::from(GraphError::GoalNotFound("settings".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
