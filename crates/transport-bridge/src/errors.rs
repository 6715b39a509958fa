use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use thiserror::Error;

use crate::peer::PeerRole;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("request {request_id} timed out after {after_ms}ms")]
    Timeout { request_id: String, after_ms: u64 },
    #[error("{0} peer disconnected")]
    PeerDisconnected(PeerRole),
    #[error("no {0} peer connected")]
    PeerUnavailable(PeerRole),
    #[error("authentication rejected")]
    AuthRejected,
    #[error("peer rejected request: {0}")]
    Rejected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection error: {0}")]
    Connection(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Retrying the whole request once a peer is back can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout { .. }
                | BridgeError::PeerDisconnected(_)
                | BridgeError::PeerUnavailable(_)
                | BridgeError::Connection(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::PeerDisconnected(_) | BridgeError::PeerUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            BridgeError::AuthRejected => StatusCode::UNAUTHORIZED,
            BridgeError::Rejected(_) | BridgeError::Protocol(_) => StatusCode::BAD_GATEWAY,
            BridgeError::Connection(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Timeout { .. } => "transport_timeout",
            BridgeError::PeerDisconnected(_) => "peer_disconnected",
            BridgeError::PeerUnavailable(_) => "peer_unavailable",
            BridgeError::AuthRejected => "auth_rejected",
            BridgeError::Rejected(_) => "rejected",
            BridgeError::Protocol(_) => "protocol",
            BridgeError::Connection(_) => "connection",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}
