use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PerceiverError {
    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PerceiverError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PerceiverError::SurfaceUnavailable(_))
    }
}
