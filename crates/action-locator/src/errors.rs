//! Error types for locator system

use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// Element not found with any strategy
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Multiple elements match a key that cannot disambiguate
    #[error("Multiple elements match: {0}")]
    AmbiguousMatch(String),

    /// Selector carries no match keys
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

impl LocatorError {
    /// Not-found may resolve itself once the surface settles.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::ElementNotFound(_))
    }
}
