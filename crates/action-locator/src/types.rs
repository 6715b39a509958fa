//! Core types for locator system

use serde::{Deserialize, Serialize};
use wayfinder_core_types::UiElement;

/// Locator strategy enumeration, one per selector key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocatorStrategy {
    /// Stable identifier
    Id,

    /// Visible text
    Text,

    /// Accessible description
    Description,

    /// Role / widget class
    Role,
}

impl LocatorStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::Text => "text",
            LocatorStrategy::Description => "description",
            LocatorStrategy::Role => "role",
        }
    }

    /// Get all strategies in fallback order
    pub fn fallback_chain() -> Vec<LocatorStrategy> {
        vec![
            LocatorStrategy::Id,
            LocatorStrategy::Text,
            LocatorStrategy::Description,
            LocatorStrategy::Role,
        ]
    }
}

/// Element resolution result
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    /// Position of the element in the snapshot
    pub index: usize,

    /// The matched element
    pub element: &'a UiElement,

    /// Strategy that produced the match
    pub strategy: LocatorStrategy,
}
