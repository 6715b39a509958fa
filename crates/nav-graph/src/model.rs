use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wayfinder_core_types::{Action, Bounds, Size, StateId, UiElement};

/// Element as remembered on a node: identity keys and normalized bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub bounds: Bounds,
}

impl ElementRecord {
    pub fn from_element(element: &UiElement, viewport: Option<Size>) -> Self {
        Self {
            id: element.id.clone(),
            role: element.role.clone(),
            label: element.label.clone().or_else(|| element.description.clone()),
            bounds: viewport
                .map(|vp| element.bounds.normalized(vp))
                .unwrap_or(element.bounds),
        }
    }
}

/// One discovered, distinct UI state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateNode {
    pub id: StateId,
    pub label: String,
    #[serde(default)]
    pub elements: Vec<ElementRecord>,
    pub discovered_at: DateTime<Utc>,
}

impl StateNode {
    pub fn new(id: StateId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            elements: Vec::new(),
            discovered_at: Utc::now(),
        }
    }

    pub fn with_elements(mut self, elements: Vec<ElementRecord>) -> Self {
        self.elements = elements;
        self
    }
}

/// Directed transition caused by one action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEdge {
    pub from: StateId,
    pub to: StateId,
    pub action: Action,
    pub observed_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exploration_complete: bool,
}

impl Default for GraphMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            exploration_complete: false,
        }
    }
}
