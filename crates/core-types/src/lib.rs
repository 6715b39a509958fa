//! Shared primitives for the wayfinder navigation core.
//!
//! Everything in here is a plain value object: the element snapshot handed
//! over by a platform backend, the selector/action vocabulary recorded on
//! graph edges, and the fingerprint newtype used as state identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared error type for the small amount of fallible glue in leaf crates.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Stable hash of a UI state's structural shape.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

/// Graph nodes are keyed by their detailed fingerprint.
pub type StateId = Fingerprint;

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Element rectangle, in surface pixels unless stated otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.x + self.width / 2.0).round() as i32,
            y: (self.y + self.height / 2.0).round() as i32,
        }
    }

    /// Projects the rectangle into 0..1 space relative to the viewport.
    pub fn normalized(&self, viewport: Size) -> Bounds {
        if viewport.width <= 0.0 || viewport.height <= 0.0 {
            return *self;
        }
        Bounds {
            x: self.x / viewport.width,
            y: self.y / viewport.height,
            width: self.width / viewport.width,
            height: self.height / viewport.height,
        }
    }
}

/// One interactive (or structural) element as reported by a platform backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiElement {
    /// Stable identifier (resource id, DOM id, test id) when the platform has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Role or widget class; may carry transient state classes.
    pub role: String,
    /// Visible text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Accessible description / content description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default)]
    pub scrollable: bool,
    #[serde(default)]
    pub editable: bool,
    /// Depth in the platform tree, root children are 1.
    #[serde(default)]
    pub depth: u32,
}

impl UiElement {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            depth: 1,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }

    pub fn scrollable(mut self) -> Self {
        self.scrollable = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.clickable || self.scrollable || self.editable
    }
}

/// Output of an element extractor: the element list plus the owning app/domain.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSnapshot {
    /// Root container type (activity class, document type).
    #[serde(default)]
    pub root_role: String,
    /// Package name or origin the surface currently belongs to.
    #[serde(default)]
    pub app_identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Size>,
    pub elements: Vec<UiElement>,
}

impl UiSnapshot {
    pub fn new(app_identity: impl Into<String>, root_role: impl Into<String>) -> Self {
        Self {
            root_role: root_role.into(),
            app_identity: app_identity.into(),
            viewport: None,
            elements: Vec::new(),
        }
    }

    pub fn with_viewport(mut self, width: f64, height: f64) -> Self {
        self.viewport = Some(Size { width, height });
        self
    }

    pub fn push(mut self, element: UiElement) -> Self {
        self.elements.push(element);
        self
    }
}

/// Optional match keys, tried by locators in fixed priority order:
/// id, then visible text, then accessible description, then role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Selector {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Captures every match key an element offers.
    pub fn from_element(element: &UiElement) -> Self {
        fn non_empty(value: &Option<String>) -> Option<String> {
            value
                .as_ref()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        Self {
            id: non_empty(&element.id),
            text: non_empty(&element.label),
            description: non_empty(&element.description),
            role: Some(element.role.clone()).filter(|role| !role.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.text.is_none() && self.description.is_none() && self.role.is_none()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.id {
            write!(f, "#{id}")
        } else if let Some(text) = &self.text {
            write!(f, "text={text:?}")
        } else if let Some(desc) = &self.description {
            write!(f, "desc={desc:?}")
        } else if let Some(role) = &self.role {
            write!(f, "role={role}")
        } else {
            f.write_str("<empty>")
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Immutable value describing one UI interaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Tap {
        selector: Selector,
    },
    Fill {
        selector: Selector,
        value: String,
    },
    Scroll {
        selector: Selector,
        direction: ScrollDirection,
    },
    Swipe {
        points: Vec<Point>,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    Back,
    Wait {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
}

impl Action {
    pub fn tap(selector: Selector) -> Self {
        Action::Tap { selector }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Tap { .. } => "tap",
            Action::Fill { .. } => "fill",
            Action::Scroll { .. } => "scroll",
            Action::Swipe { .. } => "swipe",
            Action::Back => "back",
            Action::Wait { .. } => "wait",
        }
    }

    pub fn selector(&self) -> Option<&Selector> {
        match self {
            Action::Tap { selector }
            | Action::Fill { selector, .. }
            | Action::Scroll { selector, .. } => Some(selector),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tap { selector } => write!(f, "tap {selector}"),
            Action::Fill { selector, value } => write!(f, "fill {selector} <- {value:?}"),
            Action::Scroll {
                selector,
                direction,
            } => write!(f, "scroll {selector} {direction:?}"),
            Action::Swipe {
                points,
                duration_ms,
            } => write!(f, "swipe {} points over {duration_ms}ms", points.len()),
            Action::Back => f.write_str("back"),
            Action::Wait { duration_ms } => write!(f, "wait {duration_ms}ms"),
        }
    }
}

/// Result of a single executor invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
