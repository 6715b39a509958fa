use serde::{Deserialize, Serialize};

/// Knobs for canonicalising an element list before hashing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FingerprintPolicy {
    /// Elements deeper than this are ignored.
    pub max_depth: u32,
    /// Class/role tokens describing transient visual state.
    pub volatile_tokens: Vec<String>,
    /// Roles whose text is part of the structure (headings, tab headers).
    pub title_roles: Vec<String>,
    /// Roles of repeated data rows. Rows and their subtrees stay out of the
    /// fingerprint, as do id-less direct children of a scrollable container.
    pub list_item_roles: Vec<String>,
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        Self {
            max_depth: 12,
            volatile_tokens: [
                "hover", "hovered", "focus", "focused", "active", "selected", "pressed",
                "highlighted", "checked",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            title_roles: [
                "heading", "title", "header", "tab", "toolbar", "banner", "h1", "h2", "h3",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            list_item_roles: ["listitem", "row", "cell", "gridcell", "item", "treeitem"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Minimum width and height, in surface pixels, for an element to be probed.
    pub min_element_size: f64,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            min_element_size: 12.0,
        }
    }
}
