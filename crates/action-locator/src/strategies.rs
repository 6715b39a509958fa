//! Element matching strategies
//!
//! Four strategies in fallback order:
//! 1. Id - exact stable identifier
//! 2. Text - visible label, exact then containment
//! 3. Description - accessible description, exact then containment
//! 4. Role - widget role/class, must be unambiguous
//!
//! Every strategy is a pure function over the element list and returns the
//! indices of matching elements in document order.

use wayfinder_core_types::{Selector, UiElement};

use crate::types::LocatorStrategy;

/// Strategy trait for element matching
pub trait Strategy: Send + Sync {
    /// Indices of elements this strategy matches; empty when the selector
    /// lacks the key this strategy reads.
    fn find(&self, selector: &Selector, elements: &[UiElement]) -> Vec<usize>;

    /// Get strategy type
    fn strategy_type(&self) -> LocatorStrategy;

    /// Get strategy name
    fn name(&self) -> &'static str {
        self.strategy_type().name()
    }
}

pub struct IdStrategy;

impl Strategy for IdStrategy {
    fn find(&self, selector: &Selector, elements: &[UiElement]) -> Vec<usize> {
        let Some(wanted) = selector.id.as_deref().map(str::trim) else {
            return Vec::new();
        };
        positions(elements, |el| el.id.as_deref().map(str::trim) == Some(wanted))
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Id
    }
}

pub struct TextStrategy;

impl Strategy for TextStrategy {
    fn find(&self, selector: &Selector, elements: &[UiElement]) -> Vec<usize> {
        match selector.text.as_deref() {
            Some(wanted) => text_match(wanted, elements, |el| el.label.as_deref()),
            None => Vec::new(),
        }
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Text
    }
}

pub struct DescriptionStrategy;

impl Strategy for DescriptionStrategy {
    fn find(&self, selector: &Selector, elements: &[UiElement]) -> Vec<usize> {
        match selector.description.as_deref() {
            Some(wanted) => text_match(wanted, elements, |el| el.description.as_deref()),
            None => Vec::new(),
        }
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Description
    }
}

pub struct RoleStrategy;

impl Strategy for RoleStrategy {
    fn find(&self, selector: &Selector, elements: &[UiElement]) -> Vec<usize> {
        let Some(wanted) = selector.role.as_deref().map(normalize) else {
            return Vec::new();
        };
        positions(elements, |el| normalize(&el.role) == wanted)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Role
    }
}

/// Builds the default strategy chain.
pub fn default_chain() -> Vec<Box<dyn Strategy>> {
    LocatorStrategy::fallback_chain()
        .into_iter()
        .map(|strategy| -> Box<dyn Strategy> {
            match strategy {
                LocatorStrategy::Id => Box::new(IdStrategy),
                LocatorStrategy::Text => Box::new(TextStrategy),
                LocatorStrategy::Description => Box::new(DescriptionStrategy),
                LocatorStrategy::Role => Box::new(RoleStrategy),
            }
        })
        .collect()
}

fn positions<F>(elements: &[UiElement], pred: F) -> Vec<usize>
where
    F: Fn(&UiElement) -> bool,
{
    elements
        .iter()
        .enumerate()
        .filter(|(_, el)| pred(el))
        .map(|(idx, _)| idx)
        .collect()
}

fn text_match<F>(wanted: &str, elements: &[UiElement], field: F) -> Vec<usize>
where
    F: Fn(&UiElement) -> Option<&str>,
{
    let wanted = normalize(wanted);
    if wanted.is_empty() {
        return Vec::new();
    }
    let exact = positions(elements, |el| {
        field(el).map(normalize).as_deref() == Some(wanted.as_str())
    });
    if !exact.is_empty() {
        return exact;
    }
    positions(elements, |el| {
        field(el)
            .map(normalize)
            .map(|text| text.contains(&wanted))
            .unwrap_or(false)
    })
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
