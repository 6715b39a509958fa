use std::collections::HashSet;

use wayfinder_core_types::{Selector, UiElement, UiSnapshot};

use crate::policy::FilterPolicy;

/// Picks the elements worth probing during exploration.
///
/// An element qualifies when it is interactive, carries at least one
/// human-meaningful key (id, label or description) and is not smaller than
/// the configured size on either axis. Elements that would produce the same
/// selector are only returned once.
#[derive(Clone, Debug, Default)]
pub struct ElementFilter {
    policy: FilterPolicy,
}

impl ElementFilter {
    pub fn new(policy: FilterPolicy) -> Self {
        Self { policy }
    }

    pub fn is_meaningful(&self, element: &UiElement) -> bool {
        if !element.is_interactive() {
            return false;
        }
        let has_key = [&element.id, &element.label, &element.description]
            .into_iter()
            .any(|key| key.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false));
        let min = self.policy.min_element_size;
        has_key && element.bounds.width >= min && element.bounds.height >= min
    }

    pub fn meaningful<'a>(&self, snapshot: &'a UiSnapshot) -> Vec<&'a UiElement> {
        let mut seen: HashSet<Selector> = HashSet::new();
        snapshot
            .elements
            .iter()
            .filter(|el| self.is_meaningful(el))
            .filter(|el| seen.insert(Selector::from_element(el)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_core_types::Bounds;

    fn sized(el: UiElement, w: f64, h: f64) -> UiElement {
        el.with_bounds(Bounds::new(0.0, 0.0, w, h))
    }

    #[test]
    fn skips_decorative_and_anonymous_elements() {
        let snapshot = UiSnapshot::new("app", "Main")
            .push(sized(UiElement::new("button").with_id("ok").clickable(), 80.0, 32.0))
            .push(sized(UiElement::new("image").with_id("dot").clickable(), 6.0, 6.0))
            .push(sized(UiElement::new("button").clickable(), 80.0, 32.0))
            .push(sized(UiElement::new("text").with_label("Hello"), 80.0, 32.0));

        let picked = ElementFilter::default().meaningful(&snapshot);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id.as_deref(), Some("ok"));
    }

    #[test]
    fn duplicate_selectors_are_probed_once() {
        let button = sized(
            UiElement::new("button").with_label("More").clickable(),
            40.0,
            40.0,
        );
        let snapshot = UiSnapshot::new("app", "Main")
            .push(button.clone())
            .push(button);
        assert_eq!(ElementFilter::default().meaningful(&snapshot).len(), 1);
    }
}
