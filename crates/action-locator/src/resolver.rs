//! Selector resolution over a snapshot

use tracing::debug;
use wayfinder_core_types::{Selector, UiElement};

use crate::errors::LocatorError;
use crate::strategies::{default_chain, Strategy};
use crate::types::{LocatorStrategy, Resolution};

/// Tries each strategy in order and returns the first hit.
pub struct Locator {
    chain: Vec<Box<dyn Strategy>>,
}

impl Default for Locator {
    fn default() -> Self {
        Self {
            chain: default_chain(),
        }
    }
}

impl Locator {
    pub fn with_chain(chain: Vec<Box<dyn Strategy>>) -> Self {
        Self { chain }
    }

    pub fn locate<'a>(
        &self,
        selector: &Selector,
        elements: &'a [UiElement],
    ) -> Result<Resolution<'a>, LocatorError> {
        if selector.is_empty() {
            return Err(LocatorError::InvalidSelector(
                "selector has no match keys".to_string(),
            ));
        }

        for strategy in &self.chain {
            let hits = strategy.find(selector, elements);
            let Some(&index) = hits.first() else {
                continue;
            };
            if strategy.strategy_type() == LocatorStrategy::Role && hits.len() > 1 {
                return Err(LocatorError::AmbiguousMatch(format!(
                    "{} elements with role {:?}",
                    hits.len(),
                    selector.role.as_deref().unwrap_or_default()
                )));
            }
            debug!(
                target: "locator",
                strategy = strategy.name(),
                index,
                %selector,
                "selector resolved"
            );
            return Ok(Resolution {
                index,
                element: &elements[index],
                strategy: strategy.strategy_type(),
            });
        }

        Err(LocatorError::ElementNotFound(selector.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_from_stale_id_to_text() {
        let elements = vec![
            UiElement::new("button").with_id("btn-orders-v2").with_label("Orders"),
        ];
        let selector = Selector {
            id: Some("btn-orders".into()),
            text: Some("Orders".into()),
            ..Default::default()
        };
        let resolved = Locator::default().locate(&selector, &elements).unwrap();
        assert_eq!(resolved.index, 0);
        assert_eq!(resolved.strategy, LocatorStrategy::Text);
    }

    #[test]
    fn ambiguous_role_is_rejected() {
        let elements = vec![UiElement::new("button"), UiElement::new("button")];
        let selector = Selector {
            role: Some("button".into()),
            ..Default::default()
        };
        let err = Locator::default().locate(&selector, &elements).unwrap_err();
        assert!(matches!(err, LocatorError::AmbiguousMatch(_)));
    }

    #[test]
    fn missing_element_is_not_found() {
        let err = Locator::default()
            .locate(&Selector::by_id("nope"), &[])
            .unwrap_err();
        assert_eq!(err, LocatorError::ElementNotFound("#nope".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn empty_selector_is_invalid() {
        let err = Locator::default()
            .locate(&Selector::default(), &[])
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidSelector(_)));
    }
}
