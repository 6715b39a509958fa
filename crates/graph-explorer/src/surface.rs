//! In-memory UI double for tests.
//!
//! Screens are named snapshots; links say which element (matched by id or
//! label) moves from one screen to another. Taps are resolved through the
//! same ranked locator a real backend would use, and back pops a history
//! stack like a platform back button.

use std::collections::{HashMap, VecDeque};

use action_locator::Locator;
use async_trait::async_trait;
use parking_lot::Mutex;
use perceiver_structural::{ElementExtractor, PerceiverError};
use wayfinder_core_types::{Action, ActionOutcome, UiSnapshot};

use crate::ports::ActionExecutor;

#[derive(Default)]
struct SurfaceState {
    screens: HashMap<String, UiSnapshot>,
    links: HashMap<(String, String), String>,
    current: String,
    history: Vec<String>,
    /// Screens where back does nothing.
    swallow_back: Vec<String>,
    performed: Vec<Action>,
    failures: VecDeque<String>,
}

pub struct ScriptedSurface {
    state: Mutex<SurfaceState>,
    locator: Locator,
}

impl ScriptedSurface {
    pub fn new(start: &str) -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                current: start.to_string(),
                ..SurfaceState::default()
            }),
            locator: Locator::default(),
        }
    }

    pub fn screen(self, name: &str, snapshot: UiSnapshot) -> Self {
        self.state.lock().screens.insert(name.to_string(), snapshot);
        self
    }

    /// Tapping the element whose id or label is `key` on `from` opens `to`.
    pub fn link(self, from: &str, key: &str, to: &str) -> Self {
        self.state
            .lock()
            .links
            .insert((from.to_string(), key.to_string()), to.to_string());
        self
    }

    /// Back on `screen` leaves the surface where it is.
    pub fn swallow_back(self, screen: &str) -> Self {
        self.state.lock().swallow_back.push(screen.to_string());
        self
    }

    pub fn current(&self) -> String {
        self.state.lock().current.clone()
    }

    /// Moves the surface without an action, as an external event would.
    pub fn jump(&self, screen: &str) {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut state.current, screen.to_string());
        state.history.push(previous);
    }

    /// Makes the next `perform` fail with `reason`.
    pub fn fail_next(&self, reason: &str) {
        self.state.lock().failures.push_back(reason.to_string());
    }

    pub fn performed(&self) -> Vec<Action> {
        self.state.lock().performed.clone()
    }

    fn apply(&self, state: &mut SurfaceState, action: &Action) -> ActionOutcome {
        let Some(selector) = action.selector() else {
            if matches!(action, Action::Back) && !state.swallow_back.contains(&state.current) {
                if let Some(previous) = state.history.pop() {
                    state.current = previous;
                }
            }
            return ActionOutcome::ok();
        };
        let Some(screen) = state.screens.get(&state.current) else {
            return ActionOutcome::failed(format!("no screen named {}", state.current));
        };
        let element = match self.locator.locate(selector, &screen.elements) {
            Ok(resolution) => resolution.element,
            Err(err) => return ActionOutcome::failed(err.to_string()),
        };
        if !matches!(action, Action::Tap { .. }) {
            return ActionOutcome::ok();
        }
        let target = [element.id.as_deref(), element.label.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|key| state.links.get(&(state.current.clone(), key.to_string())))
            .cloned();
        if let Some(target) = target {
            let previous = std::mem::replace(&mut state.current, target);
            state.history.push(previous);
        }
        ActionOutcome::ok()
    }
}

#[async_trait]
impl ElementExtractor for ScriptedSurface {
    async fn snapshot(&self) -> Result<UiSnapshot, PerceiverError> {
        let state = self.state.lock();
        state
            .screens
            .get(&state.current)
            .cloned()
            .ok_or_else(|| PerceiverError::SurfaceUnavailable(format!("no screen named {}", state.current)))
    }
}

#[async_trait]
impl ActionExecutor for ScriptedSurface {
    async fn perform(&self, action: &Action) -> ActionOutcome {
        let mut state = self.state.lock();
        state.performed.push(action.clone());
        if let Some(reason) = state.failures.pop_front() {
            return ActionOutcome::failed(reason);
        }
        self.apply(&mut state, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_core_types::{Selector, UiElement};

    fn surface() -> ScriptedSurface {
        ScriptedSurface::new("a")
            .screen("a", UiSnapshot::new("app", "A").push(UiElement::new("button").with_id("go").clickable()))
            .screen("b", UiSnapshot::new("app", "B"))
            .link("a", "go", "b")
    }

    #[tokio::test]
    async fn tap_follows_links_and_back_returns() {
        let surface = surface();
        assert!(surface.perform(&Action::tap(Selector::by_id("go"))).await.success);
        assert_eq!(surface.current(), "b");
        assert_eq!(surface.snapshot().await.unwrap().root_role, "B");
        assert!(surface.perform(&Action::Back).await.success);
        assert_eq!(surface.current(), "a");
    }

    #[tokio::test]
    async fn missing_element_fails() {
        let surface = surface();
        let outcome = surface.perform(&Action::tap(Selector::by_id("nope"))).await;
        assert!(!outcome.success);
        assert_eq!(surface.current(), "a");
        assert_eq!(surface.performed().len(), 1);
    }
}
