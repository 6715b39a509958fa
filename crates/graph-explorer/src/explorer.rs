//! Bounded depth-first discovery.
//!
//! One probe at a time: tap a meaningful element, let the UI settle, read it
//! back and fingerprint it. A changed fingerprint yields an edge; a new one
//! yields a node that is expanded before backing out again. The UI is a
//! single shared resource, so nothing here runs concurrently.

use std::sync::Arc;

use async_recursion::async_recursion;
use nav_graph::{ElementRecord, NodeInsert, SharedGraph, StateNode};
use parking_lot::Mutex;
use perceiver_structural::{ElementExtractor, ElementFilter, FilterPolicy, Fingerprinter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wayfinder_core_types::{Action, Fingerprint, Selector, StateId, UiSnapshot};
use wayfinder_event_bus::InMemoryBus;

use crate::config::ExplorerConfig;
use crate::errors::ExplorerError;
use crate::events::{ExplorationReport, ExplorerEvent, ExplorerPhase};
use crate::ports::ActionExecutor;

pub struct Explorer {
    extractor: Arc<dyn ElementExtractor>,
    executor: Arc<dyn ActionExecutor>,
    graph: SharedGraph,
    fingerprinter: Fingerprinter,
    filter: ElementFilter,
    config: ExplorerConfig,
    events: Option<Arc<InMemoryBus<ExplorerEvent>>>,
    phase: Mutex<ExplorerPhase>,
}

/// Per-run bookkeeping threaded through the recursion.
struct Run {
    cancel: CancellationToken,
    app_identity: String,
    /// Structural fingerprints of the states on the current DFS path.
    ancestry: Vec<Fingerprint>,
    report: ExplorationReport,
}

impl Run {
    fn stopped(&self) -> bool {
        self.report.lost || self.cancel.is_cancelled()
    }
}

impl Explorer {
    pub fn new(
        extractor: Arc<dyn ElementExtractor>,
        executor: Arc<dyn ActionExecutor>,
        graph: SharedGraph,
        config: ExplorerConfig,
    ) -> Self {
        let filter = ElementFilter::new(FilterPolicy {
            min_element_size: config.min_element_size,
        });
        Self {
            extractor,
            executor,
            graph,
            fingerprinter: Fingerprinter::default(),
            filter,
            config,
            events: None,
            phase: Mutex::new(ExplorerPhase::Idle),
        }
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn with_events(mut self, bus: Arc<InMemoryBus<ExplorerEvent>>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn phase(&self) -> ExplorerPhase {
        *self.phase.lock()
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Explores from whatever state the surface currently shows.
    ///
    /// Returns an error only when the starting state cannot be observed or
    /// the graph rejects an update. Marks the graph complete when the run
    /// finishes without being cancelled or losing its way.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ExplorationReport, ExplorerError> {
        self.set_phase(ExplorerPhase::Exploring);
        let snapshot = match self.extractor.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.set_phase(ExplorerPhase::Idle);
                return Err(err.into());
            }
        };

        let mut run = Run {
            cancel: cancel.clone(),
            app_identity: snapshot.app_identity.clone(),
            ancestry: Vec::new(),
            report: ExplorationReport::default(),
        };
        info!(
            target: "explorer",
            app = %run.app_identity,
            max_depth = self.config.max_depth,
            max_nodes = self.config.max_nodes,
            "exploration started"
        );

        let root = self.fingerprinter.detailed(&snapshot);
        self.register(&mut run, &root, &snapshot, 0);
        let outcome = self.explore_state(&mut run, root, snapshot, 0).await;

        let mut report = run.report;
        report.cancelled = cancel.is_cancelled();
        if let Err(err) = outcome {
            self.set_phase(ExplorerPhase::Idle);
            return Err(err);
        }
        if !report.cancelled && !report.lost {
            self.graph.write().set_exploration_complete(true);
            report.complete = true;
        }
        self.set_phase(ExplorerPhase::Done);

        let graph = self.graph.read();
        info!(
            target: "explorer",
            states = graph.node_count(),
            edges = graph.edge_count(),
            probes = report.probes,
            failed = report.failed_probes,
            complete = report.complete,
            "exploration finished"
        );
        Ok(report)
    }

    #[async_recursion]
    async fn explore_state(
        &self,
        run: &mut Run,
        state: StateId,
        snapshot: UiSnapshot,
        depth: usize,
    ) -> Result<(), ExplorerError> {
        run.ancestry.push(self.fingerprinter.structural(&snapshot));
        let candidates: Vec<Selector> = self
            .filter
            .meaningful(&snapshot)
            .into_iter()
            .map(Selector::from_element)
            .collect();
        debug!(
            target: "explorer",
            state = %state.short(),
            depth,
            candidates = candidates.len(),
            "expanding state"
        );

        for selector in candidates {
            if run.stopped() {
                break;
            }
            self.probe(run, &state, selector, depth).await?;
        }

        run.ancestry.pop();
        Ok(())
    }

    async fn probe(
        &self,
        run: &mut Run,
        state: &StateId,
        selector: Selector,
        depth: usize,
    ) -> Result<(), ExplorerError> {
        run.report.probes += 1;
        let action = Action::tap(selector.clone());
        let outcome = self.executor.perform(&action).await;
        if !outcome.success {
            let reason = outcome
                .error
                .unwrap_or_else(|| "executor reported failure".to_string());
            self.probe_failed(run, state, selector, reason);
            self.recover(run, state).await;
            return Ok(());
        }
        if !self.settle(&run.cancel).await {
            return Ok(());
        }

        let after = match self.extractor.snapshot().await {
            Ok(after) => after,
            Err(err) => {
                self.probe_failed(run, state, selector, err.to_string());
                self.recover(run, state).await;
                return Ok(());
            }
        };
        if after.app_identity != run.app_identity {
            warn!(
                target: "explorer",
                expected = %run.app_identity,
                observed = %after.app_identity,
                %selector,
                "probe left the application"
            );
            self.probe_failed(run, state, selector, format!("foreign surface {}", after.app_identity));
            self.recover(run, state).await;
            return Ok(());
        }

        let next = self.fingerprinter.detailed(&after);
        if &next == state {
            return Ok(());
        }

        let known = self.graph.read().contains(&next);
        if !known {
            if self.graph.read().node_count() >= self.config.max_nodes {
                debug!(target: "explorer", %selector, "node cap reached, not registering");
                self.backtrack(run, state).await;
                return Ok(());
            }
            self.register(run, &next, &after, depth + 1);
        }

        let observed_count = self
            .graph
            .write()
            .record_edge(state, &next, action.clone())?;
        run.report.edges_observed += 1;
        self.emit(ExplorerEvent::EdgeRecorded {
            from: state.clone(),
            to: next.clone(),
            action,
            observed_count,
        });

        let looping = run
            .ancestry
            .contains(&self.fingerprinter.structural(&after));
        if !known && depth + 1 < self.config.max_depth && !looping {
            self.explore_state(run, next, after, depth + 1).await?;
        } else if looping {
            debug!(target: "explorer", state = %next.short(), "structure repeats an ancestor, not expanding");
        }

        self.backtrack(run, state).await;
        Ok(())
    }

    fn register(&self, run: &mut Run, id: &StateId, snapshot: &UiSnapshot, depth: usize) {
        let label = self.label_for(snapshot);
        let elements = self
            .filter
            .meaningful(snapshot)
            .into_iter()
            .map(|el| ElementRecord::from_element(el, snapshot.viewport))
            .collect();
        let inserted = self
            .graph
            .write()
            .upsert_node(StateNode::new(id.clone(), label.clone()).with_elements(elements));
        if inserted == NodeInsert::Inserted {
            run.report.states_discovered += 1;
            info!(target: "explorer", state = %id.short(), %label, depth, "state discovered");
            self.emit(ExplorerEvent::StateDiscovered {
                state: id.clone(),
                label,
                depth,
            });
        }
    }

    /// First titled element, else the root role.
    fn label_for(&self, snapshot: &UiSnapshot) -> String {
        snapshot
            .elements
            .iter()
            .filter(|el| self.fingerprinter.is_title(el))
            .find_map(|el| el.label.as_deref().map(str::trim).filter(|l| !l.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| snapshot.root_role.clone())
    }

    async fn backtrack(&self, run: &mut Run, target: &StateId) {
        self.set_phase(ExplorerPhase::Backtracking);
        if !self.navigate_back_to(run, target).await && !self.navigate_by_graph(run, target).await {
            self.mark_lost(run, target);
        }
        self.set_phase(ExplorerPhase::Exploring);
    }

    /// Called after a failed probe: stay put if still on `target`, else back out.
    async fn recover(&self, run: &mut Run, target: &StateId) {
        if let Ok(snapshot) = self.extractor.snapshot().await {
            if &self.fingerprinter.detailed(&snapshot) == target {
                return;
            }
        }
        self.backtrack(run, target).await;
    }

    async fn navigate_back_to(&self, run: &Run, target: &StateId) -> bool {
        for attempt in 1..=self.config.max_back_retries {
            if run.cancel.is_cancelled() {
                return false;
            }
            let outcome = self.executor.perform(&Action::Back).await;
            if !outcome.success {
                debug!(target: "explorer", attempt, error = ?outcome.error, "back failed");
                continue;
            }
            if !self.settle(&run.cancel).await {
                return false;
            }
            match self.extractor.snapshot().await {
                Ok(snapshot) if &self.fingerprinter.detailed(&snapshot) == target => return true,
                Ok(_) => debug!(target: "explorer", attempt, "back landed elsewhere"),
                Err(err) => debug!(target: "explorer", attempt, error = %err, "observe after back failed"),
            }
        }
        false
    }

    /// Replays recorded edges from wherever the surface is now back to
    /// `target`. Each hop must land on the state the graph predicts.
    async fn navigate_by_graph(&self, run: &Run, target: &StateId) -> bool {
        if run.cancel.is_cancelled() {
            return false;
        }
        let current = match self.extractor.snapshot().await {
            Ok(snapshot) => self.fingerprinter.detailed(&snapshot),
            Err(err) => {
                debug!(target: "explorer", error = %err, "cannot observe for graph recovery");
                return false;
            }
        };
        if &current == target {
            return true;
        }

        let hops: Vec<(Action, StateId)> = {
            let graph = self.graph.read();
            let path = match graph.state_path(&current, target) {
                Ok(Some(path)) => path,
                Ok(None) | Err(_) => {
                    debug!(target: "explorer", from = %current.short(), "no recorded route back");
                    return false;
                }
            };
            let mut hops = Vec::with_capacity(path.len().saturating_sub(1));
            for pair in path.windows(2) {
                match graph.best_edge(&pair[0], &pair[1]) {
                    Some(edge) => hops.push((edge.action.clone(), pair[1].clone())),
                    None => return false,
                }
            }
            hops
        };

        info!(
            target: "explorer",
            from = %current.short(),
            to = %target.short(),
            hops = hops.len(),
            "back failed, returning along recorded edges"
        );
        for (action, expected) in hops {
            if !self.executor.perform(&action).await.success || !self.settle(&run.cancel).await {
                return false;
            }
            match self.extractor.snapshot().await {
                Ok(snapshot) if self.fingerprinter.detailed(&snapshot) == expected => {}
                _ => {
                    debug!(target: "explorer", expected = %expected.short(), "recovery hop landed elsewhere");
                    return false;
                }
            }
        }
        true
    }

    fn mark_lost(&self, run: &mut Run, target: &StateId) {
        if run.cancel.is_cancelled() {
            return;
        }
        warn!(
            target: "explorer",
            state = %target.short(),
            retries = self.config.max_back_retries,
            "could not return to state, stopping exploration"
        );
        run.report.lost = true;
    }

    fn probe_failed(&self, run: &mut Run, state: &StateId, selector: Selector, reason: String) {
        run.report.failed_probes += 1;
        warn!(target: "explorer", state = %state.short(), %selector, %reason, "probe failed");
        self.emit(ExplorerEvent::ProbeFailed {
            state: state.clone(),
            selector,
            reason,
        });
    }

    /// Returns false when cancelled during the settle delay.
    async fn settle(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.settle()) => true,
        }
    }

    fn set_phase(&self, phase: ExplorerPhase) {
        {
            let mut current = self.phase.lock();
            if *current == phase {
                return;
            }
            *current = phase;
        }
        self.emit(ExplorerEvent::PhaseChanged { phase });
    }

    fn emit(&self, event: ExplorerEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::ScriptedSurface;
    use nav_graph::{shared, NavGraph};
    use wayfinder_core_types::{Bounds, UiElement};

    fn button(id: &str, label: &str) -> UiElement {
        UiElement::new("button")
            .with_id(id)
            .with_label(label)
            .clickable()
            .with_bounds(Bounds::new(0.0, 0.0, 120.0, 40.0))
    }

    fn screen(title: &str, buttons: &[(&str, &str)]) -> UiSnapshot {
        let mut snapshot = UiSnapshot::new("com.shop", "Activity")
            .push(UiElement::new("heading").with_label(title));
        for (id, label) in buttons {
            snapshot = snapshot.push(button(id, label));
        }
        snapshot
    }

    fn shop() -> Arc<ScriptedSurface> {
        Arc::new(
            ScriptedSurface::new("login")
                .screen("login", screen("Login", &[("login", "Sign in"), ("help", "Help")]))
                .screen(
                    "dashboard",
                    screen("Dashboard", &[("nav-orders", "Orders"), ("nav-home", "Home")]),
                )
                .screen("orders", screen("Orders", &[("nav-home", "Home")]))
                .link("login", "login", "dashboard")
                .link("dashboard", "nav-orders", "orders")
                .link("orders", "nav-home", "dashboard"),
        )
    }

    fn explorer(surface: &Arc<ScriptedSurface>, config: ExplorerConfig) -> Explorer {
        Explorer::new(
            surface.clone(),
            surface.clone(),
            shared(NavGraph::new()),
            config,
        )
    }

    fn fast() -> ExplorerConfig {
        ExplorerConfig {
            settle_ms: 0,
            ..ExplorerConfig::default()
        }
    }

    #[tokio::test]
    async fn discovers_states_and_edges() {
        let surface = shop();
        let explorer = explorer(&surface, fast());
        let report = explorer.run(&CancellationToken::new()).await.unwrap();

        assert!(report.complete);
        assert_eq!(report.states_discovered, 3);
        assert_eq!(explorer.phase(), ExplorerPhase::Done);

        let graph = explorer.graph().read();
        assert!(graph.exploration_complete());
        let labels: Vec<_> = graph.nodes().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["Login", "Dashboard", "Orders"]);
        let login = graph.resolve_goal("login").unwrap().id.clone();
        let dashboard = graph.resolve_goal("dashboard").unwrap().id.clone();
        let orders = graph.resolve_goal("orders").unwrap().id.clone();
        let edge = graph.best_edge(&login, &dashboard).unwrap();
        assert_eq!(edge.action, Action::tap(Selector::from_element(&button("login", "Sign in"))));
        assert!(graph.best_edge(&dashboard, &orders).is_some());
        assert!(graph.best_edge(&orders, &dashboard).is_some());
        assert_eq!(surface.current(), "login");
    }

    #[tokio::test]
    async fn depth_cap_stops_expansion() {
        let surface = shop();
        let explorer = explorer(
            &surface,
            ExplorerConfig {
                max_depth: 1,
                ..fast()
            },
        );
        explorer.run(&CancellationToken::new()).await.unwrap();
        let graph = explorer.graph().read();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn node_cap_is_respected() {
        let surface = shop();
        let explorer = explorer(
            &surface,
            ExplorerConfig {
                max_nodes: 2,
                ..fast()
            },
        );
        let report = explorer.run(&CancellationToken::new()).await.unwrap();
        assert!(report.complete);
        assert_eq!(explorer.graph().read().node_count(), 2);
    }

    #[tokio::test]
    async fn failed_probe_is_skipped() {
        let surface = shop();
        surface.fail_next("element detached");
        let explorer = explorer(&surface, fast());
        let report = explorer.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed_probes, 1);
        assert!(report.complete);
        // The failed probe was the login button, so nothing else is reachable.
        assert_eq!(explorer.graph().read().node_count(), 1);
    }

    #[tokio::test]
    async fn foreign_surface_triggers_back() {
        let surface = Arc::new(
            ScriptedSurface::new("home")
                .screen("home", screen("Home", &[("ext", "Open browser"), ("settings", "Settings")]))
                .screen(
                    "browser",
                    UiSnapshot::new("com.browser", "Browser").push(UiElement::new("heading").with_label("Web")),
                )
                .screen("settings", screen("Settings", &[]))
                .link("home", "ext", "browser")
                .link("home", "settings", "settings"),
        );
        let explorer = explorer(&surface, fast());
        let report = explorer.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed_probes, 1);
        let graph = explorer.graph().read();
        let labels: Vec<_> = graph.nodes().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["Home", "Settings"]);
    }

    #[tokio::test]
    async fn returns_along_recorded_edges_when_back_is_swallowed() {
        let surface = Arc::new(
            ScriptedSurface::new("home")
                .screen("home", screen("Home", &[("settings", "Settings")]))
                .screen("settings", screen("Settings", &[("nav-home", "Home")]))
                .link("home", "settings", "settings")
                .link("settings", "nav-home", "home")
                .swallow_back("settings"),
        );
        let explorer = explorer(&surface, fast());
        let report = explorer.run(&CancellationToken::new()).await.unwrap();

        assert!(!report.lost);
        assert!(report.complete);
        assert_eq!(surface.current(), "home");
        let back_presses = surface
            .performed()
            .iter()
            .filter(|action| matches!(action, Action::Back))
            .count();
        assert!(back_presses > explorer.config.max_back_retries as usize);
    }

    #[tokio::test]
    async fn lost_without_a_recorded_route() {
        let surface = Arc::new(
            ScriptedSurface::new("home")
                .screen("home", screen("Home", &[("settings", "Settings")]))
                .screen("settings", screen("Settings", &[]))
                .link("home", "settings", "settings")
                .swallow_back("settings"),
        );
        let explorer = explorer(&surface, fast());
        let report = explorer.run(&CancellationToken::new()).await.unwrap();

        assert!(report.lost);
        assert!(!report.complete);
        assert!(!explorer.graph().read().exploration_complete());
    }

    #[tokio::test]
    async fn cancelled_run_is_not_complete() {
        let surface = shop();
        let explorer = explorer(&surface, fast());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = explorer.run(&cancel).await.unwrap();
        assert!(report.cancelled);
        assert!(!report.complete);
        assert!(!explorer.graph().read().exploration_complete());
    }

    #[tokio::test]
    async fn phases_are_published() {
        let surface = shop();
        let bus = InMemoryBus::new(64);
        let mut rx = bus.subscribe();
        let explorer = explorer(&surface, fast()).with_events(bus.clone());
        explorer.run(&CancellationToken::new()).await.unwrap();

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ExplorerEvent::PhaseChanged { phase } = event {
                phases.push(phase);
            }
        }
        assert_eq!(phases.first(), Some(&ExplorerPhase::Exploring));
        assert!(phases.contains(&ExplorerPhase::Backtracking));
        assert_eq!(phases.last(), Some(&ExplorerPhase::Done));
    }
}
