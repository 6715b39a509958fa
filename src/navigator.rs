//! Navigation orchestration.
//!
//! goal -> target state -> compiled grid -> solved path -> plan -> run.
//! Solving and running sit behind [`PathPlanner`] and [`PlanExecutor`] so the
//! same loop drives an in-process UI or a remote planner and device through
//! the hub.

use std::sync::Arc;
use std::time::Instant;

use action_flow::{Plan, PlanRunner, PlanTranslator, RunOutcome, StepReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grid_compiler::{Cell, CompiledGrid, GridCompiler, GridConfig};
use nav_graph::SharedGraph;
use path_solver::{BfsSolver, Solver, SolverError};
use perceiver_structural::{ElementExtractor, Fingerprinter};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transport_bridge::messages::NavigationRequestPayload;
use transport_bridge::{BridgeMessage, Hub, PlanReply, WireStep};
use wayfinder_core_types::{Fingerprint, StateId};

use crate::config::NavigatorConfig;
use crate::errors::NavigationError;

/// Solver output plus how long it took.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedPath {
    pub path: Vec<Cell>,
    pub inference_time_ms: Option<u64>,
}

/// Turns a compiled grid into a cell path.
#[async_trait]
pub trait PathPlanner: Send + Sync {
    async fn solve(
        &self,
        current: &StateId,
        target: &StateId,
        compiled: &CompiledGrid,
    ) -> Result<SolvedPath, NavigationError>;
}

/// Observes and drives the live UI.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    /// Fingerprint of the screen the UI shows right now.
    async fn observe(&self) -> Result<StateId, NavigationError>;

    async fn execute(
        &self,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, NavigationError>;
}

pub struct LocalPlanner {
    solver: Arc<dyn Solver>,
}

impl LocalPlanner {
    pub fn new(solver: Arc<dyn Solver>) -> Self {
        Self { solver }
    }
}

impl Default for LocalPlanner {
    fn default() -> Self {
        Self::new(Arc::new(BfsSolver))
    }
}

#[async_trait]
impl PathPlanner for LocalPlanner {
    async fn solve(
        &self,
        current: &StateId,
        target: &StateId,
        compiled: &CompiledGrid,
    ) -> Result<SolvedPath, NavigationError> {
        let started = Instant::now();
        let path = self
            .solver
            .solve(compiled.grid(), compiled.start(), compiled.target())
            .map_err(|err| match err {
                SolverError::Unreachable { .. } => NavigationError::Unreachable {
                    from: current.clone(),
                    to: target.clone(),
                },
                other => other.into(),
            })?;
        Ok(SolvedPath {
            path,
            inference_time_ms: Some(started.elapsed().as_millis() as u64),
        })
    }
}

/// Delegates solving to the planner agent connected to the hub.
pub struct HubPlanner {
    hub: Arc<Hub>,
}

impl HubPlanner {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl PathPlanner for HubPlanner {
    async fn solve(
        &self,
        current: &StateId,
        target: &StateId,
        compiled: &CompiledGrid,
    ) -> Result<SolvedPath, NavigationError> {
        let result = self
            .hub
            .request_path(NavigationRequestPayload {
                current_screen: current.clone(),
                target_screen: target.clone(),
                grid: compiled.grid().clone(),
            })
            .await?;
        if !result.success {
            warn!(
                target: "navigator",
                error = result.error.as_deref().unwrap_or("unspecified"),
                "planner found no path"
            );
            return Err(NavigationError::Unreachable {
                from: current.clone(),
                to: target.clone(),
            });
        }
        Ok(SolvedPath {
            path: result.path,
            inference_time_ms: result.inference_time_ms,
        })
    }
}

/// Runs plans in-process against an extractor/executor pair.
pub struct LocalExecutor {
    runner: PlanRunner,
    extractor: Arc<dyn ElementExtractor>,
    fingerprinter: Fingerprinter,
}

impl LocalExecutor {
    pub fn new(runner: PlanRunner, extractor: Arc<dyn ElementExtractor>) -> Self {
        Self {
            runner,
            extractor,
            fingerprinter: Fingerprinter::default(),
        }
    }
}

#[async_trait]
impl PlanExecutor for LocalExecutor {
    async fn observe(&self) -> Result<StateId, NavigationError> {
        let snapshot = self
            .extractor
            .snapshot()
            .await
            .map_err(|err| NavigationError::UnknownPosition(err.to_string()))?;
        Ok(self.fingerprinter.detailed(&snapshot))
    }

    async fn execute(
        &self,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, NavigationError> {
        let (tx, mut rx) = mpsc::channel(plan.len().max(1));
        let outcome = self.runner.run(plan, &tx, cancel).await;
        drop(tx);
        while let Some(report) = rx.recv().await {
            log_report(&report);
        }
        Ok(outcome)
    }
}

/// Sends plans to the device agent connected to the hub.
pub struct HubExecutor {
    hub: Arc<Hub>,
}

impl HubExecutor {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl PlanExecutor for HubExecutor {
    async fn observe(&self) -> Result<StateId, NavigationError> {
        self.hub.current_screen().ok_or_else(|| {
            NavigationError::UnknownPosition("device has not reported its screen".to_string())
        })
    }

    async fn execute(
        &self,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, NavigationError> {
        let steps: Vec<WireStep> = plan.steps.iter().map(WireStep::from).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = tokio::select! {
            _ = cancel.cancelled() => None,
            reply = self.hub.execute_plan(steps, Some(tx)) => Some(reply?),
        };

        let mut reports = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let BridgeMessage::ActionResult { payload, .. } = message {
                log_report(&payload);
                reports.push(payload);
            }
        }
        let last_successful_step = reports
            .iter()
            .filter(|report| report.success)
            .map(|report| report.step_index)
            .max();

        let outcome = match reply {
            None => RunOutcome::Cancelled {
                completed: reports.iter().filter(|report| report.success).count(),
            },
            Some(PlanReply::Complete(payload)) => payload.outcome.unwrap_or(RunOutcome::Completed {
                steps: plan.len(),
                final_state: reports.last().and_then(|report| report.new_fingerprint.clone()),
            }),
            Some(PlanReply::Error(payload)) => payload.outcome.unwrap_or(RunOutcome::Failed {
                step_index: last_successful_step.map_or(0, |step| step + 1),
                last_successful_step,
                error: payload.error,
            }),
        };
        Ok(outcome)
    }
}

fn log_report(report: &StepReport) {
    debug!(
        target: "navigator",
        step = report.step_index,
        success = report.success,
        state = report.new_fingerprint.as_ref().map(|fp| fp.short()).unwrap_or("-"),
        "step report"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Grid,
    GraphFallback,
}

/// A plan ready to run, with the grid it was solved on.
#[derive(Debug, Clone)]
pub struct Route {
    pub compiled: CompiledGrid,
    pub path: Vec<Cell>,
    pub plan: Plan,
    pub source: PlanSource,
    pub inference_time_ms: Option<u64>,
}

/// Compile, solve and translate for one (current, target) pair.
pub struct RoutePlanner {
    graph: SharedGraph,
    compiler: GridCompiler,
    translator: PlanTranslator,
    planner: Arc<dyn PathPlanner>,
    graph_fallback: bool,
}

impl RoutePlanner {
    pub fn new(graph: SharedGraph, planner: Arc<dyn PathPlanner>) -> Self {
        Self {
            graph,
            compiler: GridCompiler::default(),
            translator: PlanTranslator,
            planner,
            graph_fallback: false,
        }
    }

    pub fn with_grid(mut self, config: GridConfig) -> Self {
        self.compiler = GridCompiler::new(config);
        self
    }

    pub fn with_graph_fallback(mut self, enabled: bool) -> Self {
        self.graph_fallback = enabled;
        self
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Resolves a goal (id, label or unique label fragment) to a state.
    pub fn resolve(&self, goal: &str) -> Result<StateId, NavigationError> {
        let graph = self.graph.read();
        let node = graph.resolve_goal(goal)?;
        Ok(node.id.clone())
    }

    pub async fn route(
        &self,
        current: &StateId,
        target: &StateId,
    ) -> Result<Route, NavigationError> {
        let compiled = {
            let graph = self.graph.read();
            self.compiler.compile(&graph, current, target)?
        };
        let solved = self.planner.solve(current, target, &compiled).await?;

        let graph = self.graph.read();
        let (plan, source) = match self.translator.translate(&graph, &compiled, &solved.path) {
            Ok(plan) => (plan, PlanSource::Grid),
            Err(err) if self.graph_fallback => {
                warn!(target: "navigator", %err, "grid path not translatable, searching the graph directly");
                let states = graph
                    .state_path(current, target)?
                    .ok_or_else(|| NavigationError::Unreachable {
                        from: current.clone(),
                        to: target.clone(),
                    })?;
                let plan = self
                    .translator
                    .from_states(&graph, states)
                    .map_err(|err| NavigationError::Internal(err.to_string()))?;
                (plan, PlanSource::GraphFallback)
            }
            Err(err) => {
                return Err(NavigationError::Internal(format!(
                    "solved path does not match the graph: {err}"
                )))
            }
        };
        Ok(Route {
            compiled,
            path: solved.path,
            plan,
            source,
            inference_time_ms: solved.inference_time_ms,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationSummary {
    pub goal: String,
    pub start: StateId,
    pub target: StateId,
    pub final_state: Option<Fingerprint>,
    pub steps_executed: usize,
    pub replans: u32,
    pub plan_source: PlanSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_time_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Navigator {
    routes: RoutePlanner,
    executor: Arc<dyn PlanExecutor>,
    config: NavigatorConfig,
}

impl Navigator {
    pub fn new(routes: RoutePlanner, executor: Arc<dyn PlanExecutor>, config: NavigatorConfig) -> Self {
        let routes = routes.with_graph_fallback(config.graph_fallback);
        Self {
            routes,
            executor,
            config,
        }
    }

    pub fn routes(&self) -> &RoutePlanner {
        &self.routes
    }

    /// Drives the UI to `goal`, replanning from the observed state after a
    /// mismatch up to `max_replans` times.
    pub async fn navigate(
        &self,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<NavigationSummary, NavigationError> {
        let started_at = Utc::now();
        let target = self.routes.resolve(goal)?;
        let start = self.executor.observe().await?;
        info!(target: "navigator", goal, from = %start.short(), to = %target.short(), "navigation started");

        let mut current = start.clone();
        let mut replans = 0u32;
        let mut steps_executed = 0usize;
        let mut plan_source = PlanSource::Grid;
        let mut inference_time_ms = None;

        let final_state = loop {
            if current == target {
                break Some(current);
            }
            let route = self.routes.route(&current, &target).await?;
            plan_source = route.source;
            inference_time_ms = route.inference_time_ms;
            debug!(target: "navigator", steps = route.plan.len(), source = ?route.source, "plan ready");

            match self.executor.execute(&route.plan, cancel).await? {
                RunOutcome::Completed { steps, final_state } => {
                    steps_executed += steps;
                    break final_state.or(Some(target.clone()));
                }
                RunOutcome::Diverged {
                    step_index,
                    expected,
                    observed,
                } => {
                    steps_executed += step_index + 1;
                    let known = self.routes.graph().read().contains(&observed);
                    if replans >= self.config.max_replans || !known {
                        warn!(
                            target: "navigator",
                            replans,
                            known,
                            observed = %observed.short(),
                            "giving up after state mismatch"
                        );
                        return Err(NavigationError::StateMismatch {
                            step_index,
                            expected,
                            observed,
                        });
                    }
                    replans += 1;
                    info!(target: "navigator", replans, observed = %observed.short(), "replanning from observed state");
                    current = observed;
                }
                RunOutcome::Failed {
                    step_index,
                    last_successful_step,
                    error,
                } => {
                    return Err(NavigationError::ActionFailed {
                        step_index,
                        last_successful_step,
                        error,
                    })
                }
                RunOutcome::Cancelled { completed } => {
                    return Err(NavigationError::Cancelled {
                        completed: steps_executed + completed,
                    })
                }
            }
        };

        info!(target: "navigator", goal, steps = steps_executed, replans, "navigation complete");
        Ok(NavigationSummary {
            goal: goal.to_string(),
            start,
            target,
            final_state,
            steps_executed,
            replans,
            plan_source,
            inference_time_ms,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_flow::RunnerConfig;
    use graph_explorer::ScriptedSurface;
    use nav_graph::{NavGraph, StateNode};
    use wayfinder_core_types::{Action, Bounds, Selector, UiElement, UiSnapshot};

    use crate::errors::ErrorKind;

    fn screen(title: &str, buttons: &[&str]) -> UiSnapshot {
        let mut snapshot =
            UiSnapshot::new("com.shop", "Activity").push(UiElement::new("heading").with_label(title));
        for id in buttons {
            snapshot = snapshot.push(
                UiElement::new("button")
                    .with_id(*id)
                    .clickable()
                    .with_bounds(Bounds::new(0.0, 0.0, 100.0, 40.0)),
            );
        }
        snapshot
    }

    fn fp(snapshot: &UiSnapshot) -> StateId {
        Fingerprinter::default().detailed(snapshot)
    }

    struct Shop {
        login: UiSnapshot,
        dashboard: UiSnapshot,
        orders: UiSnapshot,
        promo: UiSnapshot,
    }

    fn shop() -> Shop {
        Shop {
            login: screen("Login", &["login"]),
            dashboard: screen("Dashboard", &["nav-orders"]),
            orders: screen("Orders", &[]),
            promo: screen("Promo", &["close"]),
        }
    }

    /// Insertion order fixes lattice placement: Login, Dashboard, Promo, Orders.
    fn graph(shop: &Shop) -> SharedGraph {
        let mut graph = NavGraph::new();
        for (label, snapshot) in [
            ("Login", &shop.login),
            ("Dashboard", &shop.dashboard),
            ("Promo", &shop.promo),
            ("Orders", &shop.orders),
        ] {
            graph.upsert_node(StateNode::new(fp(snapshot), label));
        }
        let (login, dashboard, orders, promo) = (
            fp(&shop.login),
            fp(&shop.dashboard),
            fp(&shop.orders),
            fp(&shop.promo),
        );
        graph
            .record_edge(&login, &dashboard, Action::tap(Selector::by_id("login")))
            .unwrap();
        graph
            .record_edge(&dashboard, &orders, Action::tap(Selector::by_id("nav-orders")))
            .unwrap();
        graph
            .record_edge(&promo, &dashboard, Action::tap(Selector::by_id("close")))
            .unwrap();
        nav_graph::shared(graph)
    }

    fn navigator(surface: &Arc<ScriptedSurface>, graph: SharedGraph, config: NavigatorConfig) -> Navigator {
        let runner = PlanRunner::new(
            surface.clone(),
            surface.clone(),
            RunnerConfig {
                settle_ms: 10,
                ..RunnerConfig::default()
            },
        );
        Navigator::new(
            RoutePlanner::new(graph, Arc::new(LocalPlanner::default())),
            Arc::new(LocalExecutor::new(runner, surface.clone())),
            config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_goal_by_label() {
        let shop = shop();
        let surface = Arc::new(
            ScriptedSurface::new("login")
                .screen("login", shop.login.clone())
                .screen("dashboard", shop.dashboard.clone())
                .screen("orders", shop.orders.clone())
                .link("login", "login", "dashboard")
                .link("dashboard", "nav-orders", "orders"),
        );
        let navigator = navigator(&surface, graph(&shop), NavigatorConfig::default());

        let summary = navigator.navigate("orders", &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.steps_executed, 2);
        assert_eq!(summary.replans, 0);
        assert_eq!(summary.plan_source, PlanSource::Grid);
        assert_eq!(summary.final_state, Some(fp(&shop.orders)));
        assert_eq!(surface.current(), "orders");
    }

    #[tokio::test(start_paused = true)]
    async fn replans_after_landing_on_known_detour() {
        let shop = shop();
        let surface = Arc::new(
            ScriptedSurface::new("login")
                .screen("login", shop.login.clone())
                .screen("dashboard", shop.dashboard.clone())
                .screen("orders", shop.orders.clone())
                .screen("promo", shop.promo.clone())
                .link("login", "login", "promo")
                .link("promo", "close", "dashboard")
                .link("dashboard", "nav-orders", "orders"),
        );
        // From Promo the corridor to Dashboard passes next to Orders, so the
        // grid path skips Dashboard and only the graph search yields a plan.
        let config = NavigatorConfig {
            graph_fallback: true,
            ..NavigatorConfig::default()
        };
        let navigator = navigator(&surface, graph(&shop), config);

        let summary = navigator.navigate("Orders", &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.replans, 1);
        assert_eq!(summary.steps_executed, 3);
        assert_eq!(summary.plan_source, PlanSource::GraphFallback);
        assert_eq!(surface.current(), "orders");
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_surfaces_once_replans_run_out() {
        let shop = shop();
        let surface = Arc::new(
            ScriptedSurface::new("login")
                .screen("login", shop.login.clone())
                .screen("promo", shop.promo.clone())
                .link("login", "login", "promo"),
        );
        let config = NavigatorConfig {
            max_replans: 0,
            ..NavigatorConfig::default()
        };
        let navigator = navigator(&surface, graph(&shop), config);

        let err = navigator.navigate("orders", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateMismatch);
        assert!(matches!(err, NavigationError::StateMismatch { step_index: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_goal_is_not_found() {
        let shop = shop();
        let surface = Arc::new(ScriptedSurface::new("orders").screen("orders", shop.orders.clone()));
        let navigator = navigator(&surface, graph(&shop), NavigatorConfig::default());

        let err = navigator.navigate("settings", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_goal_is_unreachable() {
        let shop = shop();
        let mut graph = NavGraph::new();
        graph.upsert_node(StateNode::new(fp(&shop.orders), "Orders"));
        graph.upsert_node(StateNode::new(fp(&shop.login), "Login"));
        let surface = Arc::new(ScriptedSurface::new("orders").screen("orders", shop.orders.clone()));
        let navigator = navigator(&surface, nav_graph::shared(graph), NavigatorConfig::default());

        let err = navigator.navigate("login", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert!(surface.performed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn already_at_goal_runs_nothing() {
        let shop = shop();
        let surface = Arc::new(ScriptedSurface::new("dashboard").screen("dashboard", shop.dashboard.clone()));
        let navigator = navigator(&surface, graph(&shop), NavigatorConfig::default());
        let summary = navigator.navigate("Dashboard", &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.steps_executed, 0);
        assert!(surface.performed().is_empty());
    }

    struct CorridorOnly;

    #[async_trait]
    impl PathPlanner for CorridorOnly {
        async fn solve(
            &self,
            _current: &StateId,
            _target: &StateId,
            compiled: &CompiledGrid,
        ) -> Result<SolvedPath, NavigationError> {
            // Walks straight from start to target, ignoring walls and edges.
            let (start, end) = (compiled.start(), compiled.target());
            Ok(SolvedPath {
                path: vec![start, end],
                inference_time_ms: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn untranslatable_path_uses_graph_search_only_when_enabled() {
        let shop = shop();
        let graph = graph(&shop);
        let (login, orders) = (fp(&shop.login), fp(&shop.orders));

        let strict = RoutePlanner::new(graph.clone(), Arc::new(CorridorOnly));
        let err = strict.route(&login, &orders).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let lenient = RoutePlanner::new(graph, Arc::new(CorridorOnly)).with_graph_fallback(true);
        let route = lenient.route(&login, &orders).await.unwrap();
        assert_eq!(route.source, PlanSource::GraphFallback);
        assert_eq!(route.plan.len(), 2);
    }
}
