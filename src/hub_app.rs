//! The hub process: websocket relay plus the navigation HTTP surface.
//!
//! Planner and device agents dial in over `/ws/*`. `POST /navigate` resolves
//! a goal on the hub's graph and drives the device there, asking the planner
//! for every grid solve. Graphs uploaded by the device replace the hub's copy
//! and are written to `graph_path` when one is configured.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use nav_graph::{GraphSnapshot, NavGraph, SharedGraph};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transport_bridge::{Hub, HubEvent};

use crate::config::WayfinderConfig;
use crate::errors::NavigationError;
use crate::navigator::{HubExecutor, HubPlanner, NavigationSummary, Navigator, RoutePlanner};

pub struct HubApp {
    hub: Arc<Hub>,
    graph: SharedGraph,
    navigator: Navigator,
    graph_path: Option<PathBuf>,
    active: Mutex<Option<CancellationToken>>,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub goal: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    pub exploration_complete: bool,
}

impl HubApp {
    pub fn new(config: &WayfinderConfig, graph: SharedGraph) -> Arc<Self> {
        let hub = Hub::new(config.bridge.clone());
        let routes = RoutePlanner::new(graph.clone(), Arc::new(HubPlanner::new(Arc::clone(&hub))))
            .with_grid(config.grid.clone());
        let navigator = Navigator::new(
            routes,
            Arc::new(HubExecutor::new(Arc::clone(&hub))),
            config.navigator.clone(),
        );
        Arc::new(Self {
            hub,
            graph,
            navigator,
            graph_path: config.graph_path.clone(),
            active: Mutex::new(None),
        })
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn graph_summary(&self) -> GraphSummary {
        let graph = self.graph.read();
        GraphSummary {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            exploration_complete: graph.exploration_complete(),
        }
    }

    /// Hub endpoints merged with `POST /navigate` and `GET /graph`.
    pub fn router(self: &Arc<Self>) -> Router {
        let api = Router::new()
            .route("/navigate", post(navigate))
            .route("/graph", get(graph_summary))
            .with_state(Arc::clone(self));
        self.hub.router().merge(api)
    }

    /// Runs one navigation. A newer call cancels the one in flight.
    pub async fn navigate(&self, goal: &str) -> Result<NavigationSummary, NavigationError> {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.active.lock().replace(cancel.clone()) {
            previous.cancel();
        }
        self.navigator.navigate(goal, &cancel).await
    }

    /// Replaces the hub's graph with an uploaded snapshot and persists it.
    pub fn apply_upload(&self, snapshot: GraphSnapshot) -> Result<(), NavigationError> {
        let graph = NavGraph::from_snapshot(snapshot)?;
        info!(
            target: "hub",
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph replaced by device upload"
        );
        if let Some(path) = &self.graph_path {
            graph.save(path)?;
        }
        *self.graph.write() = graph;
        Ok(())
    }

    /// Applies graph uploads as they arrive until `cancel` fires.
    pub fn spawn_graph_sync(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let app = Arc::clone(self);
        let mut events = self.hub.events().subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(HubEvent::GraphUploaded(snapshot)) => {
                        if let Err(err) = app.apply_upload(snapshot) {
                            warn!(target: "hub", %err, "graph upload ignored");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "hub", skipped, "hub events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

async fn navigate(
    State(app): State<Arc<HubApp>>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<NavigationSummary>, NavigationError> {
    app.navigate(&request.goal).await.map(Json)
}

async fn graph_summary(State(app): State<Arc<HubApp>>) -> Json<GraphSummary> {
    Json(app.graph_summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use nav_graph::StateNode;
    use tower::ServiceExt;
    use wayfinder_core_types::{Action, Selector, StateId};

    fn two_screens() -> NavGraph {
        let mut graph = NavGraph::new();
        graph.upsert_node(StateNode::new(StateId::new("fp_login"), "Login"));
        graph.upsert_node(StateNode::new(StateId::new("fp_home"), "Home"));
        graph
            .record_edge(
                &StateId::new("fp_login"),
                &StateId::new("fp_home"),
                Action::tap(Selector::by_id("login")),
            )
            .unwrap();
        graph
    }

    fn post_navigate(goal: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/navigate")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "goal": goal }).to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_goal_is_a_structured_404() {
        let app = HubApp::new(&WayfinderConfig::default(), nav_graph::shared(two_screens()));
        let response = app.router().oneshot(post_navigate("settings")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "not_found");
        assert_eq!(body["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn navigation_needs_a_reported_screen() {
        let app = HubApp::new(&WayfinderConfig::default(), nav_graph::shared(two_screens()));
        let err = app.navigate("Home").await.unwrap_err();
        assert!(matches!(err, NavigationError::UnknownPosition(_)));
    }

    #[tokio::test]
    async fn graph_endpoint_reports_counts() {
        let app = HubApp::new(&WayfinderConfig::default(), nav_graph::shared(two_screens()));
        let response = app
            .router()
            .oneshot(Request::builder().uri("/graph").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["nodes"], 2);
        assert_eq!(body["edges"], 1);
    }

    #[tokio::test]
    async fn uploads_replace_and_persist_the_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let config = WayfinderConfig {
            graph_path: Some(path.clone()),
            ..WayfinderConfig::default()
        };
        let app = HubApp::new(&config, nav_graph::shared(NavGraph::new()));
        let cancel = CancellationToken::new();
        let sync = app.spawn_graph_sync(cancel.clone());

        app.hub()
            .events()
            .emit(HubEvent::GraphUploaded(two_screens().to_snapshot()));
        for _ in 0..100 {
            if app.graph().read().node_count() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(app.graph_summary().nodes, 2);
        assert_eq!(NavGraph::load(&path).unwrap().edge_count(), 1);

        cancel.cancel();
        sync.await.unwrap();
    }
}
