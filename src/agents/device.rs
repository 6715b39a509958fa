//! Device-side agent: runs plans the hub sends against the local UI and
//! keeps the hub informed about the current screen and the explored graph.

use std::sync::Arc;

use action_flow::{Plan, PlanRunner, PlanStep, RunOutcome};
use async_trait::async_trait;
use nav_graph::SharedGraph;
use parking_lot::Mutex;
use perceiver_structural::{ElementExtractor, Fingerprinter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transport_bridge::messages::{
    ExecutePlanPayload, GraphUpdatePayload, PlanCompletePayload, PlanErrorPayload, UiStatePayload,
};
use transport_bridge::{BridgeLink, BridgeMessage, BridgeResult, RequestHandler};

pub struct DeviceAgent {
    runner: PlanRunner,
    extractor: Arc<dyn ElementExtractor>,
    fingerprinter: Fingerprinter,
    graph: Option<SharedGraph>,
    active: Mutex<Option<CancellationToken>>,
}

impl DeviceAgent {
    pub fn new(runner: PlanRunner, extractor: Arc<dyn ElementExtractor>) -> Self {
        Self {
            runner,
            extractor,
            fingerprinter: Fingerprinter::default(),
            graph: None,
            active: Mutex::new(None),
        }
    }

    /// Graph pushed to the hub on every connect.
    pub fn with_graph(mut self, graph: SharedGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Stops the plan currently running, if any. Executed steps stay done.
    pub fn cancel_active(&self) {
        if let Some(token) = self.active.lock().take() {
            token.cancel();
        }
    }

    async fn report_screen(&self, link: &BridgeLink) {
        let snapshot = match self.extractor.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(target: "device", %err, "cannot read current screen");
                return;
            }
        };
        let message = BridgeMessage::UiState {
            payload: UiStatePayload {
                screen_fingerprint: self.fingerprinter.detailed(&snapshot),
            },
        };
        if let Err(err) = link.send(&message) {
            debug!(target: "device", %err, "ui_state not sent");
        }
    }

    async fn upload_graph(&self, link: &BridgeLink, graph: &SharedGraph) -> BridgeResult<()> {
        let snapshot = graph.read().to_snapshot();
        let reply = link
            .request(|request_id| BridgeMessage::GraphUpdate {
                request_id,
                payload: GraphUpdatePayload { graph: snapshot },
            })
            .await?;
        if let BridgeMessage::GraphAck { payload, .. } = reply {
            info!(target: "device", nodes = payload.nodes, edges = payload.edges, "graph uploaded");
        }
        Ok(())
    }

    async fn execute(&self, request_id: String, payload: ExecutePlanPayload, link: &BridgeLink) -> BridgeMessage {
        let steps = match payload
            .steps
            .into_iter()
            .enumerate()
            .map(|(position, mut wire)| {
                wire.index = position;
                PlanStep::try_from(wire)
            })
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(steps) => steps,
            Err(err) => {
                warn!(target: "device", %err, "rejecting malformed plan");
                return BridgeMessage::PlanError {
                    request_id,
                    payload: PlanErrorPayload {
                        error: err.to_string(),
                        outcome: None,
                    },
                };
            }
        };
        let plan = Plan::from_steps(steps);

        let cancel = CancellationToken::new();
        if let Some(previous) = self.active.lock().replace(cancel.clone()) {
            info!(target: "device", "new plan supersedes the running one");
            previous.cancel();
        }

        let (tx, mut rx) = mpsc::channel(plan.len().max(1));
        let forwarder = tokio::spawn({
            let link = link.clone();
            let request_id = request_id.clone();
            async move {
                while let Some(report) = rx.recv().await {
                    let message = BridgeMessage::ActionResult {
                        request_id: request_id.clone(),
                        payload: report,
                    };
                    if let Err(err) = link.send(&message) {
                        debug!(target: "device", %err, "action_result not sent");
                    }
                }
            }
        });
        let outcome = self.runner.run(&plan, &tx, &cancel).await;
        drop(tx);
        if let Err(err) = forwarder.await {
            warn!(target: "device", %err, "report forwarder stopped");
        }
        self.report_screen(link).await;

        let summary = outcome.summary();
        match outcome {
            RunOutcome::Completed { .. } => BridgeMessage::PlanComplete {
                request_id,
                payload: PlanCompletePayload {
                    summary,
                    outcome: Some(outcome),
                },
            },
            _ => BridgeMessage::PlanError {
                request_id,
                payload: PlanErrorPayload {
                    error: summary,
                    outcome: Some(outcome),
                },
            },
        }
    }
}

#[async_trait]
impl RequestHandler for DeviceAgent {
    async fn handle(&self, request: BridgeMessage, link: BridgeLink) -> BridgeMessage {
        match request {
            BridgeMessage::ExecutePlan {
                request_id,
                payload,
            } => self.execute(request_id, payload, &link).await,
            other => BridgeMessage::error(
                other.request_id().map(str::to_string),
                format!("device cannot serve {}", other.kind()),
            ),
        }
    }

    async fn on_connected(&self, link: BridgeLink) {
        self.report_screen(&link).await;
        if let Some(graph) = &self.graph {
            if let Err(err) = self.upload_graph(&link, graph).await {
                warn!(target: "device", %err, "graph upload failed");
            }
        }
    }
}
