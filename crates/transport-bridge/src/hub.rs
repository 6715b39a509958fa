//! Hub: the accepting side of the bridge.
//!
//! Holds at most one live connection per [`PeerRole`]. A second connection of
//! the same role supersedes the first: the old socket is closed and its
//! pending requests fail with `PeerDisconnected`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use nav_graph::GraphSnapshot;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wayfinder_core_types::Fingerprint;
use wayfinder_event_bus::InMemoryBus;

use crate::errors::{BridgeError, BridgeResult};
use crate::messages::{
    BridgeMessage, ExecutePlanPayload, GraphAckPayload, NavigationRequestPayload,
    NavigationResultPayload, PlanCompletePayload, PlanErrorPayload, WireStep,
};
use crate::peer::{PeerId, PeerRole};
use crate::pending::PendingTable;
use crate::BridgeConfig;

/// Header carrying the shared secret on connect.
pub const AUTH_HEADER: &str = "x-bridge-auth";

#[derive(Debug, Clone)]
pub enum HubEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    GraphUploaded(GraphSnapshot),
    ScreenReported(Fingerprint),
}

/// Terminal answer to `execute_plan`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanReply {
    Complete(PlanCompletePayload),
    Error(PlanErrorPayload),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStatus {
    pub role: PeerRole,
    pub conn: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

struct PeerHandle {
    id: PeerId,
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    device_id: Option<String>,
}

pub struct Hub {
    config: BridgeConfig,
    peers: DashMap<PeerRole, PeerHandle>,
    next_conn: AtomicU64,
    pending: PendingTable,
    current_screen: RwLock<Option<Fingerprint>>,
    events: Arc<InMemoryBus<HubEvent>>,
}

/// Checks the shared secret. No configured secret means open access.
pub fn authenticate(headers: &HeaderMap, secret: Option<&str>) -> BridgeResult<()> {
    let Some(expected) = secret else {
        return Ok(());
    };
    let presented = headers
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(BridgeError::AuthRejected)?;
    if presented != expected {
        return Err(BridgeError::AuthRejected);
    }
    Ok(())
}

impl Hub {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            peers: DashMap::new(),
            next_conn: AtomicU64::new(0),
            pending: PendingTable::new(),
            current_screen: RwLock::new(None),
            events: InMemoryBus::new(64),
        })
    }

    pub fn events(&self) -> Arc<InMemoryBus<HubEvent>> {
        Arc::clone(&self.events)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn is_connected(&self, role: PeerRole) -> bool {
        self.peers.contains_key(&role)
    }

    /// Last screen the device reported through `ui_state`.
    pub fn current_screen(&self) -> Option<Fingerprint> {
        self.current_screen.read().clone()
    }

    pub fn peers(&self) -> Vec<PeerStatus> {
        let mut peers: Vec<PeerStatus> = self
            .peers
            .iter()
            .map(|entry| PeerStatus {
                role: entry.id.role,
                conn: entry.id.conn,
                device_id: entry.device_id.clone(),
            })
            .collect();
        peers.sort_by_key(|peer| peer.conn);
        peers
    }

    /// Websocket endpoints plus `GET /status`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(PeerRole::Planner.ws_path(), get(planner_socket))
            .route(PeerRole::Device.ws_path(), get(device_socket))
            .route("/status", get(status))
            .with_state(Arc::clone(self))
    }

    /// Registers a new connection for `role`, superseding any existing one.
    /// Frames queued on the returned receiver are written to the socket.
    pub fn attach_peer(
        &self,
        role: PeerRole,
    ) -> (PeerId, mpsc::UnboundedReceiver<String>, CancellationToken) {
        let id = PeerId {
            role,
            conn: self.next_conn.fetch_add(1, Ordering::Relaxed) + 1,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = PeerHandle {
            id,
            tx,
            cancel: cancel.clone(),
            device_id: None,
        };
        if let Some(previous) = self.peers.insert(role, handle) {
            info!(target: "bridge", old = %previous.id, new = %id, "peer superseded");
            previous.cancel.cancel();
            self.pending.reject_peer(previous.id);
            self.events.emit(HubEvent::PeerDisconnected(previous.id));
        }
        info!(target: "bridge", peer = %id, "peer connected");
        self.events.emit(HubEvent::PeerConnected(id));
        (id, rx, cancel)
    }

    /// Drops `peer` and fails its pending requests. A newer connection of
    /// the same role is left alone.
    pub fn detach_peer(&self, peer: PeerId) {
        let removed = self
            .peers
            .remove_if(&peer.role, |_, handle| handle.id == peer)
            .is_some();
        self.pending.reject_peer(peer);
        if removed {
            info!(target: "bridge", %peer, "peer disconnected");
            self.events.emit(HubEvent::PeerDisconnected(peer));
        }
    }

    /// Handles one text frame from `peer`, returning the direct reply if any.
    pub fn handle_inbound(&self, peer: PeerId, text: &str) -> Option<BridgeMessage> {
        let message = match BridgeMessage::from_json(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "bridge", %peer, %err, "unparseable frame");
                return Some(BridgeMessage::error(None, err.to_string()));
            }
        };
        debug!(target: "bridge", %peer, kind = message.kind(), "inbound");

        match message {
            BridgeMessage::Ping => Some(BridgeMessage::Pong),
            BridgeMessage::Pong => None,
            BridgeMessage::Register { device_id, payload } => {
                info!(
                    target: "bridge",
                    %peer,
                    %device_id,
                    device_type = %payload.device_type,
                    "peer registered"
                );
                if let Some(mut handle) = self.peers.get_mut(&peer.role) {
                    if handle.id == peer {
                        handle.device_id = Some(device_id.clone());
                    }
                }
                Some(BridgeMessage::Registered {
                    your_device_id: device_id,
                    server_time: Utc::now().timestamp_millis(),
                })
            }
            BridgeMessage::GraphUpdate { request_id, payload } => {
                let ack = GraphAckPayload {
                    nodes: payload.graph.nodes.len(),
                    edges: payload.graph.edges.len(),
                };
                info!(target: "bridge", %peer, nodes = ack.nodes, edges = ack.edges, "graph uploaded");
                self.events.emit(HubEvent::GraphUploaded(payload.graph));
                Some(BridgeMessage::GraphAck {
                    request_id,
                    payload: ack,
                })
            }
            BridgeMessage::UiState { payload } => {
                *self.current_screen.write() = Some(payload.screen_fingerprint.clone());
                self.events
                    .emit(HubEvent::ScreenReported(payload.screen_fingerprint));
                None
            }
            message if message.is_terminal() || matches!(message, BridgeMessage::ActionResult { .. }) => {
                self.pending.dispatch(message);
                None
            }
            other => {
                warn!(target: "bridge", %peer, kind = other.kind(), "message not served by hub");
                Some(BridgeMessage::error(
                    other.request_id().map(str::to_string),
                    format!("hub does not serve {}", other.kind()),
                ))
            }
        }
    }

    /// Sends a request built around a fresh request id to the `role` peer and
    /// waits for its terminal response.
    pub async fn request<F>(
        &self,
        role: PeerRole,
        build: F,
        progress: Option<mpsc::UnboundedSender<BridgeMessage>>,
    ) -> BridgeResult<BridgeMessage>
    where
        F: FnOnce(String) -> BridgeMessage,
    {
        let (peer, tx) = {
            let handle = self
                .peers
                .get(&role)
                .ok_or(BridgeError::PeerUnavailable(role))?;
            (handle.id, handle.tx.clone())
        };
        let pending = self.pending.register(peer, progress);
        let request_id = pending.request_id.clone();
        let frame = match build(request_id.clone()).to_json() {
            Ok(frame) => frame,
            Err(err) => {
                self.pending.remove(&request_id);
                return Err(err);
            }
        };
        if tx.send(frame).is_err() {
            self.pending.remove(&request_id);
            return Err(BridgeError::PeerDisconnected(role));
        }
        debug!(target: "bridge", %peer, %request_id, "request sent");
        self.pending
            .wait(pending, self.config.request_timeout())
            .await
    }

    /// Asks the planner for a path through `payload.grid`.
    pub async fn request_path(
        &self,
        payload: NavigationRequestPayload,
    ) -> BridgeResult<NavigationResultPayload> {
        let reply = self
            .request(
                PeerRole::Planner,
                |request_id| BridgeMessage::NavigationRequest {
                    request_id,
                    payload,
                },
                None,
            )
            .await?;
        match reply {
            BridgeMessage::NavigationResult { payload, .. } => Ok(payload),
            other => Err(unexpected(&other)),
        }
    }

    /// Hands a plan to the device. Each `action_result` is forwarded to
    /// `progress` as it arrives.
    pub async fn execute_plan(
        &self,
        steps: Vec<WireStep>,
        progress: Option<mpsc::UnboundedSender<BridgeMessage>>,
    ) -> BridgeResult<PlanReply> {
        let reply = self
            .request(
                PeerRole::Device,
                |request_id| BridgeMessage::ExecutePlan {
                    request_id,
                    payload: ExecutePlanPayload { steps },
                },
                progress,
            )
            .await?;
        match reply {
            BridgeMessage::PlanComplete { payload, .. } => Ok(PlanReply::Complete(payload)),
            BridgeMessage::PlanError { payload, .. } => Ok(PlanReply::Error(payload)),
            other => Err(unexpected(&other)),
        }
    }

    async fn serve(self: Arc<Self>, role: PeerRole, socket: WebSocket) {
        let (peer, mut outbound, cancel) = self.attach_peer(role);
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(target: "bridge", %peer, "closing superseded connection");
                    break;
                }
                Some(frame) = outbound.recv() => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.handle_inbound(peer, &text) {
                            match reply.to_json() {
                                Ok(frame) => {
                                    if sink.send(Message::Text(frame)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(err) => warn!(target: "bridge", %peer, %err, "reply not encodable"),
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(target: "bridge", %peer, ?frame, "closed by peer");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Err(err)) => {
                        warn!(target: "bridge", %peer, %err, "socket error");
                        break;
                    }
                    None => break,
                },
            }
        }

        let _ = sink.close().await;
        self.detach_peer(peer);
    }
}

fn unexpected(message: &BridgeMessage) -> BridgeError {
    BridgeError::Protocol(format!("unexpected {} reply", message.kind()))
}

async fn planner_socket(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    accept(hub, PeerRole::Planner, &headers, ws)
}

async fn device_socket(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    accept(hub, PeerRole::Device, &headers, ws)
}

fn accept(hub: Arc<Hub>, role: PeerRole, headers: &HeaderMap, ws: WebSocketUpgrade) -> Response {
    if let Err(err) = authenticate(headers, hub.config.secret.as_deref()) {
        warn!(target: "bridge", %role, "connection rejected: bad credentials");
        return err.into_response();
    }
    ws.on_upgrade(move |socket| hub.serve(role, socket))
}

#[derive(Serialize)]
struct StatusBody {
    peers: Vec<PeerStatus>,
    pending: usize,
    #[serde(rename = "currentScreen", skip_serializing_if = "Option::is_none")]
    current_screen: Option<Fingerprint>,
}

async fn status(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    Json(StatusBody {
        peers: hub.peers(),
        pending: hub.pending.len(),
        current_screen: hub.current_screen(),
    })
}
