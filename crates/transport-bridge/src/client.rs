//! Reconnecting client: the initiating side of the bridge.
//!
//! The connection lifecycle is driven by [`ConnectionFsm`]; this module only
//! performs the effects it asks for. Inbound requests are handed to a
//! [`RequestHandler`] on their own task so a slow plan never blocks pings or
//! other responses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wayfinder_event_bus::InMemoryBus;

use crate::errors::{BridgeError, BridgeResult};
use crate::fsm::{ConnectionEvent, ConnectionFsm, ConnectionState, Effect};
use crate::hub::AUTH_HEADER;
use crate::keepalive::{Beat, KeepAlive};
use crate::messages::{BridgeMessage, RegisterPayload};
use crate::peer::{PeerId, PeerRole};
use crate::pending::{Dispatch, PendingTable};
use crate::BridgeConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves requests the hub sends to this agent.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produces the terminal reply for `request`. Progress messages may be
    /// sent through `link` before returning.
    async fn handle(&self, request: BridgeMessage, link: BridgeLink) -> BridgeMessage;

    /// Called on its own task after every successful (re)connect.
    async fn on_connected(&self, _link: BridgeLink) {}
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub role: PeerRole,
    pub device_id: String,
    pub device_type: String,
    /// Extra fields sent with `register`.
    pub capabilities: Map<String, Value>,
    pub bridge: BridgeConfig,
}

impl ClientConfig {
    pub fn new(role: PeerRole, bridge: BridgeConfig) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            role,
            device_id: format!("{role}-{}", &suffix[..8]),
            device_type: role.as_str().to_string(),
            capabilities: Map::new(),
            bridge,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>, device_type: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self.device_type = device_type.into();
        self
    }

    /// Hub base url joined with the role's websocket path.
    pub fn endpoint(&self) -> String {
        let base = self.bridge.hub_url.trim_end_matches('/');
        let path = self.role.ws_path();
        if base.ends_with(path) {
            base.to_string()
        } else {
            format!("{base}{path}")
        }
    }
}

#[derive(Clone)]
struct Session {
    peer: PeerId,
    tx: mpsc::UnboundedSender<String>,
}

struct LinkInner {
    session: RwLock<Option<Session>>,
    pending: PendingTable,
    request_timeout: Duration,
}

/// Cloneable handle for sending over the current connection. Survives
/// reconnects; sends fail while no connection is up.
#[derive(Clone)]
pub struct BridgeLink {
    inner: Arc<LinkInner>,
}

impl BridgeLink {
    fn new(request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                session: RwLock::new(None),
                pending: PendingTable::new(),
                request_timeout,
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.read().is_some()
    }

    pub fn pending(&self) -> &PendingTable {
        &self.inner.pending
    }

    pub fn send(&self, message: &BridgeMessage) -> BridgeResult<()> {
        let session = self.current()?;
        let frame = message.to_json()?;
        session
            .tx
            .send(frame)
            .map_err(|_| BridgeError::PeerDisconnected(session.peer.role))
    }

    /// Sends a request carrying a fresh request id and waits for the
    /// terminal response.
    pub async fn request<F>(&self, build: F) -> BridgeResult<BridgeMessage>
    where
        F: FnOnce(String) -> BridgeMessage,
    {
        let session = self.current()?;
        let pending = self.inner.pending.register(session.peer, None);
        let request_id = pending.request_id.clone();
        let sent = build(request_id.clone())
            .to_json()
            .and_then(|frame| {
                session
                    .tx
                    .send(frame)
                    .map_err(|_| BridgeError::PeerDisconnected(session.peer.role))
            });
        if let Err(err) = sent {
            self.inner.pending.remove(&request_id);
            return Err(err);
        }
        self.inner
            .pending
            .wait(pending, self.inner.request_timeout)
            .await
    }

    fn current(&self) -> BridgeResult<Session> {
        self.inner
            .session
            .read()
            .clone()
            .ok_or_else(|| BridgeError::Connection("not connected".to_string()))
    }

    fn attach(&self, peer: PeerId, tx: mpsc::UnboundedSender<String>) {
        *self.inner.session.write() = Some(Session { peer, tx });
    }

    fn detach(&self) -> Option<PeerId> {
        self.inner.session.write().take().map(|session| session.peer)
    }
}

pub struct BridgeClient {
    config: ClientConfig,
    handler: Arc<dyn RequestHandler>,
    link: BridgeLink,
    states: Arc<InMemoryBus<ConnectionState>>,
    sessions: AtomicU64,
}

impl BridgeClient {
    pub fn new(config: ClientConfig, handler: Arc<dyn RequestHandler>) -> Self {
        let link = BridgeLink::new(config.bridge.request_timeout());
        Self {
            config,
            handler,
            link,
            states: InMemoryBus::new(16),
            sessions: AtomicU64::new(0),
        }
    }

    pub fn link(&self) -> BridgeLink {
        self.link.clone()
    }

    /// Connection state changes, in order.
    pub fn states(&self) -> Arc<InMemoryBus<ConnectionState>> {
        Arc::clone(&self.states)
    }

    /// Connects and keeps reconnecting until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) {
        let mut fsm = ConnectionFsm::new(self.config.bridge.reconnect_delay());
        let mut next = Some(ConnectionEvent::Start);
        let mut socket: Option<Socket> = None;

        while let Some(event) = next.take() {
            let mut keepalive = false;
            let mut register = false;
            for effect in fsm.handle(event) {
                match effect {
                    Effect::Publish(state) => {
                        debug!(target: "bridge", ?state, "connection state");
                        self.states.emit(state);
                    }
                    Effect::Connect => {
                        next = Some(tokio::select! {
                            _ = cancel.cancelled() => ConnectionEvent::Stop,
                            result = self.connect() => match result {
                                Ok(ws) => {
                                    socket = Some(ws);
                                    ConnectionEvent::Connected
                                }
                                Err(BridgeError::AuthRejected) => {
                                    error!(target: "bridge", endpoint = %self.config.endpoint(), "hub rejected credentials");
                                    ConnectionEvent::AuthRejected
                                }
                                Err(err) => {
                                    warn!(target: "bridge", endpoint = %self.config.endpoint(), %err, "connect failed");
                                    ConnectionEvent::ConnectFailed
                                }
                            },
                        });
                    }
                    Effect::ScheduleReconnect(delay) => {
                        info!(target: "bridge", delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                        next = Some(tokio::select! {
                            _ = cancel.cancelled() => ConnectionEvent::Stop,
                            _ = sleep(delay) => ConnectionEvent::Start,
                        });
                    }
                    Effect::RejectPending => {
                        if let Some(peer) = self.link.detach() {
                            self.link.pending().reject_peer(peer);
                        }
                    }
                    Effect::StartKeepAlive => keepalive = true,
                    Effect::SendRegister => register = true,
                    Effect::StopKeepAlive => {}
                }
            }

            if fsm.state() == ConnectionState::Connected {
                if let Some(ws) = socket.take() {
                    next = Some(self.session(ws, keepalive, register, cancel).await);
                }
            }
        }
        info!(target: "bridge", role = %self.config.role, "client stopped");
    }

    async fn connect(&self) -> BridgeResult<Socket> {
        let endpoint = self.config.endpoint();
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|err| BridgeError::Connection(err.to_string()))?;
        if let Some(secret) = &self.config.bridge.secret {
            let value = HeaderValue::from_str(secret)
                .map_err(|err| BridgeError::Connection(err.to_string()))?;
            request.headers_mut().insert(AUTH_HEADER, value);
        }

        let limit = self.config.bridge.request_timeout();
        match timeout(limit, connect_async(request)).await {
            Ok(Ok((socket, _response))) => {
                info!(target: "bridge", %endpoint, "connected");
                Ok(socket)
            }
            Ok(Err(WsError::Http(response))) if response.status() == StatusCode::UNAUTHORIZED => {
                Err(BridgeError::AuthRejected)
            }
            Ok(Err(err)) => Err(BridgeError::Connection(err.to_string())),
            Err(_) => Err(BridgeError::Connection(format!(
                "handshake timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }

    async fn session(
        &self,
        ws: Socket,
        keepalive_enabled: bool,
        register: bool,
        cancel: &CancellationToken,
    ) -> ConnectionEvent {
        let peer = PeerId {
            role: self.config.role,
            conn: self.sessions.fetch_add(1, Ordering::Relaxed) + 1,
        };
        let (tx, mut outbound) = mpsc::unbounded_channel();
        self.link.attach(peer, tx);
        let (mut sink, mut stream) = ws.split();

        if register {
            match self.register_message().to_json() {
                Ok(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        return ConnectionEvent::Lost;
                    }
                }
                Err(err) => warn!(target: "bridge", %err, "register not encodable"),
            }
        }

        tokio::spawn({
            let handler = Arc::clone(&self.handler);
            let link = self.link.clone();
            async move { handler.on_connected(link).await }
        });

        let period = self.config.bridge.ping_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keepalive = KeepAlive::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return ConnectionEvent::Stop;
                }
                Some(frame) = outbound.recv() => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        return ConnectionEvent::Lost;
                    }
                }
                _ = ticker.tick(), if keepalive_enabled => match keepalive.tick() {
                    Beat::SendPing => {
                        let ping = BridgeMessage::Ping.to_json().unwrap_or_default();
                        if sink.send(Message::Text(ping)).await.is_err() {
                            return ConnectionEvent::Lost;
                        }
                    }
                    Beat::Dead => {
                        warn!(target: "bridge", %peer, "no pong within one interval, dropping link");
                        return ConnectionEvent::Lost;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.on_frame(&text, &mut keepalive),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(target: "bridge", %peer, ?frame, "hub closed connection");
                        return ConnectionEvent::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(target: "bridge", %peer, %err, "socket error");
                        return ConnectionEvent::Lost;
                    }
                    None => return ConnectionEvent::Lost,
                },
            }
        }
    }

    fn on_frame(&self, text: &str, keepalive: &mut KeepAlive) {
        let message = match BridgeMessage::from_json(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "bridge", %err, "unparseable frame from hub");
                return;
            }
        };

        match message {
            BridgeMessage::Ping => {
                if let Err(err) = self.link.send(&BridgeMessage::Pong) {
                    debug!(target: "bridge", %err, "pong not sent");
                }
            }
            BridgeMessage::Pong => keepalive.on_pong(),
            BridgeMessage::Registered {
                your_device_id,
                server_time,
            } => {
                info!(target: "bridge", device_id = %your_device_id, server_time, "registered with hub");
            }
            request if request.is_request() => {
                let handler = Arc::clone(&self.handler);
                let link = self.link.clone();
                tokio::spawn(async move {
                    let kind = request.kind();
                    let reply = handler.handle(request, link.clone()).await;
                    if let Err(err) = link.send(&reply) {
                        warn!(target: "bridge", kind, %err, "reply not delivered");
                    }
                });
            }
            other => {
                let kind = other.kind();
                if self.link.pending().dispatch(other) == Dispatch::Uncorrelated {
                    warn!(target: "bridge", kind, "uncorrelated message from hub");
                }
            }
        }
    }

    fn register_message(&self) -> BridgeMessage {
        let mut capabilities = self.config.capabilities.clone();
        capabilities.insert("role".to_string(), Value::from(self.config.role.as_str()));
        BridgeMessage::Register {
            device_id: self.config.device_id.clone(),
            payload: RegisterPayload {
                device_type: self.config.device_type.clone(),
                capabilities,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_role_path_once() {
        let mut config = ClientConfig::new(PeerRole::Planner, BridgeConfig::default());
        config.bridge.hub_url = "ws://hub:8765/".into();
        assert_eq!(config.endpoint(), "ws://hub:8765/ws/planner");
        config.bridge.hub_url = "ws://hub:8765/ws/planner".into();
        assert_eq!(config.endpoint(), "ws://hub:8765/ws/planner");
    }

    #[test]
    fn device_id_defaults_to_role_prefix() {
        let config = ClientConfig::new(PeerRole::Device, BridgeConfig::default());
        assert!(config.device_id.starts_with("device-"));
        let named = config.with_device("pixel-7", "android");
        assert_eq!(named.device_id, "pixel-7");
    }

    #[tokio::test]
    async fn link_without_session_refuses_to_send() {
        let link = BridgeLink::new(Duration::from_secs(1));
        assert!(!link.is_connected());
        assert!(matches!(link.send(&BridgeMessage::Ping), Err(BridgeError::Connection(_))));
        let result = link.request(|_| BridgeMessage::Ping).await;
        assert!(matches!(result, Err(BridgeError::Connection(_))));
        assert!(link.pending().is_empty());
    }

    #[tokio::test]
    async fn link_request_resolves_through_pending_table() {
        let link = BridgeLink::new(Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let peer = PeerId {
            role: PeerRole::Device,
            conn: 1,
        };
        link.attach(peer, tx);

        let responder = tokio::spawn({
            let link = link.clone();
            async move {
                let frame = rx.recv().await.unwrap();
                let request = BridgeMessage::from_json(&frame).unwrap();
                let ack = BridgeMessage::GraphAck {
                    request_id: request.request_id().unwrap().to_string(),
                    payload: crate::messages::GraphAckPayload { nodes: 1, edges: 0 },
                };
                link.pending().dispatch(ack)
            }
        });

        let reply = link
            .request(|request_id| BridgeMessage::GraphUpdate {
                request_id,
                payload: crate::messages::GraphUpdatePayload {
                    graph: nav_graph::NavGraph::default().to_snapshot(),
                },
            })
            .await
            .unwrap();
        assert_eq!(reply.kind(), "graph_ack");
        assert_eq!(responder.await.unwrap(), Dispatch::Resolved);

        assert_eq!(link.detach(), Some(peer));
        assert!(!link.is_connected());
    }
}
