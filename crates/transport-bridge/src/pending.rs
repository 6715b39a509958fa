//! Pending-request table.
//!
//! Every outbound request registers a record keyed by a fresh request id
//! before it is sent. A matching terminal response settles the record; a
//! progress response is forwarded without settling it. Ids are never reused,
//! so a response arriving after its record timed out finds nothing and is
//! dropped.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{BridgeError, BridgeResult};
use crate::messages::BridgeMessage;
use crate::peer::PeerId;

type Responder = oneshot::Sender<BridgeResult<BridgeMessage>>;

struct PendingRequest {
    peer: PeerId,
    responder: Responder,
    progress: Option<mpsc::UnboundedSender<BridgeMessage>>,
}

/// What happened to an inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Resolved,
    Rejected,
    Progress,
    /// No record for the id: late, duplicate or foreign.
    Unmatched,
    /// The message is not a response.
    Uncorrelated,
}

#[derive(Default)]
pub struct PendingTable {
    inner: DashMap<String, PendingRequest>,
}

/// Receiving half of a registered request.
pub struct PendingHandle {
    pub request_id: String,
    rx: oneshot::Receiver<BridgeResult<BridgeMessage>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.inner.contains_key(request_id)
    }

    /// Creates a record for a request about to be sent to `peer`.
    pub fn register(
        &self,
        peer: PeerId,
        progress: Option<mpsc::UnboundedSender<BridgeMessage>>,
    ) -> PendingHandle {
        let request_id = Uuid::new_v4().to_string();
        let (responder, rx) = oneshot::channel();
        self.inner.insert(
            request_id.clone(),
            PendingRequest {
                peer,
                responder,
                progress,
            },
        );
        PendingHandle { request_id, rx }
    }

    /// Routes an inbound message to its pending record, if any.
    pub fn dispatch(&self, message: BridgeMessage) -> Dispatch {
        let Some(request_id) = message.request_id().map(str::to_string) else {
            return Dispatch::Uncorrelated;
        };

        if matches!(message, BridgeMessage::ActionResult { .. }) {
            let Some(entry) = self.inner.get(&request_id) else {
                debug!(target: "bridge", %request_id, "progress for unknown request dropped");
                return Dispatch::Unmatched;
            };
            if let Some(progress) = &entry.progress {
                let _ = progress.send(message);
            }
            return Dispatch::Progress;
        }

        if !message.is_terminal() {
            return Dispatch::Uncorrelated;
        }

        let Some((_, pending)) = self.inner.remove(&request_id) else {
            warn!(target: "bridge", %request_id, kind = message.kind(), "unmatched response dropped");
            return Dispatch::Unmatched;
        };

        match message {
            BridgeMessage::Error { payload, .. } => {
                let _ = pending
                    .responder
                    .send(Err(BridgeError::Rejected(payload.message)));
                Dispatch::Rejected
            }
            other => {
                let _ = pending.responder.send(Ok(other));
                Dispatch::Resolved
            }
        }
    }

    /// Fails every record waiting on `peer` with `PeerDisconnected`.
    pub fn reject_peer(&self, peer: PeerId) -> usize {
        let ids: Vec<String> = self
            .inner
            .iter()
            .filter(|entry| entry.peer == peer)
            .map(|entry| entry.key().clone())
            .collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, pending)) = self.inner.remove(&id) {
                let _ = pending
                    .responder
                    .send(Err(BridgeError::PeerDisconnected(peer.role)));
                rejected += 1;
            }
        }
        if rejected > 0 {
            warn!(target: "bridge", %peer, rejected, "pending requests rejected on disconnect");
        }
        rejected
    }

    pub fn remove(&self, request_id: &str) -> bool {
        self.inner.remove(request_id).is_some()
    }

    /// Waits for the response to `handle`. The record is removed on timeout,
    /// and also when the caller drops the returned future, polled or not.
    pub fn wait(
        &self,
        handle: PendingHandle,
        limit: Duration,
    ) -> impl Future<Output = BridgeResult<BridgeMessage>> + Send + '_ {
        let PendingHandle { request_id, rx } = handle;
        let abandon = AbandonOnDrop {
            table: self,
            request_id: request_id.clone(),
        };
        async move {
            let _abandon = abandon;
            match timeout(limit, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(BridgeError::Connection(format!(
                    "request {request_id} dropped without response"
                ))),
                Err(_) => {
                    self.remove(&request_id);
                    warn!(target: "bridge", %request_id, after_ms = limit.as_millis() as u64, "request timed out");
                    Err(BridgeError::Timeout {
                        request_id,
                        after_ms: limit.as_millis() as u64,
                    })
                }
            }
        }
    }
}

/// Clears the record of a wait that ends early. Settled records are already
/// gone, so this only ever hits abandoned ones.
struct AbandonOnDrop<'a> {
    table: &'a PendingTable,
    request_id: String,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.table.remove(&self.request_id) {
            debug!(target: "bridge", request_id = %self.request_id, "caller stopped waiting, record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{GraphAckPayload, NavigationResultPayload};
    use crate::peer::PeerRole;
    use action_flow::StepReport;
    use grid_compiler::Cell;
    use std::sync::Arc;

    const PLANNER: PeerId = PeerId {
        role: PeerRole::Planner,
        conn: 1,
    };

    fn result(request_id: &str, col: usize) -> BridgeMessage {
        BridgeMessage::NavigationResult {
            request_id: request_id.to_string(),
            payload: NavigationResultPayload {
                success: true,
                path: vec![Cell::new(0, col)],
                inference_time_ms: None,
                error: None,
            },
        }
    }

    fn path_of(message: BridgeMessage) -> Vec<Cell> {
        match message {
            BridgeMessage::NavigationResult { payload, .. } => payload.path,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_own_callers() {
        let table = Arc::new(PendingTable::new());
        let first = table.register(PLANNER, None);
        let second = table.register(PLANNER, None);
        let (first_id, second_id) = (first.request_id.clone(), second.request_id.clone());
        assert_ne!(first_id, second_id);

        let waiter_a = tokio::spawn({
            let table = table.clone();
            async move { table.wait(first, Duration::from_secs(5)).await }
        });
        let waiter_b = tokio::spawn({
            let table = table.clone();
            async move { table.wait(second, Duration::from_secs(5)).await }
        });

        assert_eq!(table.dispatch(result(&second_id, 2)), Dispatch::Resolved);
        assert_eq!(table.dispatch(result(&first_id, 1)), Dispatch::Resolved);

        assert_eq!(path_of(waiter_a.await.unwrap().unwrap()), vec![Cell::new(0, 1)]);
        assert_eq!(path_of(waiter_b.await.unwrap().unwrap()), vec![Cell::new(0, 2)]);
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_record_and_late_response_is_dropped() {
        let table = PendingTable::new();
        let handle = table.register(PLANNER, None);
        let late_id = handle.request_id.clone();

        let err = table.wait(handle, Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { ref request_id, after_ms: 30_000 } if *request_id == late_id));
        assert!(!table.contains(&late_id));

        let fresh = table.register(PLANNER, None);
        assert_eq!(table.dispatch(result(&late_id, 9)), Dispatch::Unmatched);
        assert!(table.contains(&fresh.request_id));
        assert_eq!(table.dispatch(result(&fresh.request_id, 1)), Dispatch::Resolved);
        assert_eq!(path_of(table.wait(fresh, Duration::from_secs(1)).await.unwrap()), vec![Cell::new(0, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_leaves_no_record() {
        let table = PendingTable::new();
        let handle = table.register(PLANNER, None);
        let id = handle.request_id.clone();
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = table.wait(handle, Duration::from_secs(30)) => panic!("wait should lose to cancel"),
        }

        assert!(!table.contains(&id));
        assert!(table.is_empty());
        assert_eq!(table.dispatch(result(&id, 4)), Dispatch::Unmatched);
    }

    #[tokio::test]
    async fn error_message_rejects() {
        let table = PendingTable::new();
        let handle = table.register(PLANNER, None);
        let id = handle.request_id.clone();
        let dispatch = table.dispatch(BridgeMessage::error(Some(id), "grid too large"));
        assert_eq!(dispatch, Dispatch::Rejected);
        assert_eq!(
            table.wait(handle, Duration::from_secs(1)).await,
            Err(BridgeError::Rejected("grid too large".into()))
        );
    }

    #[tokio::test]
    async fn disconnect_rejects_only_that_peer() {
        let table = PendingTable::new();
        let device = PeerId {
            role: PeerRole::Device,
            conn: 7,
        };
        let planner_req = table.register(PLANNER, None);
        let device_req = table.register(device, None);

        assert_eq!(table.reject_peer(PLANNER), 1);
        assert_eq!(
            table.wait(planner_req, Duration::from_secs(1)).await,
            Err(BridgeError::PeerDisconnected(PeerRole::Planner))
        );
        assert!(table.contains(&device_req.request_id));
    }

    #[tokio::test]
    async fn progress_is_forwarded_without_settling() {
        let table = PendingTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let device = PeerId {
            role: PeerRole::Device,
            conn: 2,
        };
        let handle = table.register(device, Some(tx));
        let id = handle.request_id.clone();

        let progress = BridgeMessage::ActionResult {
            request_id: id.clone(),
            payload: StepReport {
                step_index: 0,
                success: true,
                new_fingerprint: None,
                error: None,
            },
        };
        assert_eq!(table.dispatch(progress.clone()), Dispatch::Progress);
        assert_eq!(rx.recv().await, Some(progress));
        assert!(table.contains(&id));

        let ack = BridgeMessage::GraphAck {
            request_id: id,
            payload: GraphAckPayload { nodes: 3, edges: 2 },
        };
        assert_eq!(table.dispatch(ack.clone()), Dispatch::Resolved);
        assert_eq!(table.wait(handle, Duration::from_secs(1)).await, Ok(ack));
        assert_eq!(table.dispatch(BridgeMessage::Ping), Dispatch::Uncorrelated);
    }
}
