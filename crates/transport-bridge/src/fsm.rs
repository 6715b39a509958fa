//! Connection lifecycle of the initiating side.
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected`. The machine is
//! pure: it only returns the effects a transition asks for, and the client
//! performs them. Reconnect timing is an effect too, so transitions can be
//! driven in tests without any clock.

use std::time::Duration;

use serde::Serialize;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Start,
    Connected,
    ConnectFailed,
    AuthRejected,
    /// Socket closed, read error or missed pong.
    Lost,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Connect,
    ScheduleReconnect(Duration),
    RejectPending,
    StartKeepAlive,
    StopKeepAlive,
    SendRegister,
    Publish(ConnectionState),
}

#[derive(Debug)]
pub struct ConnectionFsm {
    state: ConnectionState,
    reconnect_delay: Duration,
    stopped: bool,
    failures: u32,
}

impl ConnectionFsm {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_delay,
            stopped: false,
            failures: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Consecutive failed connect attempts since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        use ConnectionEvent as Ev;
        use ConnectionState as St;

        match (self.state, event) {
            (_, Ev::Stop) => {
                self.stopped = true;
                let mut effects = Vec::new();
                if self.state == St::Connected {
                    effects.extend([Effect::StopKeepAlive, Effect::RejectPending]);
                }
                if self.state != St::Disconnected {
                    effects.push(self.enter(St::Disconnected));
                }
                effects
            }
            (St::Disconnected, Ev::Start) => {
                self.stopped = false;
                vec![self.enter(St::Connecting), Effect::Connect]
            }
            (St::Connecting, Ev::Connected) => {
                self.failures = 0;
                vec![
                    self.enter(St::Connected),
                    Effect::StartKeepAlive,
                    Effect::SendRegister,
                ]
            }
            (St::Connecting, Ev::ConnectFailed | Ev::AuthRejected) => {
                self.failures += 1;
                vec![
                    self.enter(St::Disconnected),
                    Effect::ScheduleReconnect(self.reconnect_delay),
                ]
            }
            (St::Connected, Ev::Lost) => vec![
                Effect::StopKeepAlive,
                Effect::RejectPending,
                self.enter(St::Disconnected),
                Effect::ScheduleReconnect(self.reconnect_delay),
            ],
            (state, event) => {
                trace!(target: "bridge", ?state, ?event, "event ignored");
                Vec::new()
            }
        }
    }

    fn enter(&mut self, next: ConnectionState) -> Effect {
        self.state = next;
        Effect::Publish(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(5);

    #[test]
    fn connects_and_starts_session() {
        let mut fsm = ConnectionFsm::new(DELAY);
        assert_eq!(
            fsm.handle(ConnectionEvent::Start),
            vec![Effect::Publish(ConnectionState::Connecting), Effect::Connect]
        );
        assert_eq!(
            fsm.handle(ConnectionEvent::Connected),
            vec![
                Effect::Publish(ConnectionState::Connected),
                Effect::StartKeepAlive,
                Effect::SendRegister
            ]
        );
        assert_eq!(fsm.state(), ConnectionState::Connected);
    }

    #[test]
    fn lost_connection_rejects_pending_then_reconnects() {
        let mut fsm = ConnectionFsm::new(DELAY);
        fsm.handle(ConnectionEvent::Start);
        fsm.handle(ConnectionEvent::Connected);

        let effects = fsm.handle(ConnectionEvent::Lost);
        assert_eq!(
            effects,
            vec![
                Effect::StopKeepAlive,
                Effect::RejectPending,
                Effect::Publish(ConnectionState::Disconnected),
                Effect::ScheduleReconnect(DELAY)
            ]
        );
        assert_eq!(
            fsm.handle(ConnectionEvent::Start),
            vec![Effect::Publish(ConnectionState::Connecting), Effect::Connect]
        );
    }

    #[test]
    fn auth_rejection_retries_with_fixed_delay() {
        let mut fsm = ConnectionFsm::new(DELAY);
        for attempt in 1..=3 {
            fsm.handle(ConnectionEvent::Start);
            let effects = fsm.handle(ConnectionEvent::AuthRejected);
            assert_eq!(effects.last(), Some(&Effect::ScheduleReconnect(DELAY)));
            assert_eq!(fsm.failures(), attempt);
        }
        fsm.handle(ConnectionEvent::Start);
        fsm.handle(ConnectionEvent::Connected);
        assert_eq!(fsm.failures(), 0);
    }

    #[test]
    fn stop_is_terminal_until_started_again() {
        let mut fsm = ConnectionFsm::new(DELAY);
        fsm.handle(ConnectionEvent::Start);
        fsm.handle(ConnectionEvent::Connected);
        let effects = fsm.handle(ConnectionEvent::Stop);
        assert!(effects.contains(&Effect::RejectPending));
        assert!(!effects.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))));
        assert!(fsm.is_stopped());

        assert!(fsm.handle(ConnectionEvent::Lost).is_empty());
        assert!(fsm.handle(ConnectionEvent::Stop).is_empty());
    }

    #[test]
    fn stray_events_are_ignored() {
        let mut fsm = ConnectionFsm::new(DELAY);
        assert!(fsm.handle(ConnectionEvent::Connected).is_empty());
        assert!(fsm.handle(ConnectionEvent::Lost).is_empty());
        assert_eq!(fsm.state(), ConnectionState::Disconnected);
    }
}
