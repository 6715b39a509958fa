//! Typed event fan-out.
//!
//! Components publish state changes (explorer phase, connection state, hub
//! events) on a bus; any number of observers subscribe independently, so a
//! late subscriber never replaces an earlier one.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// In-memory broadcast bus.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    /// Publishes without caring whether anyone listens.
    pub fn emit(&self, event: E) {
        if self.sender.send(event).is_err() {
            trace!(target: "event-bus", "event dropped, no subscribers");
        }
    }

    /// Events emitted from now on. A receiver that falls more than the bus
    /// capacity behind sees `Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = InMemoryBus::<u32>::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(7);

        assert_eq!(first.recv().await.unwrap(), 7);
        assert_eq!(second.recv().await.unwrap(), 7);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = InMemoryBus::<&'static str>::new(4);
        bus.emit("lost");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = InMemoryBus::<u8>::new(4);
        bus.emit(1);
        let mut rx = bus.subscribe();
        bus.emit(2);
        assert_eq!(rx.recv().await.unwrap(), 2);
    }
}
