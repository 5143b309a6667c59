//! Async message bus carrying inbound events from channels to the gateway.
//!
//! Channels publish onto a single bounded queue; the gateway drains it in
//! arrival order, which is what gives each user strict event ordering.

use crate::error::{BusError, BusResult};
use crate::events::InboundEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

/// Default capacity for the inbound queue.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Async message bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<MessageBusInner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus").finish_non_exhaustive()
    }
}

struct MessageBusInner {
    /// Inbound event queue (channels → gateway).
    inbound_tx: mpsc::Sender<InboundEvent>,
    inbound_rx: Mutex<mpsc::Receiver<InboundEvent>>,

    inbound_count: AtomicU64,
    consumed_count: AtomicU64,
}

/// Message bus statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Total inbound events published.
    pub inbound_count: u64,
    /// Total inbound events consumed.
    pub consumed_count: u64,
}

impl MessageBus {
    /// Create a new message bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a new message bus with the given queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(MessageBusInner {
                inbound_tx,
                inbound_rx: Mutex::new(inbound_rx),
                inbound_count: AtomicU64::new(0),
                consumed_count: AtomicU64::new(0),
            }),
        }
    }

    /// Publish an inbound event.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InboundClosed`] when the queue has been closed.
    pub async fn publish_inbound(&self, event: InboundEvent) -> BusResult<()> {
        trace!(
            channel = %event.channel,
            user = %event.user_id,
            "publishing inbound event"
        );

        self.inner
            .inbound_tx
            .send(event)
            .await
            .map_err(|_| BusError::InboundClosed)?;

        self.inner.inbound_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Consume the next inbound event.
    ///
    /// Returns `None` when every sender has been dropped.
    pub async fn consume_inbound(&self) -> Option<InboundEvent> {
        let event = self.inner.inbound_rx.lock().await.recv().await;
        if event.is_some() {
            self.inner.consumed_count.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Consume the next inbound event, giving up after `timeout`.
    pub async fn consume_inbound_timeout(&self, timeout: Duration) -> Option<InboundEvent> {
        let mut rx = self.inner.inbound_rx.lock().await;
        let event = tokio::time::timeout(timeout, rx.recv()).await.ok().flatten();
        if event.is_some() {
            self.inner.consumed_count.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            inbound_count: self.inner.inbound_count.load(Ordering::Relaxed),
            consumed_count: self.inner.consumed_count.load(Ordering::Relaxed),
        }
    }

    /// Lightweight handle for channels that only publish.
    #[must_use]
    pub fn inbound_handle(&self) -> InboundHandle {
        InboundHandle {
            tx: self.inner.inbound_tx.clone(),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight handle for publishing inbound events.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    tx: mpsc::Sender<InboundEvent>,
}

impl InboundHandle {
    /// Publish an inbound event.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InboundClosed`] when the queue has been closed.
    pub async fn publish(&self, event: InboundEvent) -> BusResult<()> {
        self.tx.send(event).await.map_err(|_| BusError::InboundClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inbound_event_flow() {
        let bus = MessageBus::new();

        let event = InboundEvent::message("test", "sender1", "chat1", "Hello");
        bus.publish_inbound(event).await.unwrap();

        let received = bus
            .consume_inbound_timeout(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(received.text(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_events_keep_arrival_order() {
        let bus = MessageBus::new();
        let handle = bus.inbound_handle();

        for n in 0..5 {
            handle
                .publish(InboundEvent::message("test", "u", "c", n.to_string()))
                .await
                .unwrap();
        }

        for n in 0..5 {
            let event = bus.consume_inbound().await.unwrap();
            assert_eq!(event.text(), Some(n.to_string().as_str()));
        }
    }

    #[tokio::test]
    async fn test_consume_timeout_on_empty_bus() {
        let bus = MessageBus::new();
        assert!(
            bus.consume_inbound_timeout(Duration::from_millis(10))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundEvent::message("test", "s", "c", "in"))
            .await
            .unwrap();
        bus.consume_inbound().await;

        let stats = bus.stats();
        assert_eq!(stats.inbound_count, 1);
        assert_eq!(stats.consumed_count, 1);
    }
}
