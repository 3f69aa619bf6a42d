use super::types::{EventKind, SettlementEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default buffer size for each subscriber's queue.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

type Subscribers = HashMap<EventKind, Vec<(u64, mpsc::Sender<SettlementEvent>)>>;

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl Inner {
    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        // The map stays consistent across a panicking holder; keep serving.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-process publish/subscribe fan-out.
///
/// Delivery is best effort and never persisted: a subscriber whose queue is
/// full misses the event, and events published with no subscriber are lost.
/// Every consumer has a periodic pass over the Ledger Store that picks up
/// anything it missed.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one event kind. Dropping the returned
    /// [`Subscription`] deregisters it.
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        self.inner
            .subscribers()
            .entry(kind)
            .or_default()
            .push((id, tx));
        Subscription {
            id,
            kind,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber of its kind, in
    /// subscription order. Returns how many subscribers received it.
    ///
    /// A closed subscriber is pruned and a lagging one is skipped; neither
    /// affects delivery to the others.
    pub fn publish(&self, event: SettlementEvent) -> usize {
        let kind = event.kind();
        let mut subscribers = self.inner.subscribers();
        let Some(list) = subscribers.get_mut(&kind) else {
            debug!(event = %kind, "No subscribers, event dropped");
            return 0;
        };

        let mut delivered = 0;
        list.retain(|(id, tx)| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = %kind, subscriber = id, "Subscriber queue full, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(event = %kind, subscriber = id, "Pruning closed subscriber");
                false
            }
        });
        delivered
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner.subscribers().get(&kind).map_or(0, Vec::len)
    }
}

/// Receiving half of a bus subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    rx: mpsc::Receiver<SettlementEvent>,
    bus: Weak<Inner>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Wait for the next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<SettlementEvent> {
        self.rx.recv().await
    }

    /// Deregister explicitly; same as dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut subscribers = inner.subscribers();
        if let Some(list) = subscribers.get_mut(&self.kind) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}
