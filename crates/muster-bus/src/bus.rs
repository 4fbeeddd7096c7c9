use muster_core::{BusEvent, EventKind, MusterResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Token identifying one subscription, returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&BusEvent) -> MusterResult<()> + Send + Sync>;

/// Synchronous in-process pub/sub keyed by [`EventKind`].
///
/// Subscribers for a kind are invoked in subscription order, on the
/// publishing thread, before `publish` returns. A handler that returns an
/// error is logged and skipped; it never stops delivery to later handlers.
///
/// Handlers run outside the internal lock, so a handler may subscribe,
/// unsubscribe, or publish again without deadlocking. Subscriptions made
/// during a delivery take effect from the next publish.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a handler for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) -> MusterResult<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        tracing::debug!(kind = %kind, subscription = id.0, "Subscriber registered");
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered
    /// under that kind.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write();
        let Some(handlers) = subs.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(sub_id, _)| *sub_id != id);
        let removed = handlers.len() < before;
        if handlers.is_empty() {
            subs.remove(&kind);
        }
        removed
    }

    /// Deliver an event to every current subscriber of its kind.
    ///
    /// Returns the number of handlers invoked. Handler errors are logged
    /// and do not interrupt the fan-out.
    pub fn publish(&self, event: &BusEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(SubscriptionId, Handler)> = {
            let subs = self.subscribers.read();
            subs.get(&kind)
                .map(|handlers| {
                    handlers
                        .iter()
                        .map(|(id, h)| (*id, Arc::clone(h)))
                        .collect()
                })
                .unwrap_or_default()
        };
        for (id, handler) in &snapshot {
            if let Err(e) = handler(event) {
                tracing::warn!(kind = %kind, subscription = id.0, error = %e, "Event handler failed");
            }
        }
        snapshot.len()
    }

    /// Number of subscribers currently registered for a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .get(&kind)
            .map_or(0, std::vec::Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
