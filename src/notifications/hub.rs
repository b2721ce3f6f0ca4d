use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::events::HubEvent;
use crate::ticket::TicketRecord;

/// Identifies one subscribed observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Fan-out broadcaster for workflow events.
///
/// Every observer owns a bounded queue. Sending never waits: an observer
/// whose queue is closed or full is removed and the others still receive
/// the event.
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<HubEvent>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("observers", &self.observer_count())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}

impl NotificationHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                observers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    fn observers(&self) -> MutexGuard<'_, HashMap<ObserverId, mpsc::Sender<HubEvent>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.inner
            .observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new observer. Events broadcast from now on are queued for it.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_buffer(self.inner.buffer)
    }

    /// Like `subscribe`, with a queue sized for this observer alone
    pub fn subscribe_with_buffer(&self, buffer: usize) -> Subscription {
        let id = ObserverId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        self.observers().insert(id, sender);
        debug!(observer = id.0, buffer, "Observer subscribed");
        Subscription {
            id,
            initial: None,
            receiver,
        }
    }

    /// Remove an observer; returns false if it was already gone
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.observers().remove(&id).is_some();
        if removed {
            debug!(observer = id.0, "Observer unsubscribed");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers().len()
    }

    /// Deliver `event` to every observer, dropping the ones that cannot take it
    pub fn broadcast(&self, event: HubEvent) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut observers = self.observers();

        observers.retain(|id, sender| match sender.try_send(event.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(observer = id.0, "Observer disconnected, dropping");
                report.dropped += 1;
                false
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    observer = id.0,
                    event = event.kind(),
                    "Observer queue full, dropping"
                );
                report.dropped += 1;
                false
            }
        });

        report
    }
}

/// Handle returned by `subscribe`
#[derive(Debug)]
pub struct Subscription {
    id: ObserverId,
    initial: Option<HubEvent>,
    receiver: mpsc::Receiver<HubEvent>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Queue the initial snapshot ahead of any live event
    pub(crate) fn prime(&mut self, tickets: Vec<TicketRecord>) {
        self.initial = Some(HubEvent::InitialState { tickets });
    }

    /// Next event; `None` once the observer has been dropped by the hub
    pub async fn recv(&mut self) -> Option<HubEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        self.receiver.try_recv().ok()
    }
}
