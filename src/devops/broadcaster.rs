use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

use super::event::PipelineEvent;
use super::subscription::{SubscriberId, Subscription};

/// Default mailbox size per subscriber
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// Live subscribers, keyed by id.
///
/// A blocking lock: unsubscribe runs from `Drop` and publish is called from
/// synchronous pipeline workers, neither of which can await.
pub(crate) struct Registry {
    clients: RwLock<HashMap<SubscriberId, mpsc::Sender<PipelineEvent>>>,
    // Only flipped while holding the write lock.
    closed: AtomicBool,
}

impl Registry {
    fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated,
    // so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriberId, mpsc::Sender<PipelineEvent>>> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriberId, mpsc::Sender<PipelineEvent>>> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.read().contains_key(&id)
    }

    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.write().remove(&id).is_some();
        if removed {
            debug!(subscriber_id = %id, "subscriber removed");
        }
        removed
    }
}

/// Fans pipeline events out to every connected observer.
///
/// Publishing never waits: each subscriber gets one `try_send`, and a full
/// mailbox just misses the event.
#[derive(Clone)]
pub struct LogBroadcaster {
    registry: Arc<Registry>,
    capacity: usize,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// Broadcaster whose mailboxes hold `capacity` events (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new observer with its own empty mailbox.
    ///
    /// After [`close_all`](Self::close_all) the returned subscription is
    /// already closed: it is never registered and `recv` yields `None`.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriberId::new();

        {
            let mut clients = self.registry.write();
            if self.registry.closed.load(Ordering::Acquire) {
                warn!(subscriber_id = %id, "broadcaster is shut down, subscription closed");
                drop(tx);
            } else {
                clients.insert(id, tx);
                debug!(subscriber_id = %id, "subscriber registered");
            }
        }

        Subscription::new(id, rx, Arc::downgrade(&self.registry))
    }

    /// Remove an observer. Unknown or already-removed ids are ignored.
    ///
    /// Returns whether a registration was actually removed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.registry.remove(id)
    }

    /// Offer `event` to every subscriber without waiting on any of them
    pub fn publish(&self, event: PipelineEvent) {
        let event = event.stamped();
        let clients = self.registry.read();

        for (id, tx) in clients.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!(
                        subscriber_id = %id,
                        pipeline_id = event.pipeline_id,
                        "mailbox full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(subscriber_id = %id, "mailbox closed, skipping");
                }
            }
        }
    }

    pub fn publish_log(&self, pipeline_id: u64, content: impl Into<String>) {
        self.publish(PipelineEvent::log(pipeline_id, content));
    }

    pub fn publish_status(&self, pipeline_id: u64, status: impl Into<String>) {
        self.publish(PipelineEvent::status(pipeline_id, status));
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.read().len()
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.registry.closed.load(Ordering::Acquire)
    }

    /// Shut the broadcaster down: drop every registration and refuse new
    /// ones. Open sessions see their subscription end and stop.
    pub fn close_all(&self) {
        let removed = {
            let mut clients = self.registry.write();
            self.registry.closed.store(true, Ordering::Release);
            let count = clients.len();
            clients.clear();
            count
        };
        info!(subscribers = removed, "broadcaster closed all subscriptions");
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devops::EventKind;
    use std::time::{Duration, Instant};

    fn drain(sub: &mut Subscription) -> Vec<PipelineEvent> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn test_fan_out_to_every_subscriber() {
        let broadcaster = LogBroadcaster::new();
        let mut subs: Vec<_> = (0..3).map(|_| broadcaster.subscribe()).collect();

        broadcaster.publish_status(42, "running");

        for sub in subs.iter_mut() {
            let received = drain(sub);
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].kind, EventKind::Status);
            assert_eq!(received[0].pipeline_id, 42);
            assert_eq!(received[0].content, "running");
        }
    }

    #[test]
    fn test_subscriptions_are_distinct() {
        let broadcaster = LogBroadcaster::new();
        let a = broadcaster.subscribe();
        let b = broadcaster.subscribe();

        assert_ne!(a.id(), b.id());
        assert_eq!(broadcaster.subscriber_count(), 2);
    }

    #[test]
    fn test_full_mailbox_drops_newest() {
        let broadcaster = LogBroadcaster::with_capacity(100);
        let mut sub = broadcaster.subscribe();

        for i in 0..101 {
            broadcaster.publish_log(1, format!("line {}", i));
        }

        let received = drain(&mut sub);
        assert_eq!(received.len(), 100);
        assert_eq!(received[0].content, "line 0");
        assert_eq!(received[99].content, "line 99");
    }

    #[test]
    fn test_saturated_subscriber_does_not_starve_others() {
        let broadcaster = LogBroadcaster::with_capacity(100);
        let stalled = broadcaster.subscribe();
        let mut healthy = broadcaster.subscribe();

        for i in 0..100 {
            broadcaster.publish_log(1, format!("fill {}", i));
        }
        assert_eq!(stalled.pending(), 100);
        drain(&mut healthy);

        broadcaster.publish_status(1, "success");

        let received = drain(&mut healthy);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "success");
        assert_eq!(stalled.pending(), 100);
    }

    fn time_publishes(broadcaster: &LogBroadcaster, rounds: usize) -> Duration {
        let started = Instant::now();
        for i in 0..rounds {
            broadcaster.publish_log(9, format!("{}", i));
        }
        started.elapsed()
    }

    #[test]
    fn test_publish_cost_independent_of_stalled_consumers() {
        const SUBSCRIBERS: usize = 50;
        const ROUNDS: usize = 2_000;

        // Every mailbox has room for the whole run.
        let roomy = LogBroadcaster::with_capacity(ROUNDS);
        let _roomy_subs: Vec<_> = (0..SUBSCRIBERS).map(|_| roomy.subscribe()).collect();
        let baseline = time_publishes(&roomy, ROUNDS);

        // Every mailbox is full after the first event and nobody drains.
        let stalled = LogBroadcaster::with_capacity(1);
        let stalled_subs: Vec<_> = (0..SUBSCRIBERS).map(|_| stalled.subscribe()).collect();
        let saturated = time_publishes(&stalled, ROUNDS);

        assert!(stalled_subs.iter().all(|sub| sub.pending() == 1));
        assert!(
            saturated <= baseline * 4 + Duration::from_millis(250),
            "stalled run took {:?}, deliverable run {:?}",
            saturated,
            baseline
        );
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let broadcaster = LogBroadcaster::new();
        let keep = broadcaster.subscribe();
        let sub = broadcaster.subscribe();
        let id = sub.id();

        assert!(broadcaster.unsubscribe(id));
        assert!(!broadcaster.unsubscribe(id));
        drop(sub);

        assert_eq!(broadcaster.subscriber_count(), 1);
        assert!(keep.is_active());
    }

    #[test]
    fn test_publish_after_disconnect() {
        let broadcaster = LogBroadcaster::new();
        let sub = broadcaster.subscribe();
        let id = sub.id();

        drop(sub);
        broadcaster.publish_log(3, "nobody listening");

        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(!broadcaster.unsubscribe(id));
    }

    #[test]
    fn test_publish_with_no_subscribers() {
        let broadcaster = LogBroadcaster::new();
        broadcaster.publish_log(1, "into the void");
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_per_subscriber_order() {
        let broadcaster = LogBroadcaster::new();
        let mut sub = broadcaster.subscribe();

        broadcaster.publish_log(5, "first");
        broadcaster.publish_status(5, "failed");

        let received = drain(&mut sub);
        let contents: Vec<_> = received.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "failed"]);
    }

    #[test]
    fn test_publish_stamps_time() {
        let broadcaster = LogBroadcaster::new();
        let mut sub = broadcaster.subscribe();

        broadcaster.publish_log(1, "now");
        broadcaster.publish(PipelineEvent::log(1, "then").at(42));

        let received = drain(&mut sub);
        assert!(received[0].timestamp > 0);
        assert_eq!(received[1].timestamp, 42);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let broadcaster = LogBroadcaster::with_capacity(0);
        let mut sub = broadcaster.subscribe();

        broadcaster.publish_log(1, "fits");
        broadcaster.publish_log(1, "dropped");

        assert_eq!(broadcaster.mailbox_capacity(), 1);
        assert_eq!(drain(&mut sub).len(), 1);
    }

    #[test]
    fn test_close_all_clears_registry() {
        let broadcaster = LogBroadcaster::new();
        let a = broadcaster.subscribe();
        let b = broadcaster.subscribe();

        broadcaster.close_all();

        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(!a.is_active());
        assert!(!b.is_active());
        assert!(!broadcaster.unsubscribe(a.id()));
        assert!(broadcaster.is_closed());
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_closed() {
        let broadcaster = LogBroadcaster::new();
        broadcaster.close_all();

        let mut late = broadcaster.subscribe();
        broadcaster.publish_log(1, "nobody gets this");

        assert!(!late.is_active());
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(late.recv().await.is_none());
    }

    #[test]
    fn test_concurrent_publish_and_churn() {
        let broadcaster = LogBroadcaster::with_capacity(16);
        let mut steady = broadcaster.subscribe();

        std::thread::scope(|scope| {
            for worker in 0..4u64 {
                let broadcaster = broadcaster.clone();
                scope.spawn(move || {
                    for i in 0..500 {
                        broadcaster.publish_log(worker, format!("{}", i));
                    }
                });
            }
            for _ in 0..2 {
                let broadcaster = broadcaster.clone();
                scope.spawn(move || {
                    for _ in 0..200 {
                        let sub = broadcaster.subscribe();
                        broadcaster.unsubscribe(sub.id());
                        broadcaster.unsubscribe(sub.id());
                    }
                });
            }
        });

        assert_eq!(broadcaster.subscriber_count(), 1);
        assert!(drain(&mut steady).len() <= 16);
    }
}
