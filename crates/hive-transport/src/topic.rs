//! Multi-subscriber fan-out with bounded delivery.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, warn};

use crate::done::DoneSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicConfig {
    /// Per-subscriber inbox size.
    pub capacity: usize,
    /// How long a publish waits on one subscriber before dropping the item.
    pub grace: Duration,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            grace: Duration::from_millis(100),
        }
    }
}

#[derive(Clone)]
struct Slot<T> {
    id: u64,
    tx: mpsc::Sender<T>,
    done: DoneSignal,
}

/// A subscriber's receiving end.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
    done: DoneSignal,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next published item, or `None` after unsubscribe.
    pub async fn recv(&mut self) -> Option<T> {
        if self.done.is_done() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.done.wait() => None,
            item = self.rx.recv() => item,
        }
    }

    pub fn done(&self) -> DoneSignal {
        self.done.clone()
    }
}

/// Publish/subscribe hub.
///
/// `publish` hands each item to every live subscriber in turn, waiting at
/// most the grace window per subscriber. Items a subscriber cannot take in
/// time are dropped and counted.
pub struct Topic<T> {
    name: String,
    config: TopicConfig,
    subscribers: Mutex<Vec<Slot<T>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub fn new(name: impl Into<String>, config: TopicConfig) -> Self {
        Self {
            name: name.into(),
            config,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.config.capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let done = DoneSignal::new();
        self.subscribers.lock().push(Slot {
            id,
            tx,
            done: done.clone(),
        });
        debug!(topic = %self.name, subscriber = id, "subscribed");
        Subscription { id, rx, done }
    }

    /// Remove the subscriber and fire its done signal.
    pub fn unsubscribe(&self, sub: &Subscription<T>) -> bool {
        let removed = self.remove(sub.id);
        sub.done.fire();
        removed
    }

    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|slot| slot.id != id);
        before != subscribers.len()
    }

    /// Deliver `item` to every subscriber. Returns how many accepted it.
    pub async fn publish(&self, item: T) -> usize {
        let snapshot: Vec<Slot<T>> = self.subscribers.lock().clone();
        let mut delivered = 0;
        for slot in snapshot {
            if slot.done.is_done() {
                continue;
            }
            tokio::select! {
                biased;
                _ = slot.done.wait() => {}
                res = slot.tx.send_timeout(item.clone(), self.config.grace) => match res {
                    Ok(()) => delivered += 1,
                    Err(SendTimeoutError::Timeout(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(topic = %self.name, subscriber = slot.id, "subscriber too slow, item dropped");
                    }
                    Err(SendTimeoutError::Closed(_)) => {
                        self.remove(slot.id);
                        debug!(topic = %self.name, subscriber = slot.id, "subscriber gone, removed");
                    }
                },
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Items dropped because a subscriber did not drain in time.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[tokio::test]
    async fn every_subscriber_gets_each_item() {
        let topic = Topic::new("vehicles", TopicConfig::default());
        let mut a = topic.subscribe();
        let mut b = topic.subscribe();

        assert_eq!(topic.publish(1u32).await, 2);
        assert_eq!(a.recv().await, Some(1));
        assert_eq!(b.recv().await, Some(1));
    }

    #[tokio::test]
    async fn unsubscribed_receives_nothing_more() {
        let topic = Topic::new("vehicles", TopicConfig::default());
        let mut a = topic.subscribe();
        let mut b = topic.subscribe();

        assert!(topic.unsubscribe(&a));
        assert!(!topic.unsubscribe(&a));
        assert_eq!(topic.publish("x").await, 1);
        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, Some("x"));
        assert_eq!(topic.subscriber_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unsubscribe_racing_publish_stops_delivery() {
        let topic = Arc::new(Topic::new("vehicles", TopicConfig::default()));
        let running = Arc::new(AtomicBool::new(true));

        let publishers: Vec<_> = (0..2)
            .map(|_| {
                let topic = topic.clone();
                let running = running.clone();
                tokio::spawn(async move {
                    let mut n = 0u64;
                    while running.load(Ordering::SeqCst) {
                        topic.publish(n).await;
                        n += 1;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let mut sub = topic.subscribe();
            tokio::task::yield_now().await;
            assert!(topic.unsubscribe(&sub));
            assert_eq!(sub.recv().await, None);
            assert_eq!(sub.recv().await, None);
        }

        running.store(false, Ordering::SeqCst);
        for publisher in publishers {
            publisher.await.unwrap();
        }
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_subscriber_does_not_block_others() {
        let config = TopicConfig {
            capacity: 1,
            grace: Duration::from_millis(100),
        };
        let topic = Topic::new("events", config);
        let _stalled = topic.subscribe();
        let mut live = topic.subscribe();

        assert_eq!(topic.publish(1).await, 2);
        assert_eq!(live.recv().await, Some(1));

        // The stalled inbox is full; the item is dropped for it only.
        assert_eq!(topic.publish(2).await, 1);
        assert_eq!(topic.dropped(), 1);
        assert_eq!(live.recv().await, Some(2));
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let topic = Topic::new("events", TopicConfig::default());
        let gone = topic.subscribe();
        drop(gone);
        assert_eq!(topic.publish(7).await, 0);
        assert_eq!(topic.subscriber_count(), 0);
    }
}
