//! Broadcast ("mult"): fans every value produced on a source channel out to
//! zero or more subscriber channels, with dynamic subscribe/unsubscribe.
//!
//! The subscriber registry is a `DashMap`, so subscribe and unsubscribe need
//! no external lock, and the pump task takes an independent snapshot of the
//! registry on every value so a subscriber registered mid-dispatch cleanly
//! either sees the in-flight value or doesn't, never a partial delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::channel::Chan;

/// A handle returned by [`Broadcast::subscribe`], used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber<T> {
    chan: Chan<T>,
    close_on_end: bool,
}

/// Owns a source channel and pumps every value it produces to every current
/// subscriber, one subscriber at a time, suspending until each accepts. A
/// slow subscriber therefore back-pressures the whole broadcast — register
/// a [`crate::channel::Capacity::SlidingOne`] or buffered channel if that is
/// not tolerable.
pub struct Broadcast<T> {
    source: Chan<T>,
    subscribers: DashMap<u64, Subscriber<T>>,
    next_id: AtomicU64,
}

impl<T> Broadcast<T>
where
    T: Clone + Send + 'static,
{
    /// Spawns the pump task and returns the shared handle. `source` is the
    /// channel values are produced onto (typically a cog worker's output
    /// queue); callers keep a `Chan` handle to it if they need to produce
    /// values directly.
    pub fn spawn(source: Chan<T>) -> Arc<Self> {
        let this = Arc::new(Self {
            source,
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
        });
        let pump = this.clone();
        tokio::spawn(async move { pump.run_pump().await });
        this
    }

    async fn run_pump(self: Arc<Self>) {
        loop {
            match self.source.recv().await {
                Some(value) => {
                    // Snapshot the subscriber set once per value: a
                    // subscriber added after this point sees only values
                    // from here on, never this one.
                    let ids: Vec<u64> = self.subscribers.iter().map(|e| *e.key()).collect();
                    for id in ids {
                        let chan = self.subscribers.get(&id).map(|s| s.chan.clone());
                        if let Some(chan) = chan {
                            chan.send(value.clone()).await;
                        }
                    }
                }
                None => {
                    for entry in self.subscribers.iter() {
                        if entry.value().close_on_end {
                            entry.value().chan.close().await;
                        }
                    }
                    debug!("broadcast source ended, pump exiting");
                    self.subscribers.clear();
                    return;
                }
            }
        }
    }

    /// Registers `chan` to receive a copy of every subsequent value. If
    /// `close_on_end` is set, `chan` is closed when the source ends;
    /// otherwise it is simply unregistered and left as-is.
    pub fn subscribe(&self, chan: Chan<T>, close_on_end: bool) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber = id, close_on_end, "broadcast subscribe");
        self.subscribers.insert(id, Subscriber { chan, close_on_end });
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        debug!(subscriber = id.0, "broadcast unsubscribe");
        self.subscribers.remove(&id.0);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Capacity;

    #[tokio::test]
    async fn every_subscriber_gets_every_value() {
        let source = Chan::new(Capacity::Bounded(4));
        let bcast = Broadcast::spawn(source.clone());

        let sub_a: Chan<i32> = Chan::new(Capacity::Bounded(4));
        let sub_b: Chan<i32> = Chan::new(Capacity::Bounded(4));
        bcast.subscribe(sub_a.clone(), true);
        bcast.subscribe(sub_b.clone(), true);

        source.send(1).await;
        source.send(2).await;

        assert_eq!(sub_a.recv().await, Some(1));
        assert_eq!(sub_a.recv().await, Some(2));
        assert_eq!(sub_b.recv().await, Some(1));
        assert_eq!(sub_b.recv().await, Some(2));
    }

    #[tokio::test]
    async fn close_on_end_closes_subscriber_when_source_ends() {
        let source: Chan<i32> = Chan::new(Capacity::Bounded(4));
        let bcast = Broadcast::spawn(source.clone());

        let closing: Chan<i32> = Chan::new(Capacity::Bounded(4));
        bcast.subscribe(closing.clone(), true);

        source.close().await;
        // Give the pump a moment to observe the close and react.
        for _ in 0..100 {
            if closing.is_closed().await {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(closing.is_closed().await);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_values() {
        let source: Chan<i32> = Chan::new(Capacity::Rendezvous);
        let bcast = Broadcast::spawn(source.clone());

        let early: Chan<i32> = Chan::new(Capacity::Bounded(4));
        bcast.subscribe(early.clone(), true);
        source.send(1).await;
        assert_eq!(early.recv().await, Some(1));

        let late: Chan<i32> = Chan::new(Capacity::Bounded(4));
        bcast.subscribe(late.clone(), true);
        source.send(2).await;

        assert_eq!(early.recv().await, Some(2));
        assert_eq!(late.recv().await, Some(2));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let source: Chan<i32> = Chan::new(Capacity::Bounded(4));
        let bcast = Broadcast::spawn(source.clone());

        let sub: Chan<i32> = Chan::new(Capacity::Bounded(4));
        let id = bcast.subscribe(sub.clone(), false);
        source.send(1).await;
        assert_eq!(sub.recv().await, Some(1));

        bcast.unsubscribe(id);
        source.send(2).await;
        // give the pump a chance to run before asserting nothing arrived
        tokio::task::yield_now().await;
        assert!(matches!(sub.poll().await, crate::channel::Poll::Empty));
    }
}
