//! Channel primitives: the FIFO queues every other component in this crate
//! is built from.
//!
//! A [`Chan<T>`] supports blocking send/receive, non-blocking offer/poll, an
//! idempotent close, and two optional hooks applied at enqueue time: a
//! transform (map/filter/expand one value into zero or more) and a fault
//! handler for when that transform raises.
//!
//! There is no tokio channel type that gives us all three buffer disciplines
//! (synchronous rendezvous, fixed bounded, drop-oldest sliding-1) plus
//! enqueue-time transforms under one roof, so `Chan` is a small
//! mutex-and-condvar queue built directly on `tokio::sync::{Mutex, Notify}` —
//! the same "lock, check, `notified().await`" pattern used elsewhere in this
//! crate for internal wait points.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::trace;

use crate::error::Fault;

/// The buffering discipline of a channel's internal queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Capacity {
    /// Capacity 0: send suspends until a matching receive takes the value.
    Rendezvous,
    /// Capacity N: send suspends once N values are buffered.
    Bounded(usize),
    /// Accepts every send immediately, dropping the oldest retained value.
    SlidingOne,
}

/// Outcome of a non-blocking poll.
#[derive(Debug)]
pub enum Poll<T> {
    Ready(T),
    Empty,
    Closed,
}

type Transform<T> = dyn Fn(T) -> Result<Vec<T>, Fault> + Send + Sync;
type FaultHandler<T> = dyn Fn(Fault) -> Option<T> + Send + Sync;

struct State<T> {
    buffer: VecDeque<T>,
    rendezvous_slot: Option<T>,
    closed: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    activity: Notify,
    capacity: Capacity,
    on_enqueue: Option<Box<Transform<T>>>,
    on_fault: Option<Box<FaultHandler<T>>>,
}

/// A FIFO channel. Cheap to clone — clones share the same underlying queue,
/// the way a `Sender`/`Receiver` pair shares one mpsc channel.
pub struct Chan<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Chan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chan").field("capacity", &self.inner.capacity).finish()
    }
}

/// Builder for a [`Chan`]. Transform and fault handler are configured once,
/// at construction, and never mutated afterwards.
pub struct ChanBuilder<T> {
    capacity: Capacity,
    on_enqueue: Option<Box<Transform<T>>>,
    on_fault: Option<Box<FaultHandler<T>>>,
}

impl<T: Send + 'static> ChanBuilder<T> {
    pub fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            on_enqueue: None,
            on_fault: None,
        }
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> Result<Vec<T>, Fault> + Send + Sync + 'static,
    {
        self.on_enqueue = Some(Box::new(f));
        self
    }

    pub fn fault_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(Fault) -> Option<T> + Send + Sync + 'static,
    {
        self.on_fault = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Chan<T> {
        Chan {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    buffer: VecDeque::new(),
                    rendezvous_slot: None,
                    closed: false,
                }),
                activity: Notify::new(),
                capacity: self.capacity,
                on_enqueue: self.on_enqueue,
                on_fault: self.on_fault,
            }),
        }
    }
}

enum Expansion<T> {
    Enqueue(Vec<T>),
    Dropped,
    Closed,
}

impl<T: Send + 'static> Chan<T> {
    /// A channel with no enqueue transform or fault handler.
    pub fn new(capacity: Capacity) -> Self {
        ChanBuilder::new(capacity).build()
    }

    pub fn capacity(&self) -> Capacity {
        self.inner.capacity
    }

    fn run_transform(&self, value: T) -> Expansion<T> {
        match &self.inner.on_enqueue {
            None => Expansion::Enqueue(vec![value]),
            Some(transform) => match transform(value) {
                Ok(values) => Expansion::Enqueue(values),
                Err(fault) => match &self.inner.on_fault {
                    Some(handler) => match handler(fault) {
                        Some(replacement) => Expansion::Enqueue(vec![replacement]),
                        None => Expansion::Dropped,
                    },
                    None => Expansion::Closed,
                },
            },
        }
    }

    /// Blocks until the destination has room (or a matching receive, for a
    /// rendezvous channel). Returns `false` if the channel is closed.
    pub async fn send(&self, value: T) -> bool {
        match self.run_transform(value) {
            Expansion::Closed => {
                self.close().await;
                false
            }
            Expansion::Dropped => !self.is_closed().await,
            Expansion::Enqueue(values) => {
                for v in values {
                    if !self.enqueue_one(v).await {
                        return false;
                    }
                }
                true
            }
        }
    }

    async fn enqueue_one(&self, value: T) -> bool {
        match self.inner.capacity {
            Capacity::Rendezvous => self.enqueue_rendezvous(value).await,
            Capacity::Bounded(cap) => self.enqueue_bounded(value, cap).await,
            Capacity::SlidingOne => self.enqueue_sliding(value).await,
        }
    }

    async fn enqueue_rendezvous(&self, value: T) -> bool {
        // Phase 1: wait for an empty handoff slot, then place the value.
        let mut to_place = Some(value);
        loop {
            let notified = self.inner.activity.notified();
            {
                let mut st = self.inner.state.lock().await;
                if st.closed {
                    return false;
                }
                if st.rendezvous_slot.is_none() {
                    st.rendezvous_slot = to_place.take();
                    self.inner.activity.notify_waiters();
                    break;
                }
            }
            notified.await;
        }
        // Phase 2: wait until a receiver has taken it — a rendezvous send
        // only completes once handed off.
        loop {
            let notified = self.inner.activity.notified();
            {
                let st = self.inner.state.lock().await;
                if st.rendezvous_slot.is_none() {
                    return true;
                }
                if st.closed {
                    return false;
                }
            }
            notified.await;
        }
    }

    async fn enqueue_bounded(&self, value: T, cap: usize) -> bool {
        let mut to_place = Some(value);
        loop {
            let notified = self.inner.activity.notified();
            {
                let mut st = self.inner.state.lock().await;
                if st.closed {
                    return false;
                }
                if st.buffer.len() < cap {
                    st.buffer.push_back(to_place.take().expect("single use"));
                    self.inner.activity.notify_waiters();
                    return true;
                }
            }
            notified.await;
        }
    }

    async fn enqueue_sliding(&self, value: T) -> bool {
        let mut st = self.inner.state.lock().await;
        if st.closed {
            return false;
        }
        if st.buffer.pop_front().is_some() {
            trace!("sliding-1 channel dropped oldest retained value");
        }
        st.buffer.push_back(value);
        self.inner.activity.notify_waiters();
        true
    }

    /// Non-blocking best-effort send. A rendezvous channel never has a
    /// parked receiver to hand off to synchronously, so `offer` on one
    /// always returns `false`; use [`Chan::send`] instead.
    pub async fn offer(&self, value: T) -> bool {
        match self.run_transform(value) {
            Expansion::Closed => {
                self.close().await;
                false
            }
            Expansion::Dropped => !self.is_closed().await,
            Expansion::Enqueue(values) => {
                let mut st = self.inner.state.lock().await;
                if st.closed {
                    return false;
                }
                let mut accepted_any = false;
                for v in values {
                    match self.inner.capacity {
                        Capacity::Rendezvous => return accepted_any,
                        Capacity::Bounded(cap) => {
                            if st.buffer.len() < cap {
                                st.buffer.push_back(v);
                                accepted_any = true;
                            } else {
                                break;
                            }
                        }
                        Capacity::SlidingOne => {
                            st.buffer.pop_front();
                            st.buffer.push_back(v);
                            accepted_any = true;
                        }
                    }
                }
                if accepted_any {
                    self.inner.activity.notify_waiters();
                }
                accepted_any
            }
        }
    }

    /// Blocks for the next value, or returns `None` at end-of-stream (the
    /// channel closed and fully drained).
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.inner.activity.notified();
            {
                let mut st = self.inner.state.lock().await;
                let taken = match self.inner.capacity {
                    Capacity::Rendezvous => st.rendezvous_slot.take(),
                    _ => st.buffer.pop_front(),
                };
                if let Some(v) = taken {
                    self.inner.activity.notify_waiters();
                    return Some(v);
                }
                if st.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking receive.
    pub async fn poll(&self) -> Poll<T> {
        let mut st = self.inner.state.lock().await;
        let taken = match self.inner.capacity {
            Capacity::Rendezvous => st.rendezvous_slot.take(),
            _ => st.buffer.pop_front(),
        };
        if let Some(v) = taken {
            self.inner.activity.notify_waiters();
            return Poll::Ready(v);
        }
        if st.closed {
            Poll::Closed
        } else {
            Poll::Empty
        }
    }

    /// Idempotent. Wakes every blocked sender and receiver; senders observe
    /// `false`, receivers drain the remaining buffer then observe `None`.
    pub async fn close(&self) {
        let mut st = self.inner.state.lock().await;
        if st.closed {
            return;
        }
        st.closed = true;
        self.inner.activity.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn bounded_fifo_order() {
        let c = Chan::new(Capacity::Bounded(2));
        assert!(c.send(1).await);
        assert!(c.send(2).await);
        assert_eq!(c.recv().await, Some(1));
        assert_eq!(c.recv().await, Some(2));
    }

    #[tokio::test]
    async fn bounded_send_suspends_when_full() {
        let c = Chan::new(Capacity::Bounded(1));
        assert!(c.send(1).await);
        assert!(!c.offer(2).await);

        let c2 = c.clone();
        let sender = tokio::spawn(async move { c2.send(2).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(c.recv().await, Some(1));
        assert!(sender.await.unwrap());
        assert_eq!(c.recv().await, Some(2));
    }

    #[tokio::test]
    async fn sliding_one_drops_oldest() {
        let c = Chan::new(Capacity::SlidingOne);
        assert!(c.send(1).await);
        assert!(c.send(2).await);
        assert!(c.send(3).await);
        assert_eq!(c.recv().await, Some(3));
    }

    #[tokio::test]
    async fn rendezvous_requires_matching_receive() {
        let c: Chan<i32> = Chan::new(Capacity::Rendezvous);
        let c2 = c.clone();
        let sent = tokio::spawn(async move { c2.send(42).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        // No receiver yet: offer must fail, nothing was handed off.
        assert!(!c.offer(7).await);
        assert_eq!(c.recv().await, Some(42));
        assert!(sent.await.unwrap());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drains() {
        let c = Chan::new(Capacity::Bounded(4));
        c.send(1).await;
        c.send(2).await;
        c.close().await;
        c.close().await; // idempotent
        assert!(!c.send(3).await);
        assert_eq!(c.recv().await, Some(1));
        assert_eq!(c.recv().await, Some(2));
        assert_eq!(c.recv().await, None);
    }

    #[tokio::test]
    async fn transform_expands_and_filters() {
        let c = ChanBuilder::new(Capacity::Bounded(8))
            .transform(|v: i32| {
                if v % 2 == 0 {
                    Ok(vec![v, v])
                } else {
                    Ok(vec![])
                }
            })
            .build();
        assert!(c.send(4).await);
        assert!(c.send(3).await);
        assert_eq!(c.recv().await, Some(4));
        assert_eq!(c.recv().await, Some(4));
        assert!(matches!(c.poll().await, Poll::Empty));
    }

    #[tokio::test]
    async fn fault_handler_recovers_or_closes() {
        let recovered = ChanBuilder::new(Capacity::Bounded(4))
            .transform(|_: i32| Err(anyhow::anyhow!("boom")))
            .fault_handler(|_fault| Some(-1))
            .build();
        assert!(recovered.send(5).await);
        assert_eq!(recovered.recv().await, Some(-1));

        let unhandled = ChanBuilder::new(Capacity::Bounded(4))
            .transform(|_: i32| Err(anyhow::anyhow!("boom")))
            .build();
        assert!(!unhandled.send(5).await);
        assert!(unhandled.is_closed().await);
    }
}
