// Channel module
//
// This module provides the cross-thread value channel that carries the
// request/response traffic between a controller thread and the surface
// thread. One sender pushes values and eventually declares end-of-stream;
// one receiver asynchronously takes values, end-of-stream, or a
// cancellation notice, one registration at a time, via callbacks.
//
// Delivery never runs on the sender's call stack: every outcome is posted
// onto the tokio runtime held by the [`ChannelRegistry`], so a `send()`
// from the surface thread cannot re-enter controller code.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;

pub mod monitor;

pub use monitor::{ChannelMonitor, MonitorNotice};

/// Outcome of a single `receive_with_callback` registration.
///
/// Each registration observes exactly one of these, exactly once:
/// a value, end-of-stream, or cancellation of the registration itself.
#[derive(Debug)]
pub enum ReceiveResult<T> {
    /// A value was delivered in FIFO order.
    Item(T),
    /// The sender declared end-of-stream and the value queue has drained.
    Eof,
    /// The registration's cancellation token fired before a value arrived.
    Cancelled,
}

type Callback<T> = Box<dyn FnOnce(ReceiveResult<T>) + Send>;

/// Process-wide factory for channel pairs.
///
/// Owns the tokio runtime handle used to schedule callback delivery and a
/// monotonically increasing channel id counter used only for diagnostics.
/// Construct one at startup and pass it by reference wherever channels are
/// created; there is no ambient global counter.
pub struct ChannelRegistry {
    runtime: Handle,
    metrics: Arc<Metrics>,
    next_id: AtomicU64,
}

impl ChannelRegistry {
    /// Create a registry that schedules deliveries on the given runtime.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            metrics: Arc::new(Metrics::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Shared metrics counters for all channels created by this registry.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Create a connected sender/receiver pair over a fresh channel.
    pub fn channel<T: Send + 'static>(&self) -> (ChannelSender<T>, ChannelReceiver<T>) {
        let core = Arc::new(ChannelCore {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            runtime: self.runtime.clone(),
            metrics: Arc::clone(&self.metrics),
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                eof_sent: false,
                sender_dropped: false,
                next_waiter_id: 0,
                waiters: BTreeMap::new(),
            }),
        });

        tracing::trace!(channel = core.id, "channel created");

        (
            ChannelSender {
                core: Arc::clone(&core),
            },
            ChannelReceiver { core },
        )
    }
}

struct Waiter<T> {
    callback: Callback<T>,
    /// Task watching the registration's cancellation token. Aborted when the
    /// waiter is paired with a value or drained by end-of-stream.
    watcher: JoinHandle<()>,
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    eof_sent: bool,
    sender_dropped: bool,
    next_waiter_id: u64,
    /// Waiting receivers keyed by registration id. Ids increase
    /// monotonically, so iteration order is FIFO arrival order.
    waiters: BTreeMap<u64, Waiter<T>>,
}

struct ChannelCore<T> {
    id: u64,
    runtime: Handle,
    metrics: Arc<Metrics>,
    state: Mutex<ChannelState<T>>,
}

impl<T: Send + 'static> ChannelCore<T> {
    /// Schedule delivery on the runtime, off the caller's stack.
    fn post(&self, callback: Callback<T>, result: ReceiveResult<T>) {
        self.metrics.record_delivery();
        self.runtime.spawn(async move {
            callback(result);
        });
    }

    /// Remove the identified waiter, if still registered, and deliver
    /// `Cancelled` to it. A waiter that was already paired with a value (or
    /// drained by eof) is gone from the map, so a late cancellation is a
    /// no-op: pairing XOR cancellation.
    fn cancel_waiter(&self, waiter_id: u64) {
        let removed = {
            let mut state = self.state.lock().unwrap();
            state.waiters.remove(&waiter_id)
        };

        if let Some(waiter) = removed {
            tracing::trace!(channel = self.id, waiter = waiter_id, "receive cancelled");
            self.metrics.record_receive_cancelled();
            self.post(waiter.callback, ReceiveResult::Cancelled);
        }
    }
}

/// Sending half of a channel pair.
///
/// Not cloneable: the protocol is a single logical stream with one producer.
pub struct ChannelSender<T> {
    core: Arc<ChannelCore<T>>,
}

impl<T: Send + 'static> ChannelSender<T> {
    /// Diagnostic channel id.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Send a value.
    ///
    /// Pairs immediately with the oldest waiting receiver if one is
    /// registered; otherwise the value queues in FIFO order.
    ///
    /// # Panics
    /// Panics if called after [`send_eof`](Self::send_eof); sending on a
    /// finished stream is a caller bug, not a recoverable condition.
    pub fn send(&self, value: T) {
        let mut state = self.core.state.lock().unwrap();
        assert!(
            !state.eof_sent,
            "send on channel {} after end-of-stream",
            self.core.id
        );

        self.core.metrics.record_value_sent();

        if let Some((waiter_id, waiter)) = state.waiters.pop_first() {
            drop(state);
            tracing::trace!(channel = self.core.id, waiter = waiter_id, "send paired");
            waiter.watcher.abort();
            self.core.post(waiter.callback, ReceiveResult::Item(value));
        } else {
            state.queue.push_back(value);
        }
    }

    /// Declare end-of-stream.
    ///
    /// If the value queue is empty, every currently waiting receiver is
    /// delivered `Eof` immediately; otherwise eof delivery is deferred until
    /// subsequent receives drain the queue. Future receives always observe
    /// `Eof` once the queue is empty.
    pub fn send_eof(&self) {
        let mut state = self.core.state.lock().unwrap();
        state.eof_sent = true;

        if state.queue.is_empty() {
            let drained = std::mem::take(&mut state.waiters);
            drop(state);
            tracing::debug!(channel = self.core.id, waiters = drained.len(), "eof sent");
            for (_, waiter) in drained {
                waiter.watcher.abort();
                self.core.metrics.record_eof_delivered();
                self.core.post(waiter.callback, ReceiveResult::Eof);
            }
        } else {
            tracing::debug!(channel = self.core.id, "eof sent, deferred behind queued values");
        }
    }
}

impl<T> Drop for ChannelSender<T> {
    fn drop(&mut self) {
        let mut state = self.core.state.lock().unwrap();
        state.sender_dropped = true;
        if !state.eof_sent {
            // Receivers left waiting on a dropped sender would hang forever.
            tracing::error!(
                channel = self.core.id,
                "sender dropped without declaring end-of-stream"
            );
            debug_assert!(
                state.waiters.is_empty(),
                "channel sender dropped while receivers are waiting"
            );
        }
    }
}

/// Receiving half of a channel pair.
pub struct ChannelReceiver<T> {
    core: Arc<ChannelCore<T>>,
}

impl<T: Send + 'static> ChannelReceiver<T> {
    /// Diagnostic channel id.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Register a callback for the next receive outcome.
    ///
    /// If a value is already queued, the oldest one is delivered. If
    /// end-of-stream was declared and the queue has drained, `Eof` is
    /// delivered. Otherwise the callback waits; if `cancel` fires before a
    /// value pairs with it, the registration is withdrawn and `Cancelled` is
    /// delivered instead. Exactly one outcome reaches the callback.
    ///
    /// # Panics
    /// Panics if the sender was dropped without declaring end-of-stream; a
    /// registration on such a channel could never be paired and would wait
    /// forever.
    pub fn receive_with_callback<F>(&self, callback: F, cancel: CancellationToken)
    where
        F: FnOnce(ReceiveResult<T>) + Send + 'static,
    {
        let callback: Callback<T> = Box::new(callback);
        let mut state = self.core.state.lock().unwrap();
        assert!(
            state.eof_sent || !state.sender_dropped,
            "receive on channel {} whose sender was dropped without end-of-stream",
            self.core.id
        );

        if let Some(value) = state.queue.pop_front() {
            drop(state);
            self.core.post(callback, ReceiveResult::Item(value));
        } else if state.eof_sent {
            drop(state);
            self.core.metrics.record_eof_delivered();
            self.core.post(callback, ReceiveResult::Eof);
        } else {
            let waiter_id = state.next_waiter_id;
            state.next_waiter_id += 1;

            // The watcher may fire before we insert the waiter below; it will
            // block on the state mutex we are holding, so the registration is
            // always visible to it.
            let core = Arc::clone(&self.core);
            let watcher = self.core.runtime.spawn(async move {
                cancel.cancelled().await;
                core.cancel_waiter(waiter_id);
            });

            state.waiters.insert(waiter_id, Waiter { callback, watcher });
            tracing::trace!(channel = self.core.id, waiter = waiter_id, "receiver waiting");
        }
    }

    /// Await a single receive outcome.
    ///
    /// Adapter over the callback form for call sites that want to suspend
    /// until exactly one result arrives. Uses a fresh, never-fired
    /// cancellation token.
    pub async fn receive(&self) -> ReceiveResult<T> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.receive_with_callback(
            move |result| {
                let _ = tx.send(result);
            },
            CancellationToken::new(),
        );
        rx.await
            .expect("channel dropped a receive callback without delivering")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(Handle::current())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn values_arrive_in_send_order() {
        let registry = registry();
        let (tx, rx) = registry.channel::<u32>();

        tx.send(1);
        tx.send(2);
        tx.send(3);

        for expected in 1..=3 {
            match rx.receive().await {
                ReceiveResult::Item(v) => assert_eq!(v, expected),
                other => panic!("expected item, got {:?}", other),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn waiting_receiver_pairs_with_later_send() {
        let registry = registry();
        let (tx, rx) = registry.channel::<&'static str>();

        let (done_tx, done_rx) = mpsc::channel();
        rx.receive_with_callback(
            move |result| {
                done_tx.send(result).unwrap();
            },
            CancellationToken::new(),
        );

        tx.send("hello");

        let result = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, ReceiveResult::Item("hello")));
        tx.send_eof();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn eof_reaches_every_receiver_once() {
        let registry = registry();
        let (tx, rx) = registry.channel::<u32>();

        tx.send_eof();

        for _ in 0..3 {
            assert!(matches!(rx.receive().await, ReceiveResult::Eof));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn eof_is_deferred_behind_queued_values() {
        let registry = registry();
        let (tx, rx) = registry.channel::<u32>();

        tx.send(7);
        tx.send(8);
        tx.send_eof();

        assert!(matches!(rx.receive().await, ReceiveResult::Item(7)));
        assert!(matches!(rx.receive().await, ReceiveResult::Item(8)));
        assert!(matches!(rx.receive().await, ReceiveResult::Eof));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_registration_yields_cancelled() {
        let registry = registry();
        let (tx, rx) = registry.channel::<u32>();

        let token = CancellationToken::new();
        let (done_tx, done_rx) = mpsc::channel();
        rx.receive_with_callback(
            move |result| {
                done_tx.send(result).unwrap();
            },
            token.clone(),
        );

        token.cancel();

        let result = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, ReceiveResult::Cancelled));

        // The registration is gone; a later send queues for the next receive.
        tx.send(42);
        assert!(matches!(rx.receive().await, ReceiveResult::Item(42)));
        tx.send_eof();
    }

    #[tokio::test(flavor = "multi_thread")]
    #[should_panic(expected = "dropped without end-of-stream")]
    async fn receive_after_sender_dropped_without_eof_panics() {
        let registry = registry();
        let (tx, rx) = registry.channel::<u32>();
        drop(tx);
        // Nothing can ever pair with this registration; waiting silently
        // would hang the receiver forever.
        rx.receive_with_callback(|_| {}, CancellationToken::new());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn receive_after_sender_dropped_with_eof_still_drains() {
        let registry = registry();
        let (tx, rx) = registry.channel::<u32>();
        tx.send(3);
        tx.send_eof();
        drop(tx);

        assert!(matches!(rx.receive().await, ReceiveResult::Item(3)));
        assert!(matches!(rx.receive().await, ReceiveResult::Eof));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[should_panic(expected = "after end-of-stream")]
    async fn send_after_eof_panics() {
        let registry = registry();
        let (tx, _rx) = registry.channel::<u32>();
        tx.send_eof();
        tx.send(1);
    }
}
