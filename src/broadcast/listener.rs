//! Raw broadcaster subscriptions and their per-subscriber delivery queue.

use super::broadcaster::Shared;
use super::transformer::Transformer;
use crate::disposable::Disposable;
use crate::scheduler::Scheduler;
use parking_lot::{Mutex, ReentrantMutex};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Consumer callback invoked with each delivered value.
pub type Consumer<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Unique identifier for a listener within one broadcaster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Values waiting for delivery.
struct Queue<T> {
    pending: VecDeque<T>,
    /// A drain task is scheduled or running.
    draining: bool,
}

pub(super) struct Listener<T> {
    pub(super) id: ListenerId,
    cancelled: AtomicBool,
    queue: Mutex<Queue<T>>,
    /// Held for the duration of each delivery; cancel waits on it.
    gate: ReentrantMutex<()>,
    transformer: Option<Transformer<T>>,
    consumer: Consumer<T>,
    subscribe_on: Arc<dyn Scheduler>,
    deliver_on: Arc<dyn Scheduler>,
    failures: Arc<AtomicU64>,
    source_name: Arc<str>,
}

impl<T: Send + 'static> Listener<T> {
    pub(super) fn new(
        id: ListenerId,
        subscribe_on: Arc<dyn Scheduler>,
        deliver_on: Arc<dyn Scheduler>,
        transformer: Option<Transformer<T>>,
        consumer: Consumer<T>,
        failures: Arc<AtomicU64>,
        source_name: Arc<str>,
    ) -> Self {
        Self {
            id,
            cancelled: AtomicBool::new(false),
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                draining: false,
            }),
            gate: ReentrantMutex::new(()),
            transformer,
            consumer,
            subscribe_on,
            deliver_on,
            failures,
            source_name,
        }
    }

    pub(super) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Enqueue a value. Returns true if the caller must schedule a drain.
    pub(super) fn push(&self, value: T) -> bool {
        let mut queue = self.queue.lock();
        if self.is_cancelled() {
            return false;
        }
        queue.pending.push_back(value);
        if queue.draining {
            false
        } else {
            queue.draining = true;
            true
        }
    }

    pub(super) fn schedule_drain(self: &Arc<Self>) {
        let listener = Arc::clone(self);
        self.deliver_on.schedule(Box::new(move || listener.drain()));
    }

    /// Deliver queued values one at a time until the queue is empty.
    fn drain(&self) {
        loop {
            let value = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(value) => value,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            let _delivering = self.gate.lock();
            if self.is_cancelled() {
                let mut queue = self.queue.lock();
                queue.pending.clear();
                queue.draining = false;
                return;
            }
            self.deliver(value);
        }
    }

    fn deliver(&self, value: T) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let value = match &self.transformer {
                Some(transformer) => transformer.apply(value),
                None => Some(value),
            };
            if let Some(value) = value {
                (self.consumer)(value);
            }
        }));

        if let Err(payload) = result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                subject = %self.source_name,
                listener = self.id.0,
                panic = panic_message(&*payload),
                "Consumer panicked during delivery"
            );
        }
    }

    /// Mark cancelled and wait for an in-flight delivery to finish.
    ///
    /// Returns false if the listener was already cancelled.
    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Re-entrant: cancelling from inside the consumer does not block.
        drop(self.gate.lock());
        self.queue.lock().pending.clear();
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// A live or pending attachment to a [`Broadcaster`](super::Broadcaster).
///
/// Once [`cancel`](Subscription::cancel) returns, the consumer is never
/// invoked again. A delivery already running on another thread is allowed
/// to finish first.
pub struct Subscription<T> {
    listener: Arc<Listener<T>>,
    source: Weak<Shared<T>>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    pub(super) fn new(listener: Arc<Listener<T>>, source: Weak<Shared<T>>) -> Self {
        Self { listener, source }
    }

    /// Identifier of this subscription within its broadcaster.
    pub fn id(&self) -> ListenerId {
        self.listener.id
    }

    /// Schedule the attach on the subscribe-side scheduler.
    ///
    /// The attach snapshots the current value and joins the fan-out in one
    /// step, so the consumer sees the latest value first and then every
    /// later publish, in order.
    pub(crate) fn start(&self) {
        let listener = Arc::clone(&self.listener);
        let source = self.source.clone();
        self.listener.subscribe_on.schedule(Box::new(move || {
            if let Some(shared) = source.upgrade() {
                shared.register(&listener);
            }
        }));
    }

    /// Detach from the broadcaster. Idempotent.
    pub fn cancel(&self) {
        if !self.listener.cancel() {
            return;
        }
        if let Some(shared) = self.source.upgrade() {
            shared.unregister(self.listener.id);
        }
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.listener.is_cancelled()
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            source: self.source.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Disposable for Subscription<T> {
    fn dispose(&self) {
        self.cancel();
    }

    fn is_disposed(&self) -> bool {
        self.is_cancelled()
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.listener.id)
            .field("cancelled", &self.listener.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}
