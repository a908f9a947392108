//! Latest-value fan-out.

use super::listener::{Consumer, Listener, ListenerId, Subscription};
use super::transformer::Transformer;
use crate::scheduler::{self, Scheduler};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where and how a new subscription attaches and receives values.
pub struct AttachOptions<T> {
    /// Runs the attach step.
    pub subscribe_on: Arc<dyn Scheduler>,
    /// Runs the transformer and consumer.
    pub deliver_on: Arc<dyn Scheduler>,
    pub transformer: Option<Transformer<T>>,
}

impl<T> Default for AttachOptions<T> {
    fn default() -> Self {
        Self {
            subscribe_on: scheduler::immediate(),
            deliver_on: scheduler::immediate(),
            transformer: None,
        }
    }
}

struct State<T> {
    value: Option<T>,
    /// Attached listeners; every publish is enqueued to each of them.
    listeners: HashMap<ListenerId, Arc<Listener<T>>>,
    /// Listeners whose attach step has not run yet.
    pending: HashSet<ListenerId>,
}

pub(super) struct Shared<T> {
    name: Arc<str>,
    state: Mutex<State<T>>,
    next_id: AtomicU64,
    failures: Arc<AtomicU64>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    /// Attach step: join the fan-out and enqueue the current value.
    pub(super) fn register(&self, listener: &Arc<Listener<T>>) {
        let needs_drain = {
            let mut state = self.state.lock();
            if !state.pending.remove(&listener.id) || listener.is_cancelled() {
                return;
            }
            state.listeners.insert(listener.id, Arc::clone(listener));
            match &state.value {
                Some(value) => listener.push(value.clone()),
                None => false,
            }
        };

        tracing::debug!(subject = %self.name, listener = listener.id.0, "Listener attached");
        if needs_drain {
            listener.schedule_drain();
        }
    }

    pub(super) fn unregister(&self, id: ListenerId) {
        let mut state = self.state.lock();
        let removed = state.pending.remove(&id) | state.listeners.remove(&id).is_some();
        drop(state);
        if removed {
            tracing::debug!(subject = %self.name, listener = id.0, "Listener detached");
        }
    }
}

/// Holds the most recent value and fans every new value out to attached
/// subscriptions.
///
/// A subscription first receives the value current at its attach step, then
/// every value published afterwards. Values reach each subscription in the
/// order they were published, even when several threads publish at once:
/// the value is stored and enqueued to every listener in one critical
/// section, and each listener drains its queue one value at a time.
///
/// Cloning a broadcaster creates another handle to the same state.
pub struct Broadcaster<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::build("broadcaster".into(), None)
    }

    /// Create a broadcaster whose log events carry `name`.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::build(name.into(), None)
    }

    /// Create a broadcaster that already holds `value`.
    pub fn with_value(name: impl Into<Arc<str>>, value: T) -> Self {
        Self::build(name.into(), Some(value))
    }

    fn build(name: Arc<str>, value: Option<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(State {
                    value,
                    listeners: HashMap::new(),
                    pending: HashSet::new(),
                }),
                next_id: AtomicU64::new(1),
                failures: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Name carried by this broadcaster's log events.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Store `value` and enqueue it to every attached subscription.
    pub fn publish(&self, value: T) {
        let ready: Vec<Arc<Listener<T>>> = {
            let mut state = self.shared.state.lock();
            let ready = state
                .listeners
                .values()
                .filter(|listener| listener.push(value.clone()))
                .cloned()
                .collect();
            state.value = Some(value);
            ready
        };

        tracing::trace!(subject = %self.shared.name, woken = ready.len(), "Published value");
        for listener in ready {
            listener.schedule_drain();
        }
    }

    /// The most recent value, if anything has been published.
    pub fn value(&self) -> Option<T> {
        self.shared.state.lock().value.clone()
    }

    /// True once anything has been published.
    pub fn has_value(&self) -> bool {
        self.shared.state.lock().value.is_some()
    }

    /// True if any subscription is attached or waiting for its attach step.
    pub fn has_subscribers(&self) -> bool {
        let state = self.shared.state.lock();
        !state.listeners.is_empty() || !state.pending.is_empty()
    }

    /// Attached plus pending subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.listeners.len() + state.pending.len()
    }

    /// Number of consumer or transformer panics caught so far.
    pub fn consumer_failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Create and start a subscription.
    pub fn attach<F>(&self, options: AttachOptions<T>, consumer: F) -> Subscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let subscription = self.prepare(options, Arc::new(consumer));
        subscription.start();
        subscription
    }

    /// Create a pending subscription without scheduling its attach step.
    ///
    /// Lets a caller record the subscription under its own lock and start it
    /// once that lock is released.
    pub(crate) fn prepare(&self, options: AttachOptions<T>, consumer: Consumer<T>) -> Subscription<T> {
        let id = ListenerId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let listener = Arc::new(Listener::new(
            id,
            options.subscribe_on,
            options.deliver_on,
            options.transformer,
            consumer,
            Arc::clone(&self.shared.failures),
            Arc::clone(&self.shared.name),
        ));

        self.shared.state.lock().pending.insert(id);
        Subscription::new(listener, Arc::downgrade(&self.shared))
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Broadcaster")
            .field("name", &self.shared.name)
            .field("has_value", &state.value.is_some())
            .field("listeners", &state.listeners.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
