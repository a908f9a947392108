//! The lifecycle-scoped state subject.

use super::activity::{ActivityEdge, ActivityHooks, ActivityTracker, EdgeDispatcher, NoHooks};
use super::binding::{Binding, BindingId, BindingState, DeliveryPlan, OwnerKey, Teardown};
use super::types::{SubjectConfig, SubscribeOptions};
use crate::broadcast::{AttachOptions, Broadcaster, Consumer, ListenerId, Subscription};
use crate::disposable::{Disposable, DisposalHandle};
use crate::error::{Result, SubjectError};
use crate::lifecycle::{Lifecycle, LifecycleObserver, ObserverRegistration};
use crate::scheduler;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Bindings by owner, plus the attached count. One lock guards both.
struct Registry<T> {
    name: Arc<str>,
    bindings: HashMap<OwnerKey, Binding<T>>,
    tracker: ActivityTracker,
}

impl<T: Clone + Send + 'static> Registry<T> {
    fn attach(
        &mut self,
        broadcaster: &Broadcaster<T>,
        effects: &mut Effects<T>,
        key: OwnerKey,
        id: BindingId,
    ) -> bool {
        let Some(binding) = self.bindings.get_mut(&key).filter(|b| b.id() == id) else {
            return false;
        };
        let Some(subscription) = binding.attach(broadcaster) else {
            return false;
        };
        self.tracker.attach();
        tracing::debug!(
            subject = %self.name,
            binding = id.0,
            listener = subscription.id().0,
            attached = self.tracker.attached(),
            "Binding attached"
        );
        effects.start.push(subscription);
        true
    }

    fn detach(&mut self, effects: &mut Effects<T>, key: OwnerKey, id: BindingId) -> bool {
        let Some(binding) = self.bindings.get_mut(&key).filter(|b| b.id() == id) else {
            return false;
        };
        let Some(subscription) = binding.detach() else {
            return false;
        };
        self.tracker.detach();
        tracing::debug!(
            subject = %self.name,
            binding = id.0,
            attached = self.tracker.attached(),
            "Binding detached"
        );
        effects.cancel.push(subscription);
        true
    }

    /// Remove the owner's binding; with `id`, only if it is that binding.
    fn remove(
        &mut self,
        effects: &mut Effects<T>,
        key: OwnerKey,
        id: Option<BindingId>,
    ) -> Option<BindingId> {
        let matches = self
            .bindings
            .get(&key)
            .is_some_and(|b| id.map_or(true, |id| b.id() == id));
        if !matches {
            return None;
        }
        let binding = self.bindings.remove(&key)?;
        if binding.is_attached() {
            self.tracker.detach();
        }
        let removed = binding.id();
        tracing::debug!(
            subject = %self.name,
            binding = removed.0,
            from = ?binding.state(),
            to = ?BindingState::Terminated,
            attached = self.tracker.attached(),
            "Binding terminated"
        );
        effects.teardown(binding.terminate());
        Some(removed)
    }

    /// Remove bindings whose owner was dropped without reaching `Destroyed`.
    fn sweep(&mut self, effects: &mut Effects<T>) {
        let dead: Vec<OwnerKey> = self
            .bindings
            .iter()
            .filter(|(_, binding)| !binding.owner_alive())
            .map(|(key, _)| *key)
            .collect();
        for key in dead {
            tracing::debug!(subject = %self.name, "Owner dropped while bound");
            self.remove(effects, key, None);
        }
    }
}

/// Work deferred until the registry lock is released.
///
/// Starting, cancelling and deregistering can all run user code (consumers,
/// lifecycle implementations), which must never run under the registry lock.
struct Effects<T> {
    start: Vec<Subscription<T>>,
    cancel: Vec<Subscription<T>>,
    deregister: Vec<ObserverRegistration>,
}

impl<T: Clone + Send + 'static> Effects<T> {
    fn new() -> Self {
        Self {
            start: Vec::new(),
            cancel: Vec::new(),
            deregister: Vec::new(),
        }
    }

    fn teardown(&mut self, teardown: Teardown<T>) {
        if let Some(delivery) = teardown.delivery {
            self.cancel.push(delivery);
        }
        self.deregister.push(teardown.observer);
    }

    fn run(self) {
        for subscription in self.cancel {
            subscription.cancel();
        }
        for registration in self.deregister {
            registration.dispose();
        }
        for subscription in self.start {
            subscription.start();
        }
    }
}

struct Inner<T> {
    config: SubjectConfig,
    broadcaster: Broadcaster<T>,
    registry: Mutex<Registry<T>>,
    edges: EdgeDispatcher,
    next_binding: AtomicU64,
}

impl<T: Clone + Send + 'static> Inner<T> {
    /// Run `f` inside the registry critical section, after sweeping out
    /// bindings of dropped owners.
    ///
    /// The activity edge is taken from the attached count before and after
    /// the whole section, so a replacement that detaches and re-attaches the
    /// same owner does not fire hooks.
    fn mutate<R>(&self, f: impl FnOnce(&mut Registry<T>, &mut Effects<T>) -> R) -> R {
        let mut effects = Effects::new();
        let result = {
            let mut registry = self.registry.lock();
            let before = registry.tracker.attached();
            registry.sweep(&mut effects);
            let result = f(&mut *registry, &mut effects);
            if let Some(edge) = ActivityEdge::between(before, registry.tracker.attached()) {
                self.edges.enqueue(edge);
            }
            result
        };
        effects.run();
        self.edges.flush(&self.config.name);
        result
    }

    fn sweep(&self) {
        self.mutate(|_, _| ());
    }

    fn attach(&self, key: OwnerKey, id: BindingId) {
        self.mutate(|registry, effects| registry.attach(&self.broadcaster, effects, key, id));
    }

    fn detach(&self, key: OwnerKey, id: BindingId) {
        self.mutate(|registry, effects| registry.detach(effects, key, id));
    }

    fn terminate(&self, key: OwnerKey, id: Option<BindingId>) -> Option<BindingId> {
        self.mutate(|registry, effects| registry.remove(effects, key, id))
    }

    fn holds(&self, key: OwnerKey, id: BindingId) -> bool {
        self.registry
            .lock()
            .bindings
            .get(&key)
            .is_some_and(|b| b.id() == id)
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        for (_, binding) in self.registry.get_mut().bindings.drain() {
            binding.terminate().observer.dispose();
        }
    }
}

/// Lifecycle observer installed for one binding.
struct BindingObserver<T> {
    subject: Weak<Inner<T>>,
    key: OwnerKey,
    binding: BindingId,
}

impl<T: Clone + Send + 'static> LifecycleObserver for BindingObserver<T> {
    fn on_start(&self) {
        if let Some(inner) = self.subject.upgrade() {
            inner.attach(self.key, self.binding);
        }
    }

    fn on_stop(&self) {
        if let Some(inner) = self.subject.upgrade() {
            inner.detach(self.key, self.binding);
        }
    }

    fn on_destroy(&self) {
        if let Some(inner) = self.subject.upgrade() {
            inner.terminate(self.key, Some(self.binding));
        }
    }
}

/// Disposal target behind a lifecycle-bound [`DisposalHandle`].
struct BindingHandle<T> {
    subject: Weak<Inner<T>>,
    key: OwnerKey,
    binding: BindingId,
}

impl<T: Clone + Send + 'static> Disposable for BindingHandle<T> {
    fn dispose(&self) {
        if let Some(inner) = self.subject.upgrade() {
            inner.terminate(self.key, Some(self.binding));
        }
    }

    /// True once the subject no longer holds this binding, however it went.
    ///
    /// `DisposalHandle` answers from its own flag, so this is only reached
    /// through the target directly.
    fn is_disposed(&self) -> bool {
        self.subject
            .upgrade()
            .map_or(true, |inner| !inner.holds(self.key, self.binding))
    }
}

/// A container for the latest value of `T` whose subscriptions follow their
/// owner's lifecycle.
///
/// Each owner gets at most one binding. A binding delivers only while its
/// owner is between start and stop: entering that window attaches a fresh
/// delivery subscription (which first receives the current value), leaving
/// it cancels the subscription, and destroying the owner removes the binding
/// for good. Subscriptions can also be torn down early through the returned
/// [`DisposalHandle`] or [`unsubscribe`](StateSubject::unsubscribe).
///
/// # Concurrency
///
/// Publishing may happen from any thread. Registration, removal and the
/// attached count share one critical section; consumers, transformers,
/// activity hooks and lifecycle calls always run outside it. Every binding
/// sees values in publish order, one at a time.
///
/// A consumer that panics is caught and logged; its binding stays attached
/// and [`consumer_failures`](StateSubject::consumer_failures) is incremented.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use state_subject::{LifecycleRegistry, LifecycleState, StateSubject, SubscribeOptions};
///
/// let subject = StateSubject::new();
/// subject.publish("hello".to_string());
///
/// let owner = Arc::new(LifecycleRegistry::new("screen"));
/// owner.mark_state(LifecycleState::Resumed);
///
/// subject.subscribe_with(&owner, SubscribeOptions::immediate(), |s: String| println!("{}", s));
/// assert!(subject.has_active_subscribers());
///
/// owner.mark_state(LifecycleState::Destroyed);
/// assert!(!subject.has_any_subscribers());
/// ```
pub struct StateSubject<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + 'static> StateSubject<T> {
    /// Empty subject with default config and no activity hooks.
    pub fn new() -> Self {
        Self::from_parts(SubjectConfig::default(), Arc::new(NoHooks), None)
    }

    /// Subject that already holds `value`.
    pub fn with_value(value: T) -> Self {
        Self::from_parts(SubjectConfig::default(), Arc::new(NoHooks), Some(value))
    }

    /// Empty subject with the given config and no activity hooks.
    pub fn with_config(config: SubjectConfig) -> Self {
        Self::from_parts(config, Arc::new(NoHooks), None)
    }

    /// Empty subject that reports activity edges to `hooks`.
    pub fn with_hooks(hooks: Arc<dyn ActivityHooks>) -> Self {
        Self::from_parts(SubjectConfig::default(), hooks, None)
    }

    /// Subject built from every piece: config, hooks and an optional initial value.
    pub fn from_parts(config: SubjectConfig, hooks: Arc<dyn ActivityHooks>, initial: Option<T>) -> Self {
        let name: Arc<str> = config.name.as_str().into();
        let broadcaster = match initial {
            Some(value) => Broadcaster::with_value(Arc::clone(&name), value),
            None => Broadcaster::named(Arc::clone(&name)),
        };

        Self {
            inner: Arc::new(Inner {
                config,
                broadcaster,
                registry: Mutex::new(Registry {
                    name,
                    bindings: HashMap::new(),
                    tracker: ActivityTracker::default(),
                }),
                edges: EdgeDispatcher::new(hooks),
                next_binding: AtomicU64::new(1),
            }),
        }
    }

    /// Name used to label this subject's log events.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    // --- Value ---

    /// The most recently published value, or `None` before the first publish.
    pub fn value(&self) -> Option<T> {
        self.inner.broadcaster.value()
    }

    /// The most recently published value.
    ///
    /// Fails with [`SubjectError::NoValuePresent`] before the first publish.
    pub fn current_value(&self) -> Result<T> {
        self.value().ok_or(SubjectError::NoValuePresent)
    }

    /// Store `value` and deliver it to every attached binding.
    ///
    /// Bindings of owners dropped without being destroyed are torn down
    /// first and get nothing.
    pub fn publish(&self, value: T) {
        self.inner.sweep();
        self.inner.broadcaster.publish(value);
    }

    // --- Subscriber queries ---

    /// True while any binding exists (attached or not) or any
    /// `subscribe_forever` subscription is live.
    pub fn has_any_subscribers(&self) -> bool {
        self.inner.sweep();
        self.inner.broadcaster.has_subscribers() || !self.inner.registry.lock().bindings.is_empty()
    }

    /// True while at least one binding is attached.
    pub fn has_active_subscribers(&self) -> bool {
        self.inner.sweep();
        self.attached_count() > 0
    }

    /// Bindings in any state.
    pub fn binding_count(&self) -> usize {
        self.inner.registry.lock().bindings.len()
    }

    /// Bindings whose owner is currently started.
    pub fn attached_count(&self) -> usize {
        self.inner.registry.lock().tracker.attached()
    }

    /// True if `owner` holds a binding in this subject.
    pub fn is_bound<L: ?Sized>(&self, owner: &Arc<L>) -> bool {
        self.inner.registry.lock().bindings.contains_key(&OwnerKey::of(owner))
    }

    /// State of the owner's binding, or `None` if it has none.
    pub fn binding_state<L: ?Sized>(&self, owner: &Arc<L>) -> Option<BindingState> {
        self.inner
            .registry
            .lock()
            .bindings
            .get(&OwnerKey::of(owner))
            .map(|b| b.state())
    }

    /// Identifies the owner's current delivery subscription, if attached.
    pub fn delivery_id<L: ?Sized>(&self, owner: &Arc<L>) -> Option<ListenerId> {
        self.inner
            .registry
            .lock()
            .bindings
            .get(&OwnerKey::of(owner))
            .and_then(|b| b.delivery().map(|d| d.id()))
    }

    /// Consumer and transformer panics caught so far.
    pub fn consumer_failures(&self) -> u64 {
        self.inner.broadcaster.consumer_failures()
    }

    // --- Subscriptions ---

    /// Bind `consumer` to `owner`'s lifecycle with default scheduling: attach
    /// on the background pool, deliver on the owner's main scheduler.
    pub fn subscribe<L, F>(&self, owner: &Arc<L>, consumer: F) -> DisposalHandle
    where
        L: Lifecycle + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe_with(owner, SubscribeOptions::default(), consumer)
    }

    /// Bind `consumer` to `owner`'s lifecycle.
    ///
    /// Any existing binding for `owner` is torn down first. If the owner is
    /// already destroyed, nothing is registered and the returned handle is
    /// already disposed.
    pub fn subscribe_with<L, F>(
        &self,
        owner: &Arc<L>,
        options: SubscribeOptions<T>,
        consumer: F,
    ) -> DisposalHandle
    where
        L: Lifecycle + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let owner: Arc<dyn Lifecycle> = Arc::clone(owner) as Arc<dyn Lifecycle>;
        self.bind(owner, options, Arc::new(consumer))
    }

    fn bind(&self, owner: Arc<dyn Lifecycle>, options: SubscribeOptions<T>, consumer: Consumer<T>) -> DisposalHandle {
        let name = self.name();
        if owner.current_state().is_terminal() {
            tracing::debug!(subject = %name, "Owner already destroyed, nothing to bind");
            return DisposalHandle::disposed();
        }

        let key = OwnerKey::of(&owner);
        let id = BindingId(self.inner.next_binding.fetch_add(1, Ordering::SeqCst));
        let observer = Arc::new(BindingObserver {
            subject: Arc::downgrade(&self.inner),
            key,
            binding: id,
        });

        let registration = match ObserverRegistration::register(&owner, observer) {
            Ok(registration) => registration,
            Err(SubjectError::AlreadyTerminated) => {
                tracing::debug!(subject = %name, "Owner destroyed during subscribe");
                return DisposalHandle::disposed();
            }
            Err(e) => {
                tracing::warn!(subject = %name, error = %e, "Failed to observe owner lifecycle");
                return DisposalHandle::disposed();
            }
        };

        let plan = DeliveryPlan {
            transformer: options.transformer,
            subscribe_on: options
                .subscribe_on
                .or_else(|| self.inner.config.subscribe_scheduler.clone())
                .unwrap_or_else(scheduler::background),
            deliver_on: options.deliver_on.unwrap_or_else(|| owner.main_scheduler()),
            consumer,
        };
        let binding = Binding::new(id, &owner, registration, plan);

        let bound = self.inner.mutate(|registry, effects| {
            if let Some(previous) = registry.remove(effects, key, None) {
                tracing::debug!(subject = %name, previous = previous.0, binding = id.0, "Replacing binding");
            }

            // Checked after registering, so no start/stop/destroy is missed.
            let state = owner.current_state();
            if state.is_terminal() {
                effects.teardown(binding.terminate());
                return false;
            }

            registry.bindings.insert(key, binding);
            tracing::debug!(subject = %name, binding = id.0, owner_state = %state, "Binding registered");
            if state.is_active() {
                registry.attach(&self.inner.broadcaster, effects, key, id);
            }
            true
        });

        if !bound {
            return DisposalHandle::disposed();
        }
        DisposalHandle::new(Arc::new(BindingHandle {
            subject: Arc::downgrade(&self.inner),
            key,
            binding: id,
        }))
    }

    /// Tear down `owner`'s binding. Returns false if it had none.
    pub fn unsubscribe<L: ?Sized>(&self, owner: &Arc<L>) -> bool {
        self.inner.terminate(OwnerKey::of(owner), None).is_some()
    }

    /// Subscribe with no lifecycle gating; delivery is inline on the
    /// publishing thread.
    ///
    /// Does not count towards [`has_active_subscribers`](StateSubject::has_active_subscribers).
    #[must_use = "the subscription lives until the handle is disposed"]
    pub fn subscribe_forever<F>(&self, consumer: F) -> DisposalHandle
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let subscription = self.inner.broadcaster.attach(AttachOptions::default(), consumer);
        DisposalHandle::new(Arc::new(subscription))
    }
}

impl<T: Clone + Send + 'static> Default for StateSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for StateSubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for StateSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("StateSubject")
            .field("name", &self.inner.config.name)
            .field("bindings", &registry.bindings.len())
            .field("attached", &registry.tracker.attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleRegistry, LifecycleState};

    fn handle_for(subject: &StateSubject<i32>, owner: &Arc<LifecycleRegistry>) -> BindingHandle<i32> {
        let key = OwnerKey::of(owner);
        let binding = subject.inner.registry.lock().bindings[&key].id();
        BindingHandle {
            subject: Arc::downgrade(&subject.inner),
            key,
            binding,
        }
    }

    #[test]
    fn test_binding_handle_tracks_lifecycle_teardown() {
        let subject = StateSubject::<i32>::new();
        let owner = Arc::new(LifecycleRegistry::new("screen"));
        owner.mark_state(LifecycleState::Started);
        subject.subscribe_with(&owner, SubscribeOptions::immediate(), |_| {});

        let target = handle_for(&subject, &owner);
        assert!(!target.is_disposed());

        owner.mark_state(LifecycleState::Destroyed);
        assert!(target.is_disposed());
    }

    #[test]
    fn test_binding_handle_ignores_newer_binding() {
        let subject = StateSubject::<i32>::new();
        let owner = Arc::new(LifecycleRegistry::new("screen"));
        owner.mark_state(LifecycleState::Created);
        subject.subscribe_with(&owner, SubscribeOptions::immediate(), |_| {});
        let old = handle_for(&subject, &owner);

        subject.subscribe_with(&owner, SubscribeOptions::immediate(), |_| {});
        assert!(old.is_disposed());

        old.dispose();
        assert!(subject.is_bound(&owner));

        drop(subject);
        assert!(old.is_disposed());
    }
}
