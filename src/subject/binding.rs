//! Per-owner bindings between a lifecycle registration and a delivery.

use crate::broadcast::{AttachOptions, Broadcaster, Consumer, Subscription, Transformer};
use crate::lifecycle::{Lifecycle, ObserverRegistration};
use crate::scheduler::Scheduler;
use std::fmt;
use std::sync::{Arc, Weak};

/// Unique identifier for one binding within a subject.
///
/// Re-subscribing an owner creates a binding with a new id, so a handle to
/// the old binding cannot tear down the new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingId(pub u64);

/// Where a binding is in its lifecycle.
///
/// A terminated binding is removed from its subject, so `Terminated` is only
/// ever observed through events and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    /// Registered; the owner has not entered its active window yet.
    Unattached,
    /// Delivery subscription is live.
    Attached,
    /// The owner left its active window; the registration is still held.
    Detached,
    /// Observer deregistered and binding removed.
    Terminated,
}

/// Identity of an owner, taken from its allocation address.
///
/// Bindings keep a `Weak` to the owner, which keeps the allocation (and so
/// the address) reserved for as long as the key is in use. An owner dropped
/// without being destroyed leaves a binding whose `Weak` no longer upgrades;
/// the subject sweeps those out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct OwnerKey(usize);

impl OwnerKey {
    pub(crate) fn of<L: ?Sized>(owner: &Arc<L>) -> Self {
        OwnerKey(Arc::as_ptr(owner) as *const () as usize)
    }
}

/// Everything needed to (re)create the delivery subscription.
pub(crate) struct DeliveryPlan<T> {
    pub(crate) transformer: Option<Transformer<T>>,
    pub(crate) subscribe_on: Arc<dyn Scheduler>,
    pub(crate) deliver_on: Arc<dyn Scheduler>,
    pub(crate) consumer: Consumer<T>,
}

/// Work a terminated binding leaves behind, run once the registry lock is released.
pub(crate) struct Teardown<T> {
    pub(crate) delivery: Option<Subscription<T>>,
    pub(crate) observer: ObserverRegistration,
}

pub(crate) struct Binding<T> {
    id: BindingId,
    owner: Weak<dyn Lifecycle>,
    observer: ObserverRegistration,
    plan: DeliveryPlan<T>,
    delivery: Option<Subscription<T>>,
    state: BindingState,
}

impl<T: Clone + Send + 'static> Binding<T> {
    pub(crate) fn new(
        id: BindingId,
        owner: &Arc<dyn Lifecycle>,
        observer: ObserverRegistration,
        plan: DeliveryPlan<T>,
    ) -> Self {
        Self {
            id,
            owner: Arc::downgrade(owner),
            observer,
            plan,
            delivery: None,
            state: BindingState::Unattached,
        }
    }

    /// Create a fresh delivery subscription.
    ///
    /// Returns the subscription to start once the registry lock is released,
    /// or `None` if already attached.
    pub(crate) fn attach(&mut self, broadcaster: &Broadcaster<T>) -> Option<Subscription<T>> {
        if self.delivery.is_some() {
            return None;
        }
        let options = AttachOptions {
            subscribe_on: Arc::clone(&self.plan.subscribe_on),
            deliver_on: Arc::clone(&self.plan.deliver_on),
            transformer: self.plan.transformer.clone(),
        };
        let subscription = broadcaster.prepare(options, Arc::clone(&self.plan.consumer));
        self.delivery = Some(subscription.clone());
        self.state = BindingState::Attached;
        Some(subscription)
    }

    /// Drop the delivery subscription, keeping the registration.
    ///
    /// Returns the subscription to cancel, or `None` if not attached.
    pub(crate) fn detach(&mut self) -> Option<Subscription<T>> {
        let delivery = self.delivery.take()?;
        self.state = BindingState::Detached;
        Some(delivery)
    }
}

impl<T> Binding<T> {
    pub(crate) fn id(&self) -> BindingId {
        self.id
    }

    pub(crate) fn state(&self) -> BindingState {
        self.state
    }

    pub(crate) fn delivery(&self) -> Option<&Subscription<T>> {
        self.delivery.as_ref()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.delivery.is_some()
    }

    /// False once every strong reference to the owner is gone.
    pub(crate) fn owner_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    pub(crate) fn terminate(self) -> Teardown<T> {
        Teardown {
            delivery: self.delivery,
            observer: self.observer,
        }
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("observer", &self.observer)
            .field("delivery", &self.delivery)
            .finish()
    }
}
