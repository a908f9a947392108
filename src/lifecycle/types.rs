//! Lifecycle states, events and the owner-side contract.

use crate::disposable::Disposable;
use crate::error::Result;
use crate::scheduler::{self, Scheduler};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Ordered lifecycle states. `Destroyed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Destroyed,
    Initialized,
    Created,
    Started,
    Resumed,
}

impl LifecycleState {
    /// True if this state is `other` or later.
    pub fn is_at_least(self, other: LifecycleState) -> bool {
        self >= other
    }

    /// Inside the window in which subscriptions deliver.
    pub fn is_active(self) -> bool {
        self.is_at_least(LifecycleState::Started)
    }

    /// True for `Destroyed`, which no state follows.
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Destroyed
    }

    /// Event that moves one step up from this state.
    pub(crate) fn step_up(self) -> Option<LifecycleEvent> {
        match self {
            LifecycleState::Initialized => Some(LifecycleEvent::Create),
            LifecycleState::Created => Some(LifecycleEvent::Start),
            LifecycleState::Started => Some(LifecycleEvent::Resume),
            LifecycleState::Resumed | LifecycleState::Destroyed => None,
        }
    }

    /// Event that moves one step down from this state.
    pub(crate) fn step_down(self) -> Option<LifecycleEvent> {
        match self {
            LifecycleState::Resumed => Some(LifecycleEvent::Pause),
            LifecycleState::Started => Some(LifecycleEvent::Stop),
            LifecycleState::Created | LifecycleState::Initialized => Some(LifecycleEvent::Destroy),
            LifecycleState::Destroyed => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Destroyed => "destroyed",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Created => "created",
            LifecycleState::Started => "started",
            LifecycleState::Resumed => "resumed",
        };
        f.write_str(s)
    }
}

/// Transitions between adjacent states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Create,
    Start,
    Resume,
    Pause,
    Stop,
    Destroy,
}

impl LifecycleEvent {
    /// State the owner is in once this event has been dispatched.
    pub fn target_state(self) -> LifecycleState {
        match self {
            LifecycleEvent::Create => LifecycleState::Created,
            LifecycleEvent::Start => LifecycleState::Started,
            LifecycleEvent::Resume => LifecycleState::Resumed,
            LifecycleEvent::Pause => LifecycleState::Started,
            LifecycleEvent::Stop => LifecycleState::Created,
            LifecycleEvent::Destroy => LifecycleState::Destroyed,
        }
    }
}

/// Callbacks for lifecycle transitions. All default to no-ops.
pub trait LifecycleObserver: Send + Sync {
    fn on_create(&self) {}

    fn on_start(&self) {}

    fn on_resume(&self) {}

    fn on_pause(&self) {}

    fn on_stop(&self) {}

    fn on_destroy(&self) {}
}

/// Dispatch one event to the matching observer callback.
pub(crate) fn dispatch(observer: &dyn LifecycleObserver, event: LifecycleEvent) {
    match event {
        LifecycleEvent::Create => observer.on_create(),
        LifecycleEvent::Start => observer.on_start(),
        LifecycleEvent::Resume => observer.on_resume(),
        LifecycleEvent::Pause => observer.on_pause(),
        LifecycleEvent::Stop => observer.on_stop(),
        LifecycleEvent::Destroy => observer.on_destroy(),
    }
}

/// Registration token returned by [`Lifecycle::add_observer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u64);

/// An object with an observable lifecycle that subscriptions are scoped to.
///
/// Observers only see transitions that happen after they are added; they are
/// not replayed past events.
pub trait Lifecycle: Send + Sync {
    fn current_state(&self) -> LifecycleState;

    /// Register an observer.
    ///
    /// Fails with [`SubjectError::AlreadyTerminated`](crate::SubjectError::AlreadyTerminated)
    /// once the owner is destroyed.
    fn add_observer(&self, observer: Arc<dyn LifecycleObserver>) -> Result<ObserverId>;

    /// Deregister an observer. Returns false if it was not registered.
    fn remove_observer(&self, id: ObserverId) -> bool;

    /// The owner's native context, used for deliveries unless overridden.
    fn main_scheduler(&self) -> Arc<dyn Scheduler> {
        scheduler::immediate()
    }
}

/// An observer registration that deregisters itself at most once.
pub struct ObserverRegistration {
    lifecycle: Weak<dyn Lifecycle>,
    id: ObserverId,
    removed: AtomicBool,
}

impl ObserverRegistration {
    /// Add `observer` to `lifecycle`.
    pub fn register(lifecycle: &Arc<dyn Lifecycle>, observer: Arc<dyn LifecycleObserver>) -> Result<Self> {
        let id = lifecycle.add_observer(observer)?;
        Ok(Self {
            lifecycle: Arc::downgrade(lifecycle),
            id,
            removed: AtomicBool::new(false),
        })
    }

    /// Token the observer was registered under.
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

impl Disposable for ObserverRegistration {
    fn dispose(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(lifecycle) = self.lifecycle.upgrade() {
            lifecycle.remove_observer(self.id);
        }
    }

    fn is_disposed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("id", &self.id)
            .field("removed", &self.removed.load(Ordering::Relaxed))
            .finish()
    }
}
