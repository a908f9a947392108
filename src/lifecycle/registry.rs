//! A concrete, manually driven lifecycle.

use super::types::{dispatch, Lifecycle, LifecycleEvent, LifecycleObserver, LifecycleState, ObserverId};
use crate::error::{Result, SubjectError};
use crate::scheduler::{self, Scheduler};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle driven by explicit events, one step at a time.
///
/// Moving several states at once (e.g. `Initialized` to `Resumed`) dispatches
/// every intermediate event in order. Observers are notified in registration
/// order, outside of any internal lock except the one serializing transitions.
pub struct LifecycleRegistry {
    name: String,
    state: Mutex<LifecycleState>,
    observers: Mutex<BTreeMap<ObserverId, Arc<dyn LifecycleObserver>>>,
    next_id: AtomicU64,
    /// Serializes transitions; re-entrant so an observer may drive the lifecycle.
    transition: ReentrantMutex<()>,
    main: Arc<dyn Scheduler>,
}

impl LifecycleRegistry {
    /// New registry in the `Initialized` state, delivering inline.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_scheduler(name, scheduler::immediate())
    }

    /// New registry whose native context is `main`.
    pub fn with_scheduler(name: impl Into<String>, main: Arc<dyn Scheduler>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LifecycleState::Initialized),
            observers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            transition: ReentrantMutex::new(()),
            main,
        }
    }

    /// Name used in log events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Move to the target state of `event`.
    pub fn handle_event(&self, event: LifecycleEvent) {
        self.mark_state(event.target_state());
    }

    /// Walk to `target`, dispatching each intermediate event.
    ///
    /// Ignored once destroyed. `Initialized` cannot be re-entered; asking for
    /// it from any other state dispatches nothing.
    pub fn mark_state(&self, target: LifecycleState) {
        let _transition = self.transition.lock();

        let current = *self.state.lock();
        if target == LifecycleState::Initialized && current != LifecycleState::Initialized {
            tracing::warn!(owner = %self.name, %current, %target, "Cannot move back to target state");
            return;
        }

        loop {
            let current = *self.state.lock();
            if current == target {
                return;
            }
            if current.is_terminal() {
                tracing::warn!(owner = %self.name, %target, "Ignoring transition of destroyed lifecycle");
                return;
            }

            let step = if target > current {
                current.step_up()
            } else {
                current.step_down()
            };
            let Some(event) = step else {
                return;
            };
            self.step(event);
        }
    }

    fn step(&self, event: LifecycleEvent) {
        *self.state.lock() = event.target_state();
        let observers: Vec<Arc<dyn LifecycleObserver>> =
            self.observers.lock().values().cloned().collect();

        tracing::debug!(owner = %self.name, ?event, observers = observers.len(), "Lifecycle event");
        for observer in observers {
            dispatch(observer.as_ref(), event);
        }

        if event == LifecycleEvent::Destroy {
            self.observers.lock().clear();
        }
    }
}

impl Lifecycle for LifecycleRegistry {
    fn current_state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn add_observer(&self, observer: Arc<dyn LifecycleObserver>) -> Result<ObserverId> {
        let state = self.state.lock();
        if state.is_terminal() {
            return Err(SubjectError::AlreadyTerminated);
        }
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.observers.lock().insert(id, observer);
        Ok(id)
    }

    fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.lock().remove(&id).is_some()
    }

    fn main_scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.main)
    }
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}
