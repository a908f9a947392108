//! Edge detection over the number of attached bindings.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reacts to a subject gaining its first or losing its last attached binding.
///
/// Both hooks default to no-ops. They run outside the subject's locks, one
/// at a time and in the order the edges happened, so a hook may call back
/// into the subject.
pub trait ActivityHooks: Send + Sync {
    /// Attached bindings went from zero to at least one.
    fn on_active(&self) {}

    /// Attached bindings went from at least one to zero.
    fn on_inactive(&self) {}
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl ActivityHooks for NoHooks {}

/// Hooks that record whether the subject is currently active.
#[derive(Debug, Default)]
pub struct ActiveInactive {
    active: AtomicBool,
}

impl ActiveInactive {
    /// Create hooks that start out inactive.
    pub fn new() -> Self {
        Self::default()
    }

    /// True between an `on_active` and the next `on_inactive`.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl ActivityHooks for ActiveInactive {
    fn on_active(&self) {
        self.active.store(true, Ordering::Release);
    }

    fn on_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// A zero/non-zero transition of the attached count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityEdge {
    Active,
    Inactive,
}

impl ActivityEdge {
    /// The edge crossed going from `before` to `after` attached bindings, if any.
    pub fn between(before: usize, after: usize) -> Option<ActivityEdge> {
        match (before, after) {
            (0, n) if n > 0 => Some(ActivityEdge::Active),
            (n, 0) if n > 0 => Some(ActivityEdge::Inactive),
            _ => None,
        }
    }
}

/// Count of attached bindings. Lives inside the registry lock.
#[derive(Debug, Default)]
pub(crate) struct ActivityTracker {
    attached: usize,
}

impl ActivityTracker {
    pub(crate) fn attached(&self) -> usize {
        self.attached
    }

    pub(crate) fn attach(&mut self) {
        self.attached += 1;
    }

    pub(crate) fn detach(&mut self) {
        debug_assert!(self.attached > 0, "detach without attach");
        self.attached = self.attached.saturating_sub(1);
    }
}

struct EdgeQueue {
    pending: VecDeque<ActivityEdge>,
    firing: bool,
}

/// Runs hooks for queued edges, in order, one at a time.
///
/// Edges are enqueued while the registry lock is held, which fixes their
/// order; `flush` runs after the lock is released.
pub(crate) struct EdgeDispatcher {
    hooks: Arc<dyn ActivityHooks>,
    queue: Mutex<EdgeQueue>,
}

impl EdgeDispatcher {
    pub(crate) fn new(hooks: Arc<dyn ActivityHooks>) -> Self {
        Self {
            hooks,
            queue: Mutex::new(EdgeQueue {
                pending: VecDeque::new(),
                firing: false,
            }),
        }
    }

    pub(crate) fn enqueue(&self, edge: ActivityEdge) {
        self.queue.lock().pending.push_back(edge);
    }

    /// Fire pending edges unless another caller is already doing so.
    pub(crate) fn flush(&self, subject: &str) {
        {
            let mut queue = self.queue.lock();
            if queue.firing || queue.pending.is_empty() {
                return;
            }
            queue.firing = true;
        }

        loop {
            let edge = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(edge) => edge,
                    None => {
                        queue.firing = false;
                        return;
                    }
                }
            };

            tracing::debug!(subject, ?edge, "Activity edge");
            let hooks = &self.hooks;
            let result = panic::catch_unwind(AssertUnwindSafe(|| match edge {
                ActivityEdge::Active => hooks.on_active(),
                ActivityEdge::Inactive => hooks.on_inactive(),
            }));
            if result.is_err() {
                tracing::error!(subject, ?edge, "Activity hook panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ActivityEdge>>);

    impl ActivityHooks for Recorder {
        fn on_active(&self) {
            self.0.lock().push(ActivityEdge::Active);
        }

        fn on_inactive(&self) {
            self.0.lock().push(ActivityEdge::Inactive);
        }
    }

    #[test]
    fn test_edges_only_on_zero_crossings() {
        assert_eq!(ActivityEdge::between(0, 1), Some(ActivityEdge::Active));
        assert_eq!(ActivityEdge::between(0, 3), Some(ActivityEdge::Active));
        assert_eq!(ActivityEdge::between(1, 2), None);
        assert_eq!(ActivityEdge::between(2, 1), None);
        assert_eq!(ActivityEdge::between(1, 0), Some(ActivityEdge::Inactive));
        assert_eq!(ActivityEdge::between(0, 0), None);
        assert_eq!(ActivityEdge::between(1, 1), None);
    }

    #[test]
    fn test_dispatcher_fires_in_order() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = EdgeDispatcher::new(recorder.clone());

        dispatcher.enqueue(ActivityEdge::Active);
        dispatcher.enqueue(ActivityEdge::Inactive);
        dispatcher.flush("test");
        dispatcher.flush("test");

        assert_eq!(
            *recorder.0.lock(),
            vec![ActivityEdge::Active, ActivityEdge::Inactive]
        );
    }

    #[test]
    fn test_active_inactive_hooks() {
        let hooks = ActiveInactive::new();
        assert!(!hooks.is_active());
        hooks.on_active();
        assert!(hooks.is_active());
        hooks.on_inactive();
        assert!(!hooks.is_active());
    }

    #[test]
    fn test_panicking_hook_does_not_wedge_dispatcher() {
        struct Exploding;
        impl ActivityHooks for Exploding {
            fn on_active(&self) {
                panic!("hook failure");
            }
        }

        let dispatcher = EdgeDispatcher::new(Arc::new(Exploding));
        dispatcher.enqueue(ActivityEdge::Active);
        dispatcher.flush("test");

        dispatcher.enqueue(ActivityEdge::Inactive);
        dispatcher.flush("test");
        assert!(dispatcher.queue.lock().pending.is_empty());
    }
}
