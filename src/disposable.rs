//! Cancelable registrations.
//!
//! Everything that can be torn down early implements [`Disposable`]: the raw
//! broadcaster subscription, the lifecycle observer registration held by a
//! binding, and the [`DisposalHandle`] returned to callers.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A registration that can be cancelled once.
///
/// `dispose` must be idempotent: calling it again, or from several threads
/// at once, has no further effect.
pub trait Disposable: Send + Sync {
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Caller-facing capability to tear down one subscription early.
///
/// Dropping the handle does NOT dispose it: lifecycle-bound subscriptions are
/// torn down by their owner, so the handle may be ignored.
pub struct DisposalHandle {
    target: Mutex<Option<Arc<dyn Disposable>>>,
}

impl DisposalHandle {
    pub(crate) fn new(target: Arc<dyn Disposable>) -> Self {
        Self {
            target: Mutex::new(Some(target)),
        }
    }

    /// A handle that is already disposed and does nothing.
    pub fn disposed() -> Self {
        Self {
            target: Mutex::new(None),
        }
    }

    /// Tear down the subscription. Only the first call has an effect.
    pub fn dispose(&self) {
        // Take under the lock, run outside it so teardown can re-enter.
        let target = self.target.lock().take();
        if let Some(target) = target {
            target.dispose();
        }
    }

    /// True once `dispose` has been called, or if the handle was created disposed.
    pub fn is_disposed(&self) -> bool {
        self.target.lock().is_none()
    }
}

impl Disposable for DisposalHandle {
    fn dispose(&self) {
        DisposalHandle::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        DisposalHandle::is_disposed(self)
    }
}

impl fmt::Debug for DisposalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposalHandle")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
