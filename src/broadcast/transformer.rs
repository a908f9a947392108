//! Per-subscription mapping and filtering stage.

use std::fmt;
use std::sync::Arc;

type Stage<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// A pure stage between the broadcaster and a consumer.
///
/// Returning `None` drops the value for this subscription only. Stages are
/// fixed when the subscription is created and run on the delivery scheduler,
/// right before the consumer.
pub struct Transformer<T> {
    stage: Stage<T>,
}

impl<T: 'static> Transformer<T> {
    /// Map and filter in one step.
    pub fn filter_map<F>(f: F) -> Self
    where
        F: Fn(T) -> Option<T> + Send + Sync + 'static,
    {
        Self { stage: Arc::new(f) }
    }

    /// Replace every value with `f(value)`.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::filter_map(move |v| Some(f(v)))
    }

    /// Keep only values matching `predicate`.
    pub fn filter<P>(predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::filter_map(move |v| if predicate(&v) { Some(v) } else { None })
    }

    /// Run `self`, then `next` on whatever survives.
    pub fn then(self, next: Transformer<T>) -> Self {
        let first = self.stage;
        let second = next.stage;
        Self::filter_map(move |v| first(v).and_then(|v| second(v)))
    }

    /// Run the stage; `None` means the value is dropped.
    pub fn apply(&self, value: T) -> Option<T> {
        (self.stage)(value)
    }
}

impl<T> Clone for Transformer<T> {
    fn clone(&self) -> Self {
        Self {
            stage: Arc::clone(&self.stage),
        }
    }
}

impl<T> fmt::Debug for Transformer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transformer { .. }")
    }
}
