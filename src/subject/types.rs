//! Configuration for subjects and their subscriptions.

use crate::broadcast::Transformer;
use crate::scheduler::{self, Scheduler};
use std::fmt;
use std::sync::Arc;

/// Configuration for a [`StateSubject`](super::StateSubject).
#[derive(Clone)]
pub struct SubjectConfig {
    /// Label attached to every log event of this subject.
    /// Default: "state-subject"
    pub name: String,

    /// Subscribe-side scheduler for bindings that don't pick one.
    /// Default: None (the shared background pool)
    pub subscribe_scheduler: Option<Arc<dyn Scheduler>>,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            name: "state-subject".to_string(),
            subscribe_scheduler: None,
        }
    }
}

impl SubjectConfig {
    /// Default config with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl fmt::Debug for SubjectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectConfig")
            .field("name", &self.name)
            .field("subscribe_scheduler", &self.subscribe_scheduler.is_some())
            .finish()
    }
}

/// Per-subscription options, fixed at subscribe time.
pub struct SubscribeOptions<T> {
    /// Mapping/filtering stage between the subject and the consumer.
    pub transformer: Option<Transformer<T>>,

    /// Runs the attach step. None = subject default, then the background pool.
    pub subscribe_on: Option<Arc<dyn Scheduler>>,

    /// Runs the consumer. None = the owner's main scheduler.
    pub deliver_on: Option<Arc<dyn Scheduler>>,
}

impl<T> Default for SubscribeOptions<T> {
    fn default() -> Self {
        Self {
            transformer: None,
            subscribe_on: None,
            deliver_on: None,
        }
    }
}

impl<T> SubscribeOptions<T> {
    /// Attach and deliver inline on whichever thread triggers the work.
    pub fn immediate() -> Self {
        Self {
            transformer: None,
            subscribe_on: Some(scheduler::immediate()),
            deliver_on: Some(scheduler::immediate()),
        }
    }

    /// Map or filter values before they reach the consumer.
    pub fn transformer(mut self, transformer: Transformer<T>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Run the attach step on `scheduler`.
    pub fn subscribe_on(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.subscribe_on = Some(scheduler);
        self
    }

    /// Run the consumer on `scheduler`.
    pub fn deliver_on(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.deliver_on = Some(scheduler);
        self
    }
}

impl<T> fmt::Debug for SubscribeOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("transformer", &self.transformer.is_some())
            .field("subscribe_on", &self.subscribe_on.is_some())
            .field("deliver_on", &self.deliver_on.is_some())
            .finish()
    }
}
