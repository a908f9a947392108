//! Owner lifecycles that subscriptions are scoped to.
//!
//! An owner moves through ordered states
//! (`Initialized -> Created -> Started -> Resumed`, and back down to the
//! terminal `Destroyed`) and notifies registered observers on every step.
//! Subscriptions deliver only while their owner is at least `Started`.

mod registry;
mod types;

pub use registry::LifecycleRegistry;
pub use types::{
    Lifecycle, LifecycleEvent, LifecycleObserver, LifecycleState, ObserverId,
    ObserverRegistration,
};
