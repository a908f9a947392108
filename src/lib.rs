//! # State Subject
//!
//! A container that always holds the most recent value of `T` and delivers
//! it, and every later value, to subscribers whose delivery is scoped to an
//! owner's lifecycle.
//!
//! ## Core Concepts
//!
//! - **Broadcaster**: latest-value fan-out with per-subscriber FIFO delivery
//! - **Lifecycle**: an owner's ordered state machine (`Created`, `Started`, ...)
//! - **Binding**: one owner's registration, attached only while it is started
//! - **Scheduler**: where attaching and delivering run
//! - **Activity hooks**: fire when the first binding attaches and the last detaches
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use state_subject::{
//!     LifecycleRegistry, LifecycleState, StateSubject, SubscribeOptions, Transformer,
//! };
//!
//! let subject = StateSubject::new();
//! let owner = Arc::new(LifecycleRegistry::new("main"));
//! owner.mark_state(LifecycleState::Resumed);
//!
//! let handle = subject.subscribe_with(
//!     &owner,
//!     SubscribeOptions::immediate().transformer(Transformer::map(|s: String| s + "!")),
//!     |s| println!("{}", s),
//! );
//!
//! subject.publish("tick".to_string());
//! assert_eq!(subject.current_value().unwrap(), "tick");
//!
//! handle.dispose();
//! assert!(!subject.has_any_subscribers());
//! ```

pub mod broadcast;
pub mod disposable;
pub mod error;
pub mod lifecycle;
pub mod scheduler;
pub mod subject;

// Re-exports
pub use broadcast::{AttachOptions, Broadcaster, Consumer, ListenerId, Subscription, Transformer};
pub use disposable::{Disposable, DisposalHandle};
pub use error::{Result, SubjectError};
pub use lifecycle::{
    Lifecycle, LifecycleEvent, LifecycleObserver, LifecycleRegistry, LifecycleState, ObserverId,
    ObserverRegistration,
};
pub use scheduler::{Immediate, Scheduler, Task, WorkerPool};
pub use subject::{
    ActiveInactive, ActivityEdge, ActivityHooks, BindingId, BindingState, NoHooks, StateSubject,
    SubjectConfig, SubscribeOptions,
};
