//! Lifecycle-scoped state subjects.
//!
//! A [`StateSubject`] keeps the latest value and delivers it to subscribers
//! that are bound to an owner's [`Lifecycle`](crate::Lifecycle):
//! - delivery runs only while the owner is started
//! - each owner holds at most one binding
//! - bindings are removed when the owner is destroyed, the caller disposes
//!   the returned handle, or the owner is unsubscribed
//!
//! Activity hooks report when the first binding attaches and when the last
//! one detaches.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use state_subject::{
//!     ActiveInactive, LifecycleRegistry, LifecycleState, StateSubject, SubscribeOptions,
//! };
//!
//! let hooks = Arc::new(ActiveInactive::new());
//! let subject = StateSubject::<bool>::with_hooks(hooks.clone());
//!
//! let owner = Arc::new(LifecycleRegistry::new("activity"));
//! owner.mark_state(LifecycleState::Started);
//!
//! let handle = subject.subscribe_with(&owner, SubscribeOptions::immediate(), |_| {});
//! assert!(hooks.is_active());
//!
//! handle.dispose();
//! assert!(!hooks.is_active());
//! ```

mod activity;
mod binding;
mod manager;
mod types;

pub use activity::{ActiveInactive, ActivityEdge, ActivityHooks, NoHooks};
pub use binding::{BindingId, BindingState};
pub use manager::StateSubject;
pub use types::{SubjectConfig, SubscribeOptions};
