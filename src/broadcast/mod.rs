//! Hot, latest-value broadcasting.
//!
//! [`Broadcaster`] holds the current value and fans it out:
//! - a new subscription receives the current value, then every later one
//! - each subscription has its own FIFO queue drained on its delivery scheduler
//! - cancelling a subscription stops deliveries immediately
//!
//! # Example
//!
//! ```
//! use state_subject::{AttachOptions, Broadcaster};
//!
//! let broadcaster = Broadcaster::with_value("counter", 1);
//! let subscription = broadcaster.attach(AttachOptions::default(), |v| println!("got {}", v));
//! broadcaster.publish(2);
//! subscription.cancel();
//! ```

mod broadcaster;
mod listener;
mod transformer;

pub use broadcaster::{AttachOptions, Broadcaster};
pub use listener::{Consumer, ListenerId, Subscription};
pub use transformer::Transformer;
