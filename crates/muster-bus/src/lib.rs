//! Synchronous publish/subscribe backbone for the Muster engine.
//!
//! Every state change in the engine is announced on this bus. Delivery is
//! synchronous: by the time `publish` returns, every current subscriber for
//! that event kind has run. That property is what lets a caller submit a task
//! and immediately read a consistent view of the queue.
//!
//! # Main types
//!
//! - [`EventBus`] — The bus itself; shared via `Arc` across components.
//! - [`SubscriptionId`] — Token returned by `subscribe`, used to unsubscribe.

/// The bus implementation.
pub mod bus;

pub use bus::{EventBus, SubscriptionId};
