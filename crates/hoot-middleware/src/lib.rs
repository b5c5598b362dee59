//! `hoot-middleware` – The Nervous System
//!
//! Routes events between the command core and its downstream consumers
//! (speech synthesis, operator consoles) without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – process-wide, string-topic publish/subscribe event bus with a
//!   dedicated queue and task per subscriber.

pub mod bus;

pub use bus::{EventBus, EventHandler, FnHandler, Subscription, TopicReceiver, handler_fn};
