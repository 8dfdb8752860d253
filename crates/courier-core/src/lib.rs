//! Delegate-and-correlate bridge between a task protocol executor and a
//! remote agent reachable only over an asynchronous message bus.
//!
//! The protocol layer calls [`AgentBridge::stream`] with one query and
//! consumes a finite sequence of [`LifecycleEvent`]s. Behind that surface
//! the bridge enqueues the query in the [`CorrelationStore`], a background
//! runtime dispatches it to a fixed remote identity and resolves the
//! eventual reply by sender identity, and the adapter classifies the
//! resolved response into exactly one terminal event.
//!
//! # Architecture
//!
//! ```text
//! Executor
//!     |
//!     v
//! AgentBridge::stream(query, context_id)
//!     |  enqueue            poll take(id)
//!     v                          ^
//! CorrelationStore  <------------+---- the single shared state between
//!     ^        ^                       the two scheduling domains
//!     |        |
//!  dispatch   resolve
//!  loop       (inbound handler)
//!     |        ^
//!     v        |
//!   Arc<dyn Bus>  <---- remote agent (external)
//! ```

pub mod bridge;
pub mod classify;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod runtime;
pub mod store;

// Re-export the primary public API at the crate level.
pub use bridge::AgentBridge;
pub use classify::{Classification, LexicalClassifier, ResponseClassifier};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use event::LifecycleEvent;
pub use executor::{StatusSink, TaskOutcome, execute};
pub use store::{CorrelationStore, RequestId};
