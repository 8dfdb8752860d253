//! Messaging substrate interface for the courier bridge.
//!
//! This crate defines the [`Bus`] trait that transports implement, the
//! identity type used to address endpoints, the two wire message shapes
//! ([`QueryMessage`] and [`ResponseMessage`]), and an in-process loopback
//! transport ([`LocalBus`]) used by tests and local demos.
//!
//! # Architecture
//!
//! ```text
//! BridgeRuntime
//!     |
//!     v
//! Arc<dyn Bus>
//!     |   bind() --------> transport attaches; endpoint is reachable
//!     |   send(target, QueryMessage)
//!     |   inbound() -----> Stream<Inbound { sender, ResponseMessage }>
//! ```
//!
//! Identities are opaque address strings. The only correlation signal a
//! reply carries is its sender identity; there is no request id on the
//! wire.

pub mod identity;
pub mod local;
pub mod message;
pub mod trait_def;

// Re-export the primary public API at the crate level.
pub use identity::Identity;
pub use local::LocalBus;
pub use message::{Inbound, QueryMessage, ResponseMessage};
pub use trait_def::Bus;
