//! The `Bus` trait -- the transport seam of the bridge.
//!
//! Each concrete transport (the in-process [`super::LocalBus`], a future
//! relay-backed transport, ...) implements this trait. The trait is
//! intentionally object-safe so it can be stored as `Arc<dyn Bus>` and
//! shared between the bridge runtime and its constructor.

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;

use crate::identity::Identity;
use crate::message::{Inbound, QueryMessage};

/// Transport interface for one bus endpoint.
///
/// Implementors own an address, can attach to the underlying substrate,
/// send queries to arbitrary identities, and expose the replies addressed
/// to them as a stream.
///
/// # Object Safety
///
/// This trait is object-safe: every method either returns a concrete type
/// or a boxed trait object, so it can be used as `Arc<dyn Bus>`.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Human-readable transport name (e.g. "local").
    fn name(&self) -> &str;

    /// The address of this endpoint.
    fn local_identity(&self) -> &Identity;

    /// Attach the endpoint to the substrate.
    ///
    /// After `bind` returns `Ok`, the endpoint can send and receive; this
    /// is the readiness point the bridge supervisor waits on.
    async fn bind(&self) -> Result<()>;

    /// Send a query to the given target identity.
    ///
    /// Delivery guarantees are whatever the transport provides; the
    /// bridge never retries on top of them.
    async fn send(&self, target: &Identity, msg: QueryMessage) -> Result<()>;

    /// Return the stream of replies addressed to this endpoint.
    ///
    /// The stream can be taken once. A second call yields an empty stream
    /// and logs a warning.
    fn inbound(&self) -> Pin<Box<dyn Stream<Item = Inbound> + Send>>;
}

// Compile-time assertion: Bus must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Bus) {}
};
