//! Wire message shapes.
//!
//! Only two message shapes travel on the bus: a [`QueryMessage`] sent to
//! the remote agent and a [`ResponseMessage`] received back from it.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// A query dispatched to the remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMessage {
    /// The raw query text as received from the protocol layer.
    pub query: String,
}

/// A reply received from an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Free-form response text; classification happens downstream.
    pub response: String,
}

/// A reply together with the identity it arrived from.
///
/// The sender identity is the only correlation signal on the wire: the
/// bridge matches it against the recorded dispatch target of a pending
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Identity of the endpoint that sent the reply.
    pub sender: Identity,
    /// The reply payload.
    pub message: ResponseMessage,
}
