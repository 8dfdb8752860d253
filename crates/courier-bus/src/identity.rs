//! Bus endpoint identities.
//!
//! An [`Identity`] is an opaque address string. It is used both as the
//! fixed dispatch target of the bridge and as the correlation key for
//! inbound replies.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Address prefix for seed-derived identities.
const ADDRESS_PREFIX: &str = "agent1";

/// An opaque bus address naming a message endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an existing address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Derive a stable identity from a seed string.
    ///
    /// The address is `agent1` followed by the hex-encoded SHA-256 digest
    /// of the seed. The same seed always yields the same address, so an
    /// endpoint keeps its address across restarts.
    pub fn from_seed(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        Self(format!("{ADDRESS_PREFIX}{}", hex::encode(digest)))
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

impl From<String> for Identity {
    fn from(address: String) -> Self {
        Self(address)
    }
}
