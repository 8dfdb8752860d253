//! Bridge error taxonomy.
//!
//! None of these variants terminates the host process: every failure is
//! degraded into a user-visible textual lifecycle event at the adapter
//! boundary.

use std::time::Duration;

/// Errors that can occur while bridging a query to the remote agent.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Malformed inbound request. Surfaced to the caller as an
    /// invalid-parameters failure; never retried.
    #[error("invalid request parameters: {0}")]
    Validation(String),

    /// No response arrived within the wait budget. Recovered locally into
    /// a needs-input event.
    #[error("no response from the remote agent within {waited:?}")]
    Timeout {
        /// How long the adapter waited before giving up.
        waited: Duration,
    },

    /// Failure during send/receive/classify. Recovered locally into a
    /// needs-input event carrying the detail.
    #[error("bridge fault: {0}")]
    Fault(String),

    /// The background runtime never reached readiness. Logged and
    /// non-fatal; every subsequent stream call will end in a timeout
    /// since dispatch can never occur.
    #[error("bridge runtime failed to start: {0}")]
    Startup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_mentions_duration() {
        let err = BridgeError::Timeout {
            waited: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn validation_message_carries_detail() {
        let err = BridgeError::Validation("query text is empty".to_string());
        assert_eq!(
            err.to_string(),
            "invalid request parameters: query text is empty"
        );
    }
}
