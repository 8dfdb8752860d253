//! Lifecycle events yielded to the protocol executor.

use serde::Serialize;

/// One item in the event sequence produced by
/// [`crate::AgentBridge::stream`].
///
/// Exactly one terminal event is produced per stream: either `complete`
/// or `needs_input` is set. A non-terminal working event (both flags
/// false) may precede it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    /// The task finished and `content` is its result.
    pub complete: bool,
    /// The task cannot proceed without more input from the user.
    pub needs_input: bool,
    /// Human-readable payload: progress note, result, or failure text.
    pub content: String,
}

impl LifecycleEvent {
    /// Non-terminal progress event.
    pub fn working(content: impl Into<String>) -> Self {
        Self {
            complete: false,
            needs_input: false,
            content: content.into(),
        }
    }

    /// Terminal event carrying the final result.
    pub fn completed(content: impl Into<String>) -> Self {
        Self {
            complete: true,
            needs_input: false,
            content: content.into(),
        }
    }

    /// Terminal event asking the user for more input.
    pub fn needs_input(content: impl Into<String>) -> Self {
        Self {
            complete: false,
            needs_input: true,
            content: content.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        self.complete || self.needs_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_is_not_terminal() {
        let event = LifecycleEvent::working("Looking up the exchange rates...");
        assert!(!event.is_terminal());
        assert!(!event.complete);
        assert!(!event.needs_input);
    }

    #[test]
    fn completed_and_needs_input_are_terminal() {
        assert!(LifecycleEvent::completed("42.1 EUR").is_terminal());
        assert!(LifecycleEvent::needs_input("Which currency?").is_terminal());
    }

    #[test]
    fn serializes_with_flat_fields() {
        let event = LifecycleEvent::completed("42.1 EUR");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "complete": true,
                "needs_input": false,
                "content": "42.1 EUR",
            })
        );
    }
}
