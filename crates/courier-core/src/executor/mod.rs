//! Executor-facing glue: drive one task through the bridge.
//!
//! The protocol server owns task state and event envelopes; it hands the
//! bridge a [`StatusSink`] and this module maps the lifecycle-event
//! sequence onto it. Anything the mapping cannot classify drives the task
//! to a terminal failure instead of retrying.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::bridge::AgentBridge;
use crate::error::BridgeError;

/// Status surface the protocol server exposes for one task.
///
/// Implementations translate these calls into the server's own
/// task-status updates and artifacts. All of `needs_input`, `complete`,
/// and `fail` are terminal; nothing is called after them.
#[async_trait]
pub trait StatusSink: Send {
    /// Non-terminal progress update.
    async fn working(&mut self, text: &str) -> Result<()>;

    /// Terminal: the task needs more input from the user.
    async fn needs_input(&mut self, text: &str) -> Result<()>;

    /// Terminal: attach the result artifact and mark the task completed.
    async fn complete(&mut self, artifact: &str) -> Result<()>;

    /// Terminal: mark the task failed.
    async fn fail(&mut self, text: &str) -> Result<()>;
}

// Compile-time assertion: StatusSink must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn StatusSink) {}
};

/// How a driven task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The response completed the task.
    Completed,
    /// The task stopped awaiting more user input.
    InputRequired,
    /// Validation or an unclassifiable fault failed the task.
    Failed,
}

/// Run one query through the bridge and project its events onto `sink`.
///
/// An empty query is rejected up front as invalid parameters and is never
/// dispatched. Errors returned by the sink itself propagate to the
/// caller; they mean the server could not record a status, which is not
/// the bridge's failure to classify.
pub async fn execute(
    bridge: &AgentBridge,
    sink: &mut dyn StatusSink,
    query: &str,
    context_id: &str,
) -> Result<TaskOutcome> {
    if query.trim().is_empty() {
        let err = BridgeError::Validation("query text is empty".to_string());
        warn!(context_id = %context_id, error = %err, "rejecting request");
        sink.fail(&err.to_string()).await?;
        return Ok(TaskOutcome::Failed);
    }

    let mut events = bridge.stream(query, context_id);
    while let Some(event) = events.next().await {
        if !event.is_terminal() {
            debug!(context_id = %context_id, "task working");
            sink.working(&event.content).await?;
            continue;
        }
        if event.needs_input {
            debug!(context_id = %context_id, "task needs more input");
            sink.needs_input(&event.content).await?;
            return Ok(TaskOutcome::InputRequired);
        }
        debug!(context_id = %context_id, "task completed");
        sink.complete(&event.content).await?;
        return Ok(TaskOutcome::Completed);
    }

    // The stream contract guarantees a terminal event; reaching here
    // means the bridge broke that contract, which is unclassifiable.
    warn!(context_id = %context_id, "event stream ended without a terminal event");
    sink.fail("bridge produced no terminal event").await?;
    Ok(TaskOutcome::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    #[async_trait]
    impl StatusSink for NullSink {
        async fn working(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn needs_input(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn complete(&mut self, _artifact: &str) -> Result<()> {
            Ok(())
        }
        async fn fail(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn status_sink_is_object_safe() {
        let mut sink = NullSink;
        let _dyn_sink: &mut dyn StatusSink = &mut sink;
    }
}
