//! Task bridge adapter -- the only surface the protocol executor calls.
//!
//! [`AgentBridge::stream`] turns one query into a lazy, finite sequence
//! of [`LifecycleEvent`]s: an immediate non-terminal working event, then
//! exactly one terminal event obtained by enqueueing the query, polling
//! the correlation store, and classifying whatever resolves -- or timing
//! out.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tracing::{debug, error, info};

use courier_bus::Bus;

use crate::classify::{Classification, ResponseClassifier};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::event::LifecycleEvent;
use crate::runtime::RuntimeHandle;
use crate::store::{CorrelationStore, RequestId};

/// Static placeholder yielded before any actual progress is known.
pub const WORKING_MESSAGE: &str = "Looking up the exchange rates...";

/// Terminal content when the wait budget elapses.
const TIMEOUT_MESSAGE: &str = "The request to the remote agent timed out. Please try again.";

/// Bridge between the protocol executor and the remote agent.
///
/// Construction spawns the background runtime and waits (bounded) for its
/// readiness. Concurrent [`AgentBridge::stream`] calls are supported; each
/// adds its own pending entry to the shared store.
pub struct AgentBridge {
    config: BridgeConfig,
    store: Arc<CorrelationStore>,
    classifier: Arc<dyn ResponseClassifier>,
    runtime: RuntimeHandle,
}

impl std::fmt::Debug for AgentBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBridge")
            .field("target", &self.config.target)
            .field("classifier", &self.classifier.name())
            .field("ready", &self.runtime.is_ready())
            .finish()
    }
}

impl AgentBridge {
    /// Spawn the bridge runtime over `bus` and wait for readiness.
    ///
    /// Startup failure is non-fatal: the bridge is returned either way,
    /// and an unready runtime deterministically turns every subsequent
    /// `stream` into a timeout since dispatch can never occur.
    pub async fn connect(
        config: BridgeConfig,
        bus: Arc<dyn Bus>,
        classifier: Arc<dyn ResponseClassifier>,
    ) -> Self {
        let store = Arc::new(CorrelationStore::new());
        let runtime = RuntimeHandle::spawn(&config, Arc::clone(&store), bus);

        if runtime
            .wait_ready(config.startup_poll, config.startup_attempts)
            .await
        {
            info!(target = %config.target, "bridge connected");
        } else {
            let err = BridgeError::Startup(
                "runtime did not reach readiness within the startup wait budget".to_string(),
            );
            error!(error = %err, "continuing without a ready runtime; streams will time out");
        }

        Self {
            config,
            store,
            classifier,
            runtime,
        }
    }

    /// Whether the background runtime is ready to dispatch.
    pub fn is_ready(&self) -> bool {
        self.runtime.is_ready()
    }

    /// Number of in-flight requests currently pending.
    pub fn pending_requests(&self) -> usize {
        self.store.pending_len()
    }

    /// Stop the background runtime and join its thread.
    pub fn shutdown(self) {
        self.runtime.shutdown();
    }

    /// Produce the lifecycle-event sequence for one query.
    ///
    /// The sequence always starts with a non-terminal working event and
    /// ends with exactly one terminal event: the classified response, a
    /// timeout notice, or a fault notice. It is finite, non-restartable,
    /// and dropping it early removes the request from the store.
    pub fn stream(
        &self,
        query: &str,
        context_id: &str,
    ) -> Pin<Box<dyn Stream<Item = LifecycleEvent> + Send>> {
        let store = Arc::clone(&self.store);
        let classifier = Arc::clone(&self.classifier);
        let poll = self.config.poll_period;
        let budget = self.config.wait_budget;
        let query = query.to_string();
        let context_id = context_id.to_string();

        Box::pin(async_stream::stream! {
            yield LifecycleEvent::working(WORKING_MESSAGE);

            let id = store.enqueue(&context_id, &query);
            debug!(request_id = %id, context_id = %context_id, "delegating query to remote agent");

            // If the consumer drops the stream before a terminal event,
            // the guard removes the request so it cannot linger pending
            // forever or leave an unread cached response behind.
            let mut guard = PendingGuard {
                store: Arc::clone(&store),
                id: id.clone(),
                armed: true,
            };

            match wait_for_response(store.as_ref(), &id, poll, budget).await {
                Ok(response) => {
                    guard.armed = false;
                    match classifier.classify(&response) {
                        Classification::NeedsInput => {
                            debug!(request_id = %id, "response asks for more input");
                            yield LifecycleEvent::needs_input(response);
                        }
                        Classification::Complete => {
                            debug!(request_id = %id, "response completes the task");
                            yield LifecycleEvent::completed(response);
                        }
                    }
                }
                Err(BridgeError::Timeout { waited }) => {
                    guard.armed = false;
                    store.expire(&id);
                    error!(request_id = %id, waited = ?waited, "query to remote agent timed out");
                    yield LifecycleEvent::needs_input(TIMEOUT_MESSAGE);
                }
                Err(err) => {
                    guard.armed = false;
                    store.abandon(&id);
                    error!(request_id = %id, error = %err, "bridge fault while awaiting response");
                    yield LifecycleEvent::needs_input(format!(
                        "Error communicating with the remote agent: {err}"
                    ));
                }
            }
        })
    }
}

/// Poll `take(id)` at the given cadence until the response arrives or the
/// wall-clock budget elapses.
async fn wait_for_response(
    store: &CorrelationStore,
    id: &RequestId,
    poll: Duration,
    budget: Duration,
) -> Result<String, BridgeError> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if let Some(response) = store.take(id) {
            return Ok(response);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(BridgeError::Timeout { waited: budget });
        }
        tokio::time::sleep_until((now + poll).min(deadline)).await;
    }
}

/// Removes a request from both store tables when a stream is dropped
/// before reaching its terminal event.
struct PendingGuard {
    store: Arc<CorrelationStore>,
    id: RequestId,
    armed: bool,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            self.store.abandon(&self.id);
            debug!(request_id = %self.id, "stream dropped before completion; abandoned request");
        }
    }
}
