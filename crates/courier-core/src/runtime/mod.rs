//! Background bridge runtime: dispatch loop, inbound handler, supervisor.
//!
//! The runtime lives on its own OS thread with a dedicated current-thread
//! tokio runtime, so the executor's scheduling domain never shares a
//! scheduler with it. The [`CorrelationStore`] is the only state crossing
//! the boundary.
//!
//! By default the runtime lives for the process lifetime; dropping the
//! handle detaches the thread. [`RuntimeHandle::shutdown`] cancels the
//! loops and joins the thread for supervised teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_bus::{Bus, Identity, Inbound, QueryMessage};

use crate::config::BridgeConfig;
use crate::store::CorrelationStore;

/// Reply preview length in diagnostic logs.
const PREVIEW_CHARS: usize = 100;

/// Handle to a spawned bridge runtime.
pub struct RuntimeHandle {
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("ready", &self.is_ready())
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl RuntimeHandle {
    /// Spawn the runtime thread hosting the dispatch loop and the
    /// inbound handler.
    ///
    /// Never fails: a thread or runtime construction error is logged and
    /// leaves the handle permanently not-ready, which downstream shows up
    /// as every stream timing out.
    pub fn spawn(
        config: &BridgeConfig,
        store: Arc<CorrelationStore>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        let ready = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let target = config.target.clone();
        let dispatch_period = config.dispatch_period;
        let ready_flag = Arc::clone(&ready);
        let cancel_child = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("courier-bridge-runtime".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "failed to build bridge runtime");
                        return;
                    }
                };
                runtime.block_on(run(
                    target,
                    dispatch_period,
                    store,
                    bus,
                    ready_flag,
                    cancel_child,
                ));
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn bridge runtime thread");
                None
            }
        };

        Self {
            ready,
            cancel,
            thread,
        }
    }

    /// Whether the runtime has bound its transport and can send/receive.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Wait for readiness, polling at `poll` up to `attempts` times.
    ///
    /// Returns the final readiness state; `false` means the bounded wait
    /// elapsed without the runtime coming up.
    pub async fn wait_ready(&self, poll: Duration, attempts: u32) -> bool {
        for _ in 0..attempts {
            if self.is_ready() {
                return true;
            }
            tokio::time::sleep(poll).await;
        }
        self.is_ready()
    }

    /// Stop the loops and join the runtime thread.
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("bridge runtime thread panicked during shutdown");
            }
        }
        self.ready.store(false, Ordering::SeqCst);
    }
}

/// Main loop: bind, signal readiness, then interleave dispatch ticks and
/// inbound replies until cancelled.
async fn run(
    target: Identity,
    dispatch_period: Duration,
    store: Arc<CorrelationStore>,
    bus: Arc<dyn Bus>,
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    if let Err(e) = bus.bind().await {
        error!(
            transport = bus.name(),
            error = %e,
            "failed to bind bus transport; bridge will never become ready"
        );
        return;
    }
    ready.store(true, Ordering::SeqCst);
    info!(
        transport = bus.name(),
        address = %bus.local_identity(),
        target = %target,
        "bridge runtime started"
    );

    let mut inbound = bus.inbound();
    let mut inbound_open = true;

    let mut ticker = tokio::time::interval(dispatch_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("bridge runtime shutting down");
                break;
            }
            _ = ticker.tick() => {
                dispatch_unsent(&target, store.as_ref(), bus.as_ref()).await;
            }
            reply = inbound.next(), if inbound_open => {
                match reply {
                    Some(inbound) => handle_reply(store.as_ref(), inbound),
                    None => {
                        warn!("inbound stream closed; no further replies will arrive");
                        inbound_open = false;
                    }
                }
            }
        }
    }
}

/// One dispatch tick: send every pending, not-yet-sent entry to the fixed
/// target, then record the target.
///
/// Each entry is attempted exactly once. A send error is logged and the
/// entry is still marked sent: there is no retry or backoff beyond the
/// transport's own delivery guarantees.
async fn dispatch_unsent(target: &Identity, store: &CorrelationStore, bus: &dyn Bus) {
    for (id, query) in store.unsent() {
        if let Err(e) = bus.send(target, QueryMessage { query }).await {
            warn!(request_id = %id, target = %target, error = %e, "failed to dispatch query");
        }
        store.mark_sent(&id, target.clone());
        debug!(request_id = %id, target = %target, "dispatched query");
    }
}

/// Inbound handler: resolve the reply against a pending entry by sender
/// identity. Replies with no matching entry (late, duplicate, or
/// unsolicited) are dropped.
fn handle_reply(store: &CorrelationStore, inbound: Inbound) {
    let Inbound { sender, message } = inbound;
    let preview: String = message.response.chars().take(PREVIEW_CHARS).collect();
    if store.resolve(&sender, &message.response) {
        info!(sender = %sender, preview = %preview, "received response from remote agent");
    } else {
        debug!(sender = %sender, "dropping reply with no matching pending request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use courier_bus::{LocalBus, ResponseMessage};
    use futures::Stream;
    use std::pin::Pin;

    fn test_config(target: Identity) -> BridgeConfig {
        let mut config = BridgeConfig::new(target);
        config.dispatch_period = Duration::from_millis(20);
        config
    }

    /// Remote agent emulation: replies to every query with `reply(query)`.
    async fn spawn_responder<F>(seed: &str, reply: F) -> Identity
    where
        F: Fn(String) -> String + Send + 'static,
    {
        let agent = Arc::new(LocalBus::endpoint(seed, true));
        agent.bind().await.unwrap();
        let address = agent.local_identity().clone();
        let mut queries = agent.queries();
        tokio::spawn(async move {
            while let Some((sender, query)) = queries.next().await {
                let response = ResponseMessage {
                    response: reply(query.query),
                };
                let _ = agent.respond(&sender, response).await;
            }
        });
        address
    }

    #[tokio::test]
    async fn runtime_reaches_readiness() {
        let target = Identity::from_seed("runtime-test-nowhere");
        let store = Arc::new(CorrelationStore::new());
        let bus = Arc::new(LocalBus::endpoint("runtime-test-ready", true));

        let handle = RuntimeHandle::spawn(&test_config(target), store, bus);
        assert!(handle.wait_ready(Duration::from_millis(10), 200).await);
        handle.shutdown();
    }

    #[tokio::test]
    async fn runtime_dispatches_and_resolves() {
        let target = spawn_responder("runtime-test-echo-agent", |q| format!("echo:{q}")).await;
        let store = Arc::new(CorrelationStore::new());
        let bus = Arc::new(LocalBus::endpoint("runtime-test-bridge", true));

        let handle =
            RuntimeHandle::spawn(&test_config(target), Arc::clone(&store), bus);
        assert!(handle.wait_ready(Duration::from_millis(10), 200).await);

        let id = store.enqueue("ctx", "ping");

        let mut response = None;
        for _ in 0..100 {
            if let Some(found) = store.take(&id) {
                response = Some(found);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(response.as_deref(), Some("echo:ping"));
        assert!(!store.contains_pending(&id));
        handle.shutdown();
    }

    #[tokio::test]
    async fn send_failure_still_marks_sent() {
        // Target identity is never bound, so every send fails.
        let target = Identity::from_seed("runtime-test-black-hole");
        let store = Arc::new(CorrelationStore::new());
        let bus = Arc::new(LocalBus::endpoint("runtime-test-hopeful", true));

        let handle =
            RuntimeHandle::spawn(&test_config(target), Arc::clone(&store), bus);
        assert!(handle.wait_ready(Duration::from_millis(10), 200).await);

        let _id = store.enqueue("ctx", "into the void");

        // One attempt, no retry: the entry must leave the unsent set.
        for _ in 0..100 {
            if store.unsent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(store.unsent().is_empty());
        assert_eq!(store.pending_len(), 1);
        handle.shutdown();
    }

    #[tokio::test]
    async fn bind_failure_leaves_runtime_not_ready() {
        struct BrokenBus {
            identity: Identity,
        }

        #[async_trait]
        impl Bus for BrokenBus {
            fn name(&self) -> &str {
                "broken"
            }
            fn local_identity(&self) -> &Identity {
                &self.identity
            }
            async fn bind(&self) -> Result<()> {
                anyhow::bail!("transport unavailable")
            }
            async fn send(&self, _target: &Identity, _msg: QueryMessage) -> Result<()> {
                anyhow::bail!("not bound")
            }
            fn inbound(&self) -> Pin<Box<dyn Stream<Item = Inbound> + Send>> {
                Box::pin(futures::stream::empty())
            }
        }

        let store = Arc::new(CorrelationStore::new());
        let bus = Arc::new(BrokenBus {
            identity: Identity::from_seed("runtime-test-broken"),
        });
        let handle = RuntimeHandle::spawn(
            &test_config(Identity::from_seed("runtime-test-nowhere")),
            store,
            bus,
        );

        assert!(!handle.wait_ready(Duration::from_millis(10), 10).await);
        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_joins_the_thread() {
        let store = Arc::new(CorrelationStore::new());
        let bus = Arc::new(LocalBus::endpoint("runtime-test-shutdown", true));
        let handle = RuntimeHandle::spawn(
            &test_config(Identity::from_seed("runtime-test-nowhere")),
            store,
            bus,
        );
        assert!(handle.wait_ready(Duration::from_millis(10), 200).await);
        // Returns promptly and the handle is consumed.
        handle.shutdown();
    }
}
