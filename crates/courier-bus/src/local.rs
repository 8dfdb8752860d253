//! In-process loopback transport.
//!
//! [`LocalBus`] routes messages between endpoints living in the same
//! process through a process-global router keyed by identity. It exists
//! for tests and local demos; a federated relay transport would implement
//! [`Bus`] against a real substrate instead.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::identity::Identity;
use crate::message::{Inbound, QueryMessage, ResponseMessage};
use crate::trait_def::Bus;

/// Queue depth per endpoint inbox.
const INBOX_CAPACITY: usize = 64;

/// Per-endpoint inbox senders held by the router.
#[derive(Clone)]
struct Inboxes {
    queries: mpsc::Sender<(Identity, QueryMessage)>,
    responses: mpsc::Sender<Inbound>,
}

/// The process-global router: identity -> inboxes of the bound endpoint.
fn router() -> &'static Mutex<HashMap<Identity, Inboxes>> {
    static ROUTER: OnceLock<Mutex<HashMap<Identity, Inboxes>>> = OnceLock::new();
    ROUTER.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lookup(target: &Identity) -> Option<Inboxes> {
    router()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(target)
        .cloned()
}

/// An in-process bus endpoint.
///
/// Each endpoint derives its address from a seed and owns two inboxes:
/// one for queries (consumed by agent emulations via [`LocalBus::queries`])
/// and one for replies (consumed by the bridge runtime via
/// [`Bus::inbound`]).
pub struct LocalBus {
    identity: Identity,
    relay_enabled: bool,
    bound: AtomicBool,
    inboxes: Inboxes,
    queries_rx: Mutex<Option<mpsc::Receiver<(Identity, QueryMessage)>>>,
    responses_rx: Mutex<Option<mpsc::Receiver<Inbound>>>,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("identity", &self.identity)
            .field("relay_enabled", &self.relay_enabled)
            .field("bound", &self.bound.load(Ordering::SeqCst))
            .finish()
    }
}

impl LocalBus {
    /// Create an endpoint whose address is derived from `seed`.
    ///
    /// The endpoint is not reachable until [`Bus::bind`] is called. The
    /// relay flag is recorded for parity with relay-backed transports;
    /// the loopback router ignores it.
    pub fn endpoint(seed: &str, relay_enabled: bool) -> Self {
        let (query_tx, query_rx) = mpsc::channel(INBOX_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel(INBOX_CAPACITY);
        Self {
            identity: Identity::from_seed(seed),
            relay_enabled,
            bound: AtomicBool::new(false),
            inboxes: Inboxes {
                queries: query_tx,
                responses: response_tx,
            },
            queries_rx: Mutex::new(Some(query_rx)),
            responses_rx: Mutex::new(Some(response_rx)),
        }
    }

    /// Whether this endpoint was configured with relay/mailbox enabled.
    pub fn relay_enabled(&self) -> bool {
        self.relay_enabled
    }

    /// Return the stream of queries addressed to this endpoint.
    ///
    /// Used by agent emulations standing in for the remote agent. Take
    /// once; a second call yields an empty stream.
    pub fn queries(&self) -> Pin<Box<dyn Stream<Item = (Identity, QueryMessage)> + Send>> {
        let rx = self
            .queries_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match rx {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => {
                warn!(identity = %self.identity, "query stream already taken");
                Box::pin(futures::stream::empty())
            }
        }
    }

    /// Send a reply to `target`, stamped with this endpoint's identity.
    pub async fn respond(&self, target: &Identity, msg: ResponseMessage) -> Result<()> {
        let Some(inboxes) = lookup(target) else {
            bail!("no endpoint bound for identity {target}");
        };
        inboxes
            .responses
            .send(Inbound {
                sender: self.identity.clone(),
                message: msg,
            })
            .await
            .with_context(|| format!("endpoint {target} is gone"))?;
        Ok(())
    }
}

#[async_trait]
impl Bus for LocalBus {
    fn name(&self) -> &str {
        "local"
    }

    fn local_identity(&self) -> &Identity {
        &self.identity
    }

    async fn bind(&self) -> Result<()> {
        let mut table = router().lock().unwrap_or_else(|e| e.into_inner());
        if table
            .insert(self.identity.clone(), self.inboxes.clone())
            .is_some()
        {
            warn!(identity = %self.identity, "replacing previously bound endpoint");
        }
        drop(table);
        self.bound.store(true, Ordering::SeqCst);
        debug!(identity = %self.identity, "endpoint bound");
        Ok(())
    }

    async fn send(&self, target: &Identity, msg: QueryMessage) -> Result<()> {
        let Some(inboxes) = lookup(target) else {
            bail!("no endpoint bound for identity {target}");
        };
        inboxes
            .queries
            .send((self.identity.clone(), msg))
            .await
            .with_context(|| format!("endpoint {target} is gone"))?;
        Ok(())
    }

    fn inbound(&self) -> Pin<Box<dyn Stream<Item = Inbound> + Send>> {
        let rx = self
            .responses_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match rx {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => {
                warn!(identity = %self.identity, "inbound stream already taken");
                Box::pin(futures::stream::empty())
            }
        }
    }
}

impl Drop for LocalBus {
    fn drop(&mut self) {
        if self.bound.load(Ordering::SeqCst) {
            router()
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&self.identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn query_roundtrip_between_two_endpoints() {
        let bridge = LocalBus::endpoint("local-test-bridge", true);
        let agent = LocalBus::endpoint("local-test-agent", true);
        bridge.bind().await.unwrap();
        agent.bind().await.unwrap();

        bridge
            .send(
                agent.local_identity(),
                QueryMessage {
                    query: "Convert 10 USD to EUR".to_string(),
                },
            )
            .await
            .unwrap();

        let mut queries = agent.queries();
        let (sender, query) = queries.next().await.unwrap();
        assert_eq!(&sender, bridge.local_identity());
        assert_eq!(query.query, "Convert 10 USD to EUR");

        agent
            .respond(
                &sender,
                ResponseMessage {
                    response: "42.1 EUR".to_string(),
                },
            )
            .await
            .unwrap();

        let mut inbound = bridge.inbound();
        let reply = inbound.next().await.unwrap();
        assert_eq!(&reply.sender, agent.local_identity());
        assert_eq!(reply.message.response, "42.1 EUR");
    }

    #[tokio::test]
    async fn send_to_unbound_identity_fails() {
        let bridge = LocalBus::endpoint("local-test-lonely", false);
        bridge.bind().await.unwrap();

        let err = bridge
            .send(
                &Identity::from_seed("local-test-nobody-home"),
                QueryMessage {
                    query: "anyone there?".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no endpoint bound"));
    }

    #[tokio::test]
    async fn inbound_stream_is_take_once() {
        let bridge = LocalBus::endpoint("local-test-take-once", true);
        bridge.bind().await.unwrap();

        let _first = bridge.inbound();
        let second: Vec<Inbound> = bridge.inbound().collect().await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn drop_unregisters_endpoint() {
        let addr;
        {
            let agent = LocalBus::endpoint("local-test-ephemeral", true);
            agent.bind().await.unwrap();
            addr = agent.local_identity().clone();
            assert!(lookup(&addr).is_some());
        }
        assert!(lookup(&addr).is_none());
    }

    #[test]
    fn relay_flag_is_recorded() {
        assert!(LocalBus::endpoint("local-test-relay-a", true).relay_enabled());
        assert!(!LocalBus::endpoint("local-test-relay-b", false).relay_enabled());
    }
}
