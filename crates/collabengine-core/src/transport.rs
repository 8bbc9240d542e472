//! Pluggable message transport for the collaboration channel
//!
//! The engine talks to a collaboration endpoint through the [`Connector`]
//! trait: one dial yields a [`TransportLink`], a full-duplex, message-
//! oriented connection carrying raw JSON frames (one envelope per frame).
//! Any server implementation can sit behind the trait; the engine never
//! assumes more than FIFO delivery per connection.
//!
//! [`MemoryHub`] is the in-process implementation used by tests and
//! scenarios: a switchboard that routes every frame to all other links
//! on the same document, with hooks for injecting connection failures.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CollabError, CollabResult};
use crate::types::{DocumentId, UserId};

/// One live full-duplex connection to a collaboration endpoint
///
/// Frames written to `outbound` are delivered to the remote side in
/// order; frames from the remote side arrive on `inbound`. The
/// connection is closed when either half is dropped.
pub struct TransportLink {
    /// Frames to the endpoint
    pub outbound: mpsc::UnboundedSender<Bytes>,
    /// Frames from the endpoint
    pub inbound: mpsc::UnboundedReceiver<Bytes>,
}

/// Dials a collaboration endpoint for a (document, user) pair
///
/// Object-safe so engines can hold `Arc<dyn Connector>` and servers can
/// be swapped without touching engine code.
pub trait Connector: Send + Sync + 'static {
    /// Establish a new connection for the given document and user
    fn connect(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
    ) -> BoxFuture<'static, CollabResult<TransportLink>>;
}

/// Internal switchboard state shared by hub handles and link tasks
struct HubInner {
    /// Live links per document
    links: HashMap<DocumentId, Vec<HubLink>>,
    /// Observers receiving a copy of every routed frame per document
    taps: HashMap<DocumentId, Vec<mpsc::UnboundedSender<Bytes>>>,
    /// Number of upcoming dials to refuse
    refuse: u32,
    /// Total dial attempts seen (including refused)
    dials: u64,
    /// Next link id
    next_id: u64,
}

struct HubLink {
    id: u64,
    user_id: UserId,
    to_client: mpsc::UnboundedSender<Bytes>,
}

/// In-process message switchboard
///
/// Every frame sent by one link is forwarded, in order, to every other
/// link on the same document. The sender does not receive its own
/// frames (matching a broadcast endpoint that does not echo).
///
/// Test hooks:
/// - [`refuse_next`](MemoryHub::refuse_next) makes upcoming dials fail
/// - [`sever`](MemoryHub::sever) closes all links on a document without
///   warning, as an unexpected connection loss
/// - [`tap`](MemoryHub::tap) observes every frame routed on a document
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                links: HashMap::new(),
                taps: HashMap::new(),
                refuse: 0,
                dials: 0,
                next_id: 0,
            })),
        }
    }

    /// Get a connector handle for this hub
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            inner: self.inner.clone(),
        }
    }

    /// Refuse the next `n` dial attempts
    pub fn refuse_next(&self, n: u32) {
        self.inner.lock().refuse = n;
    }

    /// Close every link on a document without notice
    ///
    /// Clients observe this as an unexpected connection loss.
    pub fn sever(&self, document_id: &DocumentId) {
        let removed = self.inner.lock().links.remove(document_id);
        let count = removed.map(|l| l.len()).unwrap_or(0);
        debug!(%document_id, count, "severed links");
    }

    /// Number of dial attempts seen so far, including refused ones
    pub fn dial_count(&self) -> u64 {
        self.inner.lock().dials
    }

    /// Users currently connected on a document
    pub fn connected_users(&self, document_id: &DocumentId) -> Vec<UserId> {
        self.inner
            .lock()
            .links
            .get(document_id)
            .map(|links| links.iter().map(|l| l.user_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Observe a copy of every frame routed on a document
    pub fn tap(&self, document_id: &DocumentId) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .taps
            .entry(document_id.clone())
            .or_default()
            .push(tx);
        rx
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector handle onto a [`MemoryHub`]
#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<Mutex<HubInner>>,
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
    ) -> BoxFuture<'static, CollabResult<TransportLink>> {
        let inner = self.inner.clone();
        let document_id = document_id.clone();
        let user_id = user_id.clone();

        Box::pin(async move {
            let (to_client, client_inbound) = mpsc::unbounded_channel();
            let (client_outbound, mut from_client) = mpsc::unbounded_channel::<Bytes>();

            let link_id = {
                let mut hub = inner.lock();
                hub.dials += 1;
                if hub.refuse > 0 {
                    hub.refuse -= 1;
                    warn!(%document_id, %user_id, "hub refused connection");
                    return Err(CollabError::Connect(format!(
                        "connection refused for {}",
                        document_id
                    )));
                }
                let link_id = hub.next_id;
                hub.next_id += 1;
                hub.links.entry(document_id.clone()).or_default().push(HubLink {
                    id: link_id,
                    user_id: user_id.clone(),
                    to_client,
                });
                link_id
            };
            debug!(%document_id, %user_id, link_id, "hub accepted connection");

            // Forward frames from this client to all other links on the
            // document until the client hangs up or the link is severed.
            tokio::spawn(async move {
                while let Some(frame) = from_client.recv().await {
                    let mut hub = inner.lock();
                    if let Some(taps) = hub.taps.get_mut(&document_id) {
                        taps.retain(|t| t.send(frame.clone()).is_ok());
                    }
                    let Some(links) = hub.links.get(&document_id) else {
                        break;
                    };
                    if !links.iter().any(|l| l.id == link_id) {
                        break;
                    }
                    for link in links.iter().filter(|l| l.id != link_id) {
                        let _ = link.to_client.send(frame.clone());
                    }
                }
                // Client hung up or the link was severed
                if let Some(links) = inner.lock().links.get_mut(&document_id) {
                    links.retain(|l| l.id != link_id);
                }
                debug!(%document_id, link_id, "hub link closed");
            });

            Ok(TransportLink {
                outbound: client_outbound,
                inbound: client_inbound,
            })
        })
    }
}
