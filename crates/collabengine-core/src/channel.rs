//! Transport channel: one persistent connection for one document
//!
//! [`TransportChannel`] owns the live [`TransportLink`] for a document
//! session, frames envelopes as JSON on the way out, and decodes them on
//! the way in. On open it immediately announces the local identity with
//! a `participant-joined` envelope; on deliberate teardown it sends
//! `participant-left` before dropping the link.
//!
//! Sends attempted while the channel is not open are dropped without
//! queuing or error. That is a deliberate simplification carried over
//! from the source system, not an oversight: edits made while offline
//! are lost.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::envelope::{Envelope, EnvelopePayload};
use crate::error::CollabResult;
use crate::transport::{Connector, TransportLink};
use crate::types::{CollaboratorInfo, DocumentId};

/// Cloneable sending half of an open channel
///
/// Encoding or transport failures drop the envelope with a log line;
/// application data is never retried.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<bytes::Bytes>,
}

impl ChannelSender {
    /// Encode and transmit one envelope
    ///
    /// A send after the link has closed is a silent drop.
    pub fn send(&self, envelope: &Envelope) {
        match envelope.to_bytes() {
            Ok(frame) => {
                if self.tx.send(frame).is_err() {
                    debug!(kind = envelope.kind(), "link closed, envelope dropped");
                }
            }
            Err(e) => {
                warn!(kind = envelope.kind(), error = %e, "failed to encode envelope");
            }
        }
    }
}

/// Owns one persistent bidirectional connection to a collaboration
/// endpoint for a given document
pub struct TransportChannel {
    document_id: DocumentId,
    local: CollaboratorInfo,
    connector: Arc<dyn Connector>,
    sender: Option<ChannelSender>,
    inbound: Option<mpsc::UnboundedReceiver<bytes::Bytes>>,
}

impl TransportChannel {
    /// Create a closed channel for a document
    pub fn new(
        document_id: DocumentId,
        local: CollaboratorInfo,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            document_id,
            local,
            connector,
            sender: None,
            inbound: None,
        }
    }

    /// Establish the connection and announce the local identity
    ///
    /// # Errors
    ///
    /// Returns `CollabError::Connect` if the endpoint cannot be reached.
    pub async fn open(&mut self) -> CollabResult<()> {
        let TransportLink { outbound, inbound } = self
            .connector
            .connect(&self.document_id, &self.local.user_id)
            .await?;

        let sender = ChannelSender { tx: outbound };
        sender.send(&Envelope::new(
            self.local.user_id.clone(),
            self.document_id.clone(),
            EnvelopePayload::ParticipantJoined {
                participant: self.local.clone(),
            },
        ));

        self.sender = Some(sender);
        self.inbound = Some(inbound);
        debug!(document_id = %self.document_id, "channel open");
        Ok(())
    }

    /// Whether the channel currently holds a live link
    pub fn is_open(&self) -> bool {
        self.sender.is_some()
    }

    /// Get a cloneable sender for the current link, if open
    pub fn sender(&self) -> Option<ChannelSender> {
        self.sender.clone()
    }

    /// Transmit one envelope; no-op while closed
    pub fn send(&self, envelope: &Envelope) {
        match &self.sender {
            Some(sender) => sender.send(envelope),
            None => debug!(kind = envelope.kind(), "channel closed, envelope dropped"),
        }
    }

    /// Receive the next envelope from the endpoint
    ///
    /// Malformed frames are logged and skipped; one bad message never
    /// affects subsequent messages. Returns `None` once the link is
    /// closed, after which the channel is back in the closed state.
    pub async fn recv(&mut self) -> Option<Envelope> {
        let inbound = self.inbound.as_mut()?;
        loop {
            match inbound.recv().await {
                Some(frame) => match Envelope::from_bytes(&frame) {
                    Ok(envelope) => {
                        debug!(
                            kind = envelope.kind(),
                            origin = %envelope.origin_user_id,
                            "received envelope"
                        );
                        return Some(envelope);
                    }
                    Err(e) => {
                        warn!(error = %e, bytes = frame.len(), "dropping malformed envelope");
                    }
                },
                None => {
                    self.sender = None;
                    self.inbound = None;
                    return None;
                }
            }
        }
    }

    /// Deliberate teardown: announce departure and drop the link
    pub fn shutdown(&mut self) {
        if let Some(sender) = &self.sender {
            sender.send(&Envelope::new(
                self.local.user_id.clone(),
                self.document_id.clone(),
                EnvelopePayload::ParticipantLeft,
            ));
        }
        self.sender = None;
        self.inbound = None;
        debug!(document_id = %self.document_id, "channel shut down");
    }
}
