//! Receive loop.
//!
//! One task per connection reads the socket, cuts the byte stream into
//! records and handles them strictly in arrival order. Before the session
//! nonce exists every record goes to the handshake; afterwards every record
//! must be a signed envelope.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::outbound::Outbound;
use super::session::Session;
use super::PeerError;
use crate::codec::FrameBuffer;
use crate::crypto::Nonce;
use crate::events::{ArrivalLog, EventBus, EventKind};
use crate::protocol::{
    BlockSyncMessage, Envelope, ExtensionMessage, RequestMessage, SignedEnvelope,
    EXTENSION_VERSION,
};

/// Handshake progress as seen by the connecting side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    Established,
    Rejected,
    /// The node's Ack could not be accepted.
    Failed(String),
    Closed,
}

/// Record handler owned by the receive task.
pub(crate) struct Receiver {
    pub(crate) session: Arc<Session>,
    pub(crate) outbound: Outbound,
    pub(crate) bus: EventBus,
    pub(crate) log: ArrivalLog,
    pub(crate) handshake: watch::Sender<HandshakeState>,
}

impl Receiver {
    /// Handle one complete record.
    pub(crate) async fn handle_record(&self, record: &[u8]) -> Result<(), PeerError> {
        match self.session.nonce() {
            None => self.handle_handshake(record).await,
            Some(nonce) => self.handle_signed(record, &nonce),
        }
    }

    async fn handle_handshake(&self, record: &[u8]) -> Result<(), PeerError> {
        match Envelope::decode(record)? {
            Envelope::Ack {
                public_key,
                encrypted_nonce,
            } => {
                if let Err(e) = self.session.accept_ack(&public_key, &encrypted_nonce) {
                    self.handshake.send_replace(HandshakeState::Failed(e.to_string()));
                    return Err(e);
                }
                info!(
                    network_id = %self.session.network_id(),
                    extensions = self.session.extensions().len(),
                    "Handshake complete"
                );
                for extension in self.session.extensions() {
                    self.outbound
                        .send_signed(Envelope::NegotiationRequest {
                            extension: extension.clone(),
                            version: EXTENSION_VERSION,
                        })
                        .await?;
                }
                self.handshake.send_replace(HandshakeState::Established);
                Ok(())
            }
            Envelope::Nack => {
                self.handshake.send_replace(HandshakeState::Rejected);
                Err(PeerError::Rejected)
            }
            Envelope::Sync1 { .. } => Err(PeerError::Unsupported("Sync1 from node")),
            Envelope::Sync2 { .. } => Err(PeerError::Unsupported("Sync2 from node")),
            Envelope::NegotiationRequest { .. } | Envelope::NegotiationResponse { .. } => {
                Err(PeerError::Unsupported("negotiation before handshake"))
            }
            Envelope::Encrypted { .. } | Envelope::Unencrypted { .. } => {
                Err(PeerError::Unsupported("extension message before handshake"))
            }
        }
    }

    fn handle_signed(&self, record: &[u8], nonce: &Nonce) -> Result<(), PeerError> {
        if let Ok(Envelope::Ack { .. }) = Envelope::decode(record) {
            return Err(PeerError::AlreadyEstablished);
        }

        match SignedEnvelope::open(record, nonce)? {
            Envelope::Unencrypted { extension, data } => {
                let message = ExtensionMessage::decode(&extension, &data)?;
                self.dispatch(message);
                Ok(())
            }
            Envelope::NegotiationResponse { extension, version } => {
                debug!(extension = %extension, version, "Extension negotiated");
                self.session.record_negotiated(&extension, version);
                Ok(())
            }
            Envelope::Encrypted { .. } => Err(PeerError::Unsupported("encrypted extension messages")),
            other => {
                debug!(protocol_id = %other.protocol_id(), "Unexpected signed envelope");
                Err(PeerError::Unsupported("signed handshake envelope"))
            }
        }
    }

    /// Apply session bookkeeping, log and publish a decoded message.
    fn dispatch(&self, message: ExtensionMessage) {
        if let ExtensionMessage::BlockSync(block_sync) = &message {
            match block_sync {
                BlockSyncMessage::Status {
                    total_score,
                    best_hash,
                    genesis_hash,
                } => {
                    self.session
                        .record_status(*total_score, *best_hash, *genesis_hash);
                }
                BlockSyncMessage::Request(request_id, RequestMessage::Headers { .. }) => {
                    self.session.record_header_request(*request_id);
                }
                BlockSyncMessage::Request(request_id, RequestMessage::Bodies(_)) => {
                    self.session.record_body_request(*request_id);
                }
                BlockSyncMessage::Response(..) => {}
            }
        }

        let kind = EventKind::of(&message);
        debug!(extension = message.extension(), kind = %kind, "Extension message received");
        self.log.push(message.clone());
        self.bus.publish(kind, &message);
    }
}

/// Receive loop - runs as a spawned task.
pub(crate) async fn run(mut reader: OwnedReadHalf, receiver: Receiver, read_buffer: usize) {
    let mut buf = vec![0u8; read_buffer];
    let mut frames = FrameBuffer::new();

    debug!("Receive loop starting");

    loop {
        let len = match reader.read(&mut buf).await {
            Ok(0) => {
                info!("Connection closed by node");
                break;
            }
            Ok(len) => len,
            Err(e) => {
                warn!(error = %e, "Socket read error");
                break;
            }
        };
        frames.extend(&buf[..len]);

        loop {
            match frames.next_record() {
                Ok(Some(record)) => {
                    if let Err(e) = receiver.handle_record(&record).await {
                        if e.is_unsupported() {
                            warn!(error = %e, "Unsupported record rejected");
                        } else {
                            warn!(error = %e, "Failed to handle record");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, buffered = frames.buffered(), "Framing error, discarding buffer");
                    frames.clear();
                    break;
                }
            }
        }
    }

    receiver.handshake.send_if_modified(|state| {
        if *state == HandshakeState::Pending {
            *state = HandshakeState::Closed;
            true
        } else {
            false
        }
    });
    debug!("Receive loop stopped");
}
