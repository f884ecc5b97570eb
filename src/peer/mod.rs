//! Simulated Peer
//!
//! Impersonates a node-to-node peer over one TCP connection. Two-phase
//! lifecycle:
//! 1. **Handshake** - Sync1 goes out, the node's Ack yields the session
//!    nonce, then one signed NegotiationRequest per configured extension.
//! 2. **Session** - every record is a signed envelope; extension payloads
//!    are decoded, appended to the arrival log and published on the
//!    per-peer event bus.
//!
//! [`Peer::establish`] additionally plays the opening of block sync: it
//! answers the node's Status with its own and replies to the node's first
//! header request with an empty header list.

mod outbound;
mod rx_loop;
mod session;

pub use outbound::Outbound;
pub use rx_loop::HandshakeState;
pub use session::{BestBlock, Session};

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::byzantine::Injector;
use crate::codec::FrameError;
use crate::config::Config;
use crate::crypto::{CryptoError, H256};
use crate::events::{ArrivalLog, EventBus, EventKind};
use crate::identity::Identity;
use crate::protocol::{
    BlockSyncMessage, Envelope, ExtensionMessage, ProtocolError, RequestMessage, ResponseMessage,
    Step, TendermintMessage, TransactionSyncMessage,
};
use rx_loop::Receiver;

// ============================================================================
// Errors
// ============================================================================

/// Errors related to peer operations.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("session not established")]
    NotEstablished,

    #[error("session already established")]
    AlreadyEstablished,

    /// A protocol branch this peer intentionally does not implement.
    #[error("not supported: {0}")]
    Unsupported(&'static str),

    #[error("handshake rejected by node")]
    Rejected,

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("handshake timeout")]
    HandshakeTimeout,

    #[error("genesis hash unknown: no Status received")]
    UnknownGenesis,

    #[error("no pending {0} request to answer")]
    NoPendingRequest(&'static str),

    #[error("unexpected {0} message")]
    UnexpectedMessage(EventKind),

    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
}

impl PeerError {
    /// Check if this error marks an intentionally unimplemented branch.
    pub fn is_unsupported(&self) -> bool {
        match self {
            PeerError::Unsupported(_) => true,
            PeerError::Protocol(e) => e.is_unsupported(),
            _ => false,
        }
    }
}

// ============================================================================
// Peer
// ============================================================================

struct Connection {
    outbound: Outbound,
    rx_task: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.rx_task.abort();
    }
}

/// A simulated peer of one node.
pub struct Peer {
    config: Config,
    bus: EventBus,
    log: ArrivalLog,
    connection: Option<Connection>,
    injector: Injector,
}

impl Peer {
    /// Create a disconnected peer.
    pub fn new(config: Config) -> Self {
        let injector = Injector::new(config.byzantine.request_delay());
        Self {
            config,
            bus: EventBus::new(),
            log: ArrivalLog::new(),
            connection: None,
            injector,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The per-peer event bus.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Session of the current connection.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.connection.as_ref().map(|c| c.outbound.session())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Send capability of the current connection.
    pub fn outbound(&self) -> Result<&Outbound, PeerError> {
        self.connection
            .as_ref()
            .map(|c| &c.outbound)
            .ok_or(PeerError::NotConnected)
    }

    // === Lifecycle ===

    /// Open the connection and complete the handshake.
    pub async fn connect(&mut self) -> Result<(), PeerError> {
        if self.connection.is_some() {
            return Err(PeerError::AlreadyConnected);
        }

        let addr = self.config.node.addr();
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let session = Arc::new(Session::new(&self.config.peer));
        let outbound = Outbound::new(writer, session.clone());
        let (handshake_tx, mut handshake_rx) = watch::channel(HandshakeState::Pending);

        let receiver = Receiver {
            session: session.clone(),
            outbound: outbound.clone(),
            bus: self.bus.clone(),
            log: self.log.clone(),
            handshake: handshake_tx,
        };
        let rx_task = tokio::spawn(rx_loop::run(
            reader,
            receiver,
            self.config.peer.read_buffer(),
        ));

        debug!(addr = %addr, network_id = %session.network_id(), "Sending Sync1");
        let sync = Envelope::Sync1 {
            public_key: session.public_bytes(),
            network_id: session.network_id().to_string(),
            port: session.port(),
        };
        let result = match outbound.send_envelope(&sync).await {
            Ok(()) => {
                let timeout = self.config.peer.handshake_timeout();
                let wait = handshake_rx.wait_for(|state| *state != HandshakeState::Pending);
                match tokio::time::timeout(timeout, wait).await {
                    Err(_) => Err(PeerError::HandshakeTimeout),
                    Ok(Err(_)) => Err(PeerError::Closed),
                    Ok(Ok(state)) => match &*state {
                        HandshakeState::Established => Ok(()),
                        HandshakeState::Rejected => Err(PeerError::Rejected),
                        HandshakeState::Failed(reason) => {
                            Err(PeerError::HandshakeFailed(reason.clone()))
                        }
                        _ => Err(PeerError::Closed),
                    },
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(addr = %addr, "Connected to node");
                self.connection = Some(Connection { outbound, rx_task });
                Ok(())
            }
            Err(e) => {
                rx_task.abort();
                Err(e)
            }
        }
    }

    /// Connect, exchange Status and answer the node's first header request.
    ///
    /// `best` is the (total score, best hash) advertised; it defaults to a
    /// zero score at the node's genesis.
    pub async fn establish(&mut self, best: Option<(u128, H256)>) -> Result<(), PeerError> {
        let header_request = self.bus.once(EventKind::HeaderRequest);
        self.establish_without_sync(best).await?;
        self.wait(header_request, EventKind::HeaderRequest).await?;
        self.send_block_header_response(Vec::new()).await?;
        info!("Session established with sync");
        Ok(())
    }

    /// Connect and exchange Status only.
    pub async fn establish_without_sync(
        &mut self,
        best: Option<(u128, H256)>,
    ) -> Result<(), PeerError> {
        let status = self.bus.once(EventKind::Status);
        self.connect().await?;
        self.wait(status, EventKind::Status).await?;

        let genesis = self.genesis_hash()?;
        let (total_score, best_hash) = best.unwrap_or((0, genesis));
        self.send_status(total_score, best_hash).await
    }

    /// Disarm the injector and close the connection.
    ///
    /// Outstanding waits stay pending.
    pub async fn end(&mut self) -> Result<(), PeerError> {
        self.injector.stop_all().await;
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        let result = connection.outbound.shutdown().await;
        connection.rx_task.abort();
        let _ = (&mut connection.rx_task).await; // Ignore JoinError from abort
        info!("Connection ended");
        result
    }

    // === Sends ===

    /// Send an extension payload as-is.
    pub async fn send_extension_message(
        &self,
        extension: &str,
        payload: Vec<u8>,
        need_encryption: bool,
    ) -> Result<(), PeerError> {
        self.outbound()?
            .send(extension, payload, need_encryption)
            .await
    }

    /// Send a typed extension message.
    pub async fn send_message(&self, message: impl Into<ExtensionMessage>) -> Result<(), PeerError> {
        self.outbound()?.send_message(&message.into()).await
    }

    /// Send Status with the node's genesis hash.
    pub async fn send_status(&self, total_score: u128, best_hash: H256) -> Result<(), PeerError> {
        let genesis_hash = self.genesis_hash()?;
        self.send_message(BlockSyncMessage::Status {
            total_score,
            best_hash,
            genesis_hash,
        })
        .await
    }

    /// Ask the node for headers. Returns the request id.
    pub async fn send_block_header_request(
        &self,
        start_number: u64,
        max_count: u64,
    ) -> Result<u64, PeerError> {
        let request_id = self.next_request_id()?;
        self.send_message(BlockSyncMessage::Request(
            request_id,
            RequestMessage::Headers {
                start_number,
                max_count,
            },
        ))
        .await?;
        Ok(request_id)
    }

    /// Ask the node for block bodies. Returns the request id.
    pub async fn send_block_body_request(&self, hashes: Vec<H256>) -> Result<u64, PeerError> {
        let request_id = self.next_request_id()?;
        self.send_message(BlockSyncMessage::Request(
            request_id,
            RequestMessage::Bodies(hashes),
        ))
        .await?;
        Ok(request_id)
    }

    /// Answer the node's most recent header request.
    pub async fn send_block_header_response(&self, headers: Vec<Vec<u8>>) -> Result<(), PeerError> {
        let request_id = self
            .outbound()?
            .session()
            .last_header_request_id()
            .ok_or(PeerError::NoPendingRequest("header"))?;
        self.send_message(BlockSyncMessage::Response(
            request_id,
            ResponseMessage::Headers(headers),
        ))
        .await
    }

    /// Answer the node's most recent body request.
    pub async fn send_block_body_response(
        &self,
        bodies: Vec<Vec<Vec<u8>>>,
    ) -> Result<(), PeerError> {
        let request_id = self
            .outbound()?
            .session()
            .last_body_request_id()
            .ok_or(PeerError::NoPendingRequest("body"))?;
        self.send_message(BlockSyncMessage::Response(
            request_id,
            ResponseMessage::Bodies(bodies),
        ))
        .await
    }

    pub async fn send_transaction_sync_message(
        &self,
        transactions: Vec<Vec<u8>>,
    ) -> Result<(), PeerError> {
        self.send_message(TransactionSyncMessage::new(transactions))
            .await
    }

    pub async fn send_tendermint_message(&self, message: TendermintMessage) -> Result<(), PeerError> {
        self.send_message(message).await
    }

    // === Byzantine behavior ===

    /// Equivocate on every vote `identity` casts at `step`.
    pub async fn start_double_vote(&mut self, identity: Identity, step: Step) -> Result<(), PeerError> {
        let outbound = self.outbound()?.clone();
        self.injector
            .start_double_vote(identity, step, outbound, &self.bus)
            .await;
        Ok(())
    }

    pub async fn stop_double_vote(&mut self) {
        self.injector.stop_double_vote().await;
    }

    /// Equivocate on every block `identity` proposes.
    pub async fn start_double_proposal(&mut self, identity: Identity) -> Result<(), PeerError> {
        let outbound = self.outbound()?.clone();
        self.injector
            .start_double_proposal(identity, outbound, &self.bus)
            .await;
        Ok(())
    }

    pub async fn stop_double_proposal(&mut self) {
        self.injector.stop_double_proposal().await;
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    // === Arrival log ===

    /// Every decoded extension message, oldest first.
    pub fn arrived_extension_messages(&self) -> Vec<ExtensionMessage> {
        self.log.messages()
    }

    /// Headers of the most recent header response.
    pub fn block_header_response(&self) -> Option<Vec<Vec<u8>>> {
        self.log.last_header_response()
    }

    /// Bodies of the most recent body response.
    pub fn block_body_response(&self) -> Option<Vec<Vec<Vec<u8>>>> {
        self.log.last_body_response()
    }

    /// `(request_id, start_number, max_count)` of the most recent header request.
    pub fn block_header_request(&self) -> Option<(u64, u64, u64)> {
        self.log.last_header_request()
    }

    /// `(request_id, hashes)` of the most recent body request.
    pub fn block_body_request(&self) -> Option<(u64, Vec<H256>)> {
        self.log.last_body_request()
    }

    /// Transactions of the most recent transaction sync message.
    pub fn transaction_sync_message(&self) -> Option<Vec<Vec<u8>>> {
        self.log.last_transaction_sync()
    }

    // === Waits ===

    /// Wait for the next message of `kind`.
    pub async fn wait_for(&self, kind: EventKind) -> Result<ExtensionMessage, PeerError> {
        let rx = self.bus.once(kind);
        self.wait(rx, kind).await
    }

    pub async fn wait_status_message(&self) -> Result<BlockSyncMessage, PeerError> {
        self.wait_block_sync(EventKind::Status).await
    }

    pub async fn wait_header_request(&self) -> Result<BlockSyncMessage, PeerError> {
        self.wait_block_sync(EventKind::HeaderRequest).await
    }

    pub async fn wait_body_request(&self) -> Result<BlockSyncMessage, PeerError> {
        self.wait_block_sync(EventKind::BodyRequest).await
    }

    pub async fn wait_header_response(&self) -> Result<BlockSyncMessage, PeerError> {
        self.wait_block_sync(EventKind::HeaderResponse).await
    }

    pub async fn wait_body_response(&self) -> Result<BlockSyncMessage, PeerError> {
        self.wait_block_sync(EventKind::BodyResponse).await
    }

    pub async fn wait_consensus_message(&self) -> Result<TendermintMessage, PeerError> {
        self.wait_tendermint(EventKind::ConsensusMessage).await
    }

    pub async fn wait_proposal_block(&self) -> Result<TendermintMessage, PeerError> {
        self.wait_tendermint(EventKind::ProposalBlock).await
    }

    pub async fn wait_step_state(&self) -> Result<TendermintMessage, PeerError> {
        self.wait_tendermint(EventKind::StepState).await
    }

    async fn wait_block_sync(&self, kind: EventKind) -> Result<BlockSyncMessage, PeerError> {
        match self.wait_for(kind).await? {
            ExtensionMessage::BlockSync(message) => Ok(message),
            _ => Err(PeerError::UnexpectedMessage(kind)),
        }
    }

    async fn wait_tendermint(&self, kind: EventKind) -> Result<TendermintMessage, PeerError> {
        match self.wait_for(kind).await? {
            ExtensionMessage::Tendermint(message) => Ok(message),
            _ => Err(PeerError::UnexpectedMessage(kind)),
        }
    }

    async fn wait(
        &self,
        rx: oneshot::Receiver<ExtensionMessage>,
        kind: EventKind,
    ) -> Result<ExtensionMessage, PeerError> {
        debug!(%kind, "Waiting for event");
        rx.await.map_err(|_| PeerError::Closed)
    }

    // === Helpers ===

    fn genesis_hash(&self) -> Result<H256, PeerError> {
        self.outbound()?
            .session()
            .genesis_hash()
            .ok_or(PeerError::UnknownGenesis)
    }

    fn next_request_id(&self) -> Result<u64, PeerError> {
        Ok(self.outbound()?.session().next_request_id())
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("addr", &self.config.node.addr())
            .field("session", &self.session())
            .field("log_len", &self.log.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing;
