//! Session State
//!
//! Everything a connection learns about the remote node: its handshake key,
//! the session nonce, the chain it declared in Status, the request ids it
//! is waiting on and the extension versions it accepted.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use secp256k1::PublicKey;
use tracing::debug;

use super::PeerError;
use crate::config::PeerConfig;
use crate::crypto::{decrypt_nonce, public_from_bytes, shared_secret, Nonce, H256, PUBLIC_KEY_SIZE};
use crate::identity::Identity;

/// Best block declared by the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BestBlock {
    pub total_score: u128,
    pub hash: H256,
}

#[derive(Debug, Default)]
struct SessionState {
    genesis_hash: Option<H256>,
    best_block: Option<BestBlock>,
    last_header_request_id: Option<u64>,
    last_body_request_id: Option<u64>,
    negotiated: HashMap<String, u64>,
    next_request_id: u64,
}

/// Per-connection session.
///
/// The nonce is set once, on the first Ack, and never changes afterwards.
pub struct Session {
    identity: Identity,
    network_id: String,
    port: u16,
    extensions: Vec<String>,
    remote_public: OnceLock<PublicKey>,
    nonce: OnceLock<Nonce>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a session with a fresh ephemeral key.
    pub fn new(config: &PeerConfig) -> Self {
        Self::with_identity(Identity::generate(), config)
    }

    pub fn with_identity(identity: Identity, config: &PeerConfig) -> Self {
        Self {
            identity,
            network_id: config.network_id().to_string(),
            port: config.port(),
            extensions: config.extensions(),
            remote_public: OnceLock::new(),
            nonce: OnceLock::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Ephemeral public key in wire form.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.identity.public_bytes()
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    /// Port advertised in Sync1.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Extensions negotiated after the handshake.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn remote_public(&self) -> Option<&PublicKey> {
        self.remote_public.get()
    }

    pub fn nonce(&self) -> Option<Nonce> {
        self.nonce.get().copied()
    }

    pub fn is_established(&self) -> bool {
        self.nonce.get().is_some()
    }

    /// Derive the session nonce from the node's Ack.
    pub fn accept_ack(
        &self,
        public_key: &[u8],
        encrypted_nonce: &[u8],
    ) -> Result<Nonce, PeerError> {
        if self.is_established() {
            return Err(PeerError::AlreadyEstablished);
        }
        let remote = public_from_bytes(public_key)?;
        let secret = shared_secret(self.identity.secret_key(), &remote);
        let nonce = decrypt_nonce(&secret, encrypted_nonce)?;

        self.nonce
            .set(nonce)
            .map_err(|_| PeerError::AlreadyEstablished)?;
        let _ = self.remote_public.set(remote);
        debug!(network_id = %self.network_id, "Session nonce established");
        Ok(nonce)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the chain the node declared in Status.
    pub fn record_status(&self, total_score: u128, best_hash: H256, genesis_hash: H256) {
        let mut state = self.state();
        state.genesis_hash = Some(genesis_hash);
        state.best_block = Some(BestBlock {
            total_score,
            hash: best_hash,
        });
    }

    pub fn genesis_hash(&self) -> Option<H256> {
        self.state().genesis_hash
    }

    pub fn best_block(&self) -> Option<BestBlock> {
        self.state().best_block
    }

    pub fn record_header_request(&self, request_id: u64) {
        self.state().last_header_request_id = Some(request_id);
    }

    pub fn record_body_request(&self, request_id: u64) {
        self.state().last_body_request_id = Some(request_id);
    }

    /// Id of the node's most recent header request.
    pub fn last_header_request_id(&self) -> Option<u64> {
        self.state().last_header_request_id
    }

    /// Id of the node's most recent body request.
    pub fn last_body_request_id(&self) -> Option<u64> {
        self.state().last_body_request_id
    }

    pub fn record_negotiated(&self, extension: &str, version: u64) {
        self.state()
            .negotiated
            .insert(extension.to_string(), version);
    }

    /// Version the node accepted for `extension`, if it answered.
    pub fn negotiated_version(&self, extension: &str) -> Option<u64> {
        self.state().negotiated.get(extension).copied()
    }

    /// Allocate an id for an outbound request.
    pub fn next_request_id(&self) -> u64 {
        let mut state = self.state();
        let id = state.next_request_id;
        state.next_request_id += 1;
        id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("network_id", &self.network_id)
            .field("port", &self.port)
            .field("established", &self.is_established())
            .finish_non_exhaustive()
    }
}
