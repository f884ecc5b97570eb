//! Node Protocol Messages
//!
//! Wire format definitions for everything exchanged with a node after the
//! TCP connection is up, across two layers:
//!
//! ## Envelope Layer
//!
//! Handshake envelopes (Sync1/Sync2/Ack/Nack) establish the session nonce.
//! Every later envelope is wrapped in a [`SignedEnvelope`] whose digest is
//! keyed by that nonce. Extension payloads travel inside `Unencrypted`
//! envelopes tagged with the extension name.
//!
//! ## Extension Layer
//!
//! Typed payloads of the three extensions the peer speaks:
//! block synchronization, transaction propagation and Tendermint consensus.
//! Block bodies and proposed blocks are snappy-compressed on the wire.

mod block;
mod block_sync;
mod compress;
mod consensus;
mod envelope;
mod error;
mod extension;
mod transaction_sync;

// Re-export all public types at protocol:: level
pub use block::{Block, Header};
pub use block_sync::{
    encode_bodies, BlockSyncMessage, BlockSyncMessageId, RequestMessage, ResponseMessage,
};
pub use compress::{compress, decompress};
pub use consensus::{
    proposal_vote_on, BitSet, ConsensusVote, PriorityInfo, ProposalBlock, ProposalSummary, Step,
    TendermintMessage, TendermintMessageId, VoteOn, VoteStep, BITSET_SIZE,
};
pub use envelope::{envelope_digest, Envelope, ProtocolId, SignedEnvelope, ENVELOPE_VERSION};
pub use error::ProtocolError;
pub use extension::{
    ExtensionMessage, BLOCK_SYNC_EXTENSION, CONSENSUS_EXTENSION, EXTENSION_VERSION,
    TRANSACTION_SYNC_EXTENSION,
};
pub use transaction_sync::TransactionSyncMessage;

#[cfg(test)]
mod tests;
