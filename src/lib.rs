//! Mimic: a simulated consensus network peer
//!
//! Connects to a node under test over TCP, completes the session handshake,
//! speaks the block-sync, transaction-sync and tendermint extensions, and can
//! equivocate on behalf of a validator to exercise the node's double-vote and
//! double-proposal detection.

pub mod byzantine;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod events;
pub mod identity;
pub mod peer;
pub mod protocol;

// Re-export identity types
pub use identity::{decode_secret, Identity, IdentityError};

// Re-export config types
pub use config::{ByzantineConfig, Config, ConfigError, NodeConfig, PeerConfig};

// Re-export crypto types
pub use crypto::{CryptoError, Nonce, Signature, H160, H256};

// Re-export framing types
pub use codec::{DecodeError, FrameBuffer, FrameError};

// Re-export protocol types
pub use protocol::{
    BitSet, Block, BlockSyncMessage, ConsensusVote, Envelope, ExtensionMessage, Header,
    PriorityInfo, ProposalBlock, ProposalSummary, ProtocolError, RequestMessage, ResponseMessage,
    SignedEnvelope, Step, TendermintMessage, TransactionSyncMessage, VoteOn, VoteStep,
};

// Re-export event types
pub use events::{ArrivalLog, EventBus, EventKind, Subscription};

// Re-export peer types
pub use peer::{BestBlock, HandshakeState, Outbound, Peer, PeerError, Session};

// Re-export injector types
pub use byzantine::{forge_proposal, forge_vote, Injector};
