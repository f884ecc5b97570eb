//! Tendermint consensus extension messages.
//!
//! ## Wire Format
//!
//! ```text
//! ConsensusMessage: [1, [vote_bytes...]]
//! ProposalBlock:    [2, signature, priority_info, view, compressed_block]
//! StepState:        [3, vote_step, [[priority_info, block_hash]?], [lock_view?], known_votes]
//! RequestMessage:   [4, vote_step, requested_votes]
//! RequestProposal:  [5, height, view]
//!
//! vote:          [[vote_step, [block_hash?]], signature, signer_index]
//! vote_step:     [height, view, step]
//! priority_info: [signer_index, priority, sub_user_index, elections, vrf_proof]
//! ```
//!
//! Votes and proposals are signed over the canonical digest
//! `blake2b-256(encode([vote_step, [block_hash?]]))`.

use std::fmt;
use std::str::FromStr;

use secp256k1::PublicKey;

use super::block::Block;
use super::ProtocolError;
use crate::codec::{DecodeError, Decodable, Encodable, Rlp, RlpStream};
use crate::crypto::{blake256, Signature, H256};

/// Default known-votes bitmap width in bytes.
pub const BITSET_SIZE: usize = 100;

/// Tendermint message identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TendermintMessageId {
    ConsensusMessage = 1,
    ProposalBlock = 2,
    StepState = 3,
    RequestMessage = 4,
    RequestProposal = 5,
}

impl TendermintMessageId {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(TendermintMessageId::ConsensusMessage),
            2 => Some(TendermintMessageId::ProposalBlock),
            3 => Some(TendermintMessageId::StepState),
            4 => Some(TendermintMessageId::RequestMessage),
            5 => Some(TendermintMessageId::RequestProposal),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Round step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Step {
    Propose = 0,
    Prevote = 1,
    Precommit = 2,
    Commit = 3,
}

impl Step {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Step::Propose),
            1 => Some(Step::Prevote),
            2 => Some(Step::Precommit),
            3 => Some(Step::Commit),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Propose => "propose",
            Step::Prevote => "prevote",
            Step::Precommit => "precommit",
            Step::Commit => "commit",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "propose" => Ok(Step::Propose),
            "prevote" => Ok(Step::Prevote),
            "precommit" => Ok(Step::Precommit),
            "commit" => Ok(Step::Commit),
            other => Err(format!("unknown step: {}", other)),
        }
    }
}

impl Encodable for Step {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.to_byte());
    }
}

impl Decodable for Step {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let b: u8 = rlp.as_val()?;
        Step::from_byte(b).ok_or_else(|| DecodeError::InvalidValue(format!("step {}", b)))
    }
}

/// Position in the consensus timeline.
///
/// Ordered by height, then view, then step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoteStep {
    pub height: u64,
    pub view: u64,
    pub step: Step,
}

impl VoteStep {
    pub fn new(height: u64, view: u64, step: Step) -> Self {
        Self { height, view, step }
    }
}

impl fmt::Display for VoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.height, self.view, self.step)
    }
}

impl Encodable for VoteStep {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&self.height).append(&self.view).append(&self.step);
        });
    }
}

impl Decodable for VoteStep {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let items = rlp.expect_items(3)?;
        Ok(Self {
            height: items[0].as_val()?,
            view: items[1].as_val()?,
            step: items[2].as_val()?,
        })
    }
}

// ============================================================================
// Votes
// ============================================================================

/// What a vote commits to: a step and an optional block hash (None is nil).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoteOn {
    pub step: VoteStep,
    pub block_hash: Option<H256>,
}

impl VoteOn {
    pub fn new(step: VoteStep, block_hash: Option<H256>) -> Self {
        Self { step, block_hash }
    }

    /// Canonical digest signed by voters and proposers.
    pub fn digest(&self) -> H256 {
        blake256(&self.rlp_bytes())
    }
}

impl Encodable for VoteOn {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&self.step)
                .append_optional(self.block_hash.as_ref());
        });
    }
}

impl Decodable for VoteOn {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let items = rlp.expect_items(2)?;
        Ok(Self {
            step: items[0].as_val()?,
            block_hash: items[1].as_optional()?,
        })
    }
}

/// A signed vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusVote {
    pub on: VoteOn,
    pub signature: Signature,
    pub signer_index: u64,
}

impl ConsensusVote {
    pub fn new(on: VoteOn, signature: Signature, signer_index: u64) -> Self {
        Self {
            on,
            signature,
            signer_index,
        }
    }

    pub fn vote_step(&self) -> VoteStep {
        self.on.step
    }

    pub fn block_hash(&self) -> Option<H256> {
        self.on.block_hash
    }

    /// Check whether the signature recovers to `public_key`.
    pub fn is_signed_by(&self, public_key: &PublicKey) -> bool {
        self.signature.is_signed_by(&self.on.digest(), public_key)
    }
}

impl Encodable for ConsensusVote {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&self.on)
                .append(&self.signature)
                .append(&self.signer_index);
        });
    }
}

impl Decodable for ConsensusVote {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let items = rlp.expect_items(3)?;
        Ok(Self {
            on: items[0].as_val()?,
            signature: items[1].as_val()?,
            signer_index: items[2].as_val()?,
        })
    }
}

// ============================================================================
// Proposals
// ============================================================================

/// Sortition result attached to a proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriorityInfo {
    pub signer_index: u64,
    pub priority: H256,
    pub sub_user_index: u64,
    pub number_of_elections: u64,
    pub vrf_proof: Vec<u8>,
}

impl Encodable for PriorityInfo {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&self.signer_index)
                .append(&self.priority)
                .append(&self.sub_user_index)
                .append(&self.number_of_elections)
                .append(&self.vrf_proof);
        });
    }
}

impl Decodable for PriorityInfo {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let items = rlp.expect_items(5)?;
        Ok(Self {
            signer_index: items[0].as_val()?,
            priority: items[1].as_val()?,
            sub_user_index: items[2].as_val()?,
            number_of_elections: items[3].as_val()?,
            vrf_proof: items[4].as_val()?,
        })
    }
}

/// The proposal a peer currently holds for its step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalSummary {
    pub priority_info: PriorityInfo,
    pub block_hash: H256,
}

impl Encodable for ProposalSummary {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&self.priority_info).append(&self.block_hash);
        });
    }
}

impl Decodable for ProposalSummary {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let items = rlp.expect_items(2)?;
        Ok(Self {
            priority_info: items[0].as_val()?,
            block_hash: items[1].as_val()?,
        })
    }
}

/// A proposed block with its proposer signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalBlock {
    pub signature: Signature,
    pub priority_info: PriorityInfo,
    pub view: u64,
    /// Snappy-compressed encoded block.
    pub message: Vec<u8>,
}

impl ProposalBlock {
    /// Build a proposal from an uncompressed block.
    pub fn new(
        signature: Signature,
        priority_info: PriorityInfo,
        view: u64,
        block: &Block,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            signature,
            priority_info,
            view,
            message: block.compress()?,
        })
    }

    /// Decompress the carried block.
    pub fn block(&self) -> Result<Block, ProtocolError> {
        Block::decompress(&self.message)
    }

    /// What the proposer signed: (height, view, Propose, block hash).
    pub fn vote_on(&self) -> Result<VoteOn, ProtocolError> {
        Ok(proposal_vote_on(&self.block()?, self.view))
    }

    /// Check whether the signature recovers to `public_key`.
    pub fn is_signed_by(&self, public_key: &PublicKey) -> Result<bool, ProtocolError> {
        let digest = self.vote_on()?.digest();
        Ok(self.signature.is_signed_by(&digest, public_key))
    }
}

/// The vote a proposer signs for `block` at `view`.
pub fn proposal_vote_on(block: &Block, view: u64) -> VoteOn {
    VoteOn::new(
        VoteStep::new(block.header.number, view, Step::Propose),
        Some(block.header.hash()),
    )
}

// ============================================================================
// Known votes
// ============================================================================

/// Bitmap over validator indices.
#[derive(Clone, PartialEq, Eq)]
pub struct BitSet(Vec<u8>);

impl BitSet {
    /// An empty bitmap of the default width.
    pub fn new() -> Self {
        Self(vec![0u8; BITSET_SIZE])
    }

    /// Wrap raw bitmap bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn with_indices(indices: &[usize]) -> Self {
        let mut set = Self::new();
        for index in indices {
            set.set(*index);
        }
        set
    }

    /// Set a bit, growing the bitmap when needed.
    pub fn set(&mut self, index: usize) {
        let byte = index / 8;
        if byte >= self.0.len() {
            self.0.resize(byte + 1, 0);
        }
        self.0[byte] |= 1 << (index % 8);
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.0
            .get(index / 8)
            .map(|b| b & (1 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for BitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices: Vec<usize> = (0..self.0.len() * 8).filter(|i| self.is_set(*i)).collect();
        write!(f, "BitSet({:?})", indices)
    }
}

impl Encodable for BitSet {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_bytes(&self.0);
    }
}

impl Decodable for BitSet {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        Ok(Self(rlp.as_val()?))
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A Tendermint extension message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TendermintMessage {
    ConsensusMessage(Vec<ConsensusVote>),
    ProposalBlock(ProposalBlock),
    StepState {
        vote_step: VoteStep,
        proposal: Option<ProposalSummary>,
        lock_view: Option<u64>,
        known_votes: BitSet,
    },
    RequestMessage {
        vote_step: VoteStep,
        requested_votes: BitSet,
    },
    RequestProposal {
        height: u64,
        view: u64,
    },
}

impl TendermintMessage {
    pub fn message_id(&self) -> TendermintMessageId {
        match self {
            TendermintMessage::ConsensusMessage(_) => TendermintMessageId::ConsensusMessage,
            TendermintMessage::ProposalBlock(_) => TendermintMessageId::ProposalBlock,
            TendermintMessage::StepState { .. } => TendermintMessageId::StepState,
            TendermintMessage::RequestMessage { .. } => TendermintMessageId::RequestMessage,
            TendermintMessage::RequestProposal { .. } => TendermintMessageId::RequestProposal,
        }
    }

    /// Encode as an extension payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.list(|s| {
            s.append(&self.message_id().to_byte());
            match self {
                TendermintMessage::ConsensusMessage(votes) => {
                    s.list(|s| {
                        for vote in votes {
                            s.append(&vote.rlp_bytes());
                        }
                    });
                }
                TendermintMessage::ProposalBlock(proposal) => {
                    s.append(&proposal.signature)
                        .append(&proposal.priority_info)
                        .append(&proposal.view)
                        .append(&proposal.message);
                }
                TendermintMessage::StepState {
                    vote_step,
                    proposal,
                    lock_view,
                    known_votes,
                } => {
                    s.append(vote_step)
                        .append_optional(proposal.as_ref())
                        .append_optional(lock_view.as_ref())
                        .append(known_votes);
                }
                TendermintMessage::RequestMessage {
                    vote_step,
                    requested_votes,
                } => {
                    s.append(vote_step).append(requested_votes);
                }
                TendermintMessage::RequestProposal { height, view } => {
                    s.append(height).append(view);
                }
            }
        });
        s.out()
    }

    /// Decode an extension payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let rlp = Rlp::new(bytes);
        rlp.ensure_exact()?;
        let id: u8 = rlp.val_at(0)?;
        let message_id =
            TendermintMessageId::from_byte(id).ok_or(ProtocolError::InvalidMessageType(id))?;

        let message = match message_id {
            TendermintMessageId::ConsensusMessage => {
                let items = rlp.expect_items(2)?;
                let votes = items[1]
                    .items()?
                    .iter()
                    .map(|item| {
                        let bytes: Vec<u8> = item.as_val()?;
                        crate::codec::decode::<ConsensusVote>(&bytes)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                TendermintMessage::ConsensusMessage(votes)
            }
            TendermintMessageId::ProposalBlock => {
                let items = rlp.expect_items(5)?;
                TendermintMessage::ProposalBlock(ProposalBlock {
                    signature: items[1].as_val()?,
                    priority_info: items[2].as_val()?,
                    view: items[3].as_val()?,
                    message: items[4].as_val()?,
                })
            }
            TendermintMessageId::StepState => {
                let items = rlp.expect_items(5)?;
                TendermintMessage::StepState {
                    vote_step: items[1].as_val()?,
                    proposal: items[2].as_optional()?,
                    lock_view: items[3].as_optional()?,
                    known_votes: items[4].as_val()?,
                }
            }
            TendermintMessageId::RequestMessage => {
                let items = rlp.expect_items(3)?;
                TendermintMessage::RequestMessage {
                    vote_step: items[1].as_val()?,
                    requested_votes: items[2].as_val()?,
                }
            }
            TendermintMessageId::RequestProposal => {
                let items = rlp.expect_items(3)?;
                TendermintMessage::RequestProposal {
                    height: items[1].as_val()?,
                    view: items[2].as_val()?,
                }
            }
        };
        Ok(message)
    }
}
