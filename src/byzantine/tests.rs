use super::*;
use crate::events::EventKind;
use crate::peer::testing::{FakeNode, NodeConnection};
use crate::peer::{Peer, PeerError};
use crate::protocol::{
    BitSet, Header, PriorityInfo, VoteStep, BLOCK_SYNC_EXTENSION, CONSENSUS_EXTENSION,
};

fn signed_vote(identity: &Identity, step: VoteStep, hash: Option<H256>, index: u64) -> ConsensusVote {
    let on = VoteOn::new(step, hash);
    ConsensusVote::new(on, identity.sign(&on.digest()), index)
}

fn priority_info() -> PriorityInfo {
    PriorityInfo {
        signer_index: 1,
        priority: H256::new([7; 32]),
        sub_user_index: 0,
        number_of_elections: 1,
        vrf_proof: vec![0x55; 16],
    }
}

fn signed_proposal(identity: &Identity, number: u64, view: u64) -> ProposalBlock {
    let header = Header {
        number,
        timestamp: 100,
        ..Default::default()
    };
    let block = Block::new(header, vec![crate::codec::encode(&b"tx".to_vec())]);
    let on = proposal_vote_on(&block, view);
    ProposalBlock::new(identity.sign(&on.digest()), priority_info(), view, &block).unwrap()
}

// ===== Forging =====

#[test]
fn test_forge_vote() {
    let validator = Identity::generate();
    let step = VoteStep::new(5, 1, Step::Prevote);
    let vote = signed_vote(&validator, step, Some(H256::new([9; 32])), 3);

    let forged = forge_vote(&validator, Step::Prevote, &[vote]).unwrap();
    assert_eq!(forged.vote_step(), step);
    assert_eq!(forged.block_hash(), Some(H256::zero()));
    assert_eq!(forged.signer_index, 3);
    assert!(forged.is_signed_by(&validator.public_key()));
}

#[test]
fn test_forge_vote_picks_matching_signer() {
    let validator = Identity::generate();
    let other = Identity::generate();
    let step = VoteStep::new(5, 0, Step::Precommit);
    let votes = vec![
        signed_vote(&other, step, Some(H256::new([1; 32])), 0),
        signed_vote(&validator, step, Some(H256::new([2; 32])), 4),
    ];

    let forged = forge_vote(&validator, Step::Precommit, &votes).unwrap();
    assert_eq!(forged.signer_index, 4);
    assert!(forge_vote(&validator, Step::Prevote, &votes).is_none());
}

#[test]
fn test_forge_vote_skips_zero_hash() {
    let validator = Identity::generate();
    let step = VoteStep::new(5, 0, Step::Prevote);
    let votes = vec![
        signed_vote(&validator, step, Some(H256::zero()), 0),
    ];
    assert!(forge_vote(&validator, Step::Prevote, &votes).is_none());

    let nil = vec![signed_vote(&validator, step, None, 0)];
    let forged = forge_vote(&validator, Step::Prevote, &nil).unwrap();
    assert_eq!(forged.block_hash(), Some(H256::zero()));
}

#[test]
fn test_forge_proposal() {
    let validator = Identity::generate();
    let original = signed_proposal(&validator, 4, 2);

    let forged = forge_proposal(&validator, &original).unwrap().unwrap();
    let original_block = original.block().unwrap();
    let forged_block = forged.block().unwrap();

    assert_eq!(forged.view, 2);
    assert_eq!(forged.priority_info, original.priority_info);
    assert_eq!(forged_block.header.timestamp, 101);
    assert_eq!(forged_block.header.number, 4);
    assert_eq!(forged_block.transactions, original_block.transactions);
    assert_ne!(forged_block.header.hash(), original_block.header.hash());
    assert!(forged.is_signed_by(&validator.public_key()).unwrap());
}

#[test]
fn test_forge_proposal_other_signer() {
    let validator = Identity::generate();
    let original = signed_proposal(&Identity::generate(), 4, 0);
    assert!(forge_proposal(&validator, &original).unwrap().is_none());
}

#[test]
fn test_forge_proposal_bad_block() {
    let validator = Identity::generate();
    let mut proposal = signed_proposal(&validator, 4, 0);
    proposal.message = vec![0xff, 0xff, 0xff];
    assert!(forge_proposal(&validator, &proposal).is_err());
}

// ===== Over the wire =====

async fn consensus_pair(node: &FakeNode) -> (Peer, NodeConnection) {
    let mut config = node.config();
    config.peer.extensions = Some(vec![
        BLOCK_SYNC_EXTENSION.to_string(),
        CONSENSUS_EXTENSION.to_string(),
    ]);
    let mut peer = Peer::new(config);
    let (result, mut conn) = tokio::join!(peer.establish_without_sync(None), async {
        let mut conn = node.accept_established(2).await;
        conn.send_status().await;
        conn
    });
    result.unwrap();
    conn.read_message().await;
    (peer, conn)
}

async fn read_tendermint(conn: &mut NodeConnection) -> TendermintMessage {
    match conn.read_message().await {
        ExtensionMessage::Tendermint(message) => message,
        other => panic!("expected tendermint message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_start_requires_connection() {
    let mut peer = Peer::new(crate::config::Config::new());
    assert!(matches!(
        peer.start_double_vote(Identity::generate(), Step::Prevote).await,
        Err(PeerError::NotConnected)
    ));
    assert!(matches!(
        peer.start_double_proposal(Identity::generate()).await,
        Err(PeerError::NotConnected)
    ));
    assert!(!peer.injector().is_double_voting());
}

#[tokio::test]
async fn test_double_vote_over_wire() {
    let node = FakeNode::bind().await;
    let (mut peer, mut conn) = consensus_pair(&node).await;
    let validator = Identity::generate();
    let other = Identity::generate();

    peer.start_double_vote(validator.clone(), Step::Prevote)
        .await
        .unwrap();
    assert!(peer.injector().is_double_voting());

    // Someone else's vote is not equivocated on.
    let step = VoteStep::new(8, 0, Step::Prevote);
    conn.send_message(TendermintMessage::ConsensusMessage(vec![signed_vote(
        &other,
        VoteStep::new(7, 0, Step::Prevote),
        Some(H256::new([1; 32])),
        0,
    )]))
    .await;
    conn.send_message(TendermintMessage::ConsensusMessage(vec![signed_vote(
        &validator,
        step,
        Some(H256::new([2; 32])),
        3,
    )]))
    .await;

    match read_tendermint(&mut conn).await {
        TendermintMessage::ConsensusMessage(votes) => {
            assert_eq!(votes.len(), 1);
            assert_eq!(votes[0].vote_step(), step);
            assert_eq!(votes[0].block_hash(), Some(H256::zero()));
            assert_eq!(votes[0].signer_index, 3);
            assert!(votes[0].is_signed_by(&validator.public_key()));
        }
        other => panic!("expected ConsensusMessage, got {:?}", other),
    }

    // Only step states at the armed step trigger a vote request.
    let known = BitSet::with_indices(&[0, 3]);
    for state_step in [VoteStep::new(8, 0, Step::Precommit), step] {
        conn.send_message(TendermintMessage::StepState {
            vote_step: state_step,
            proposal: None,
            lock_view: None,
            known_votes: known.clone(),
        })
        .await;
    }
    assert_eq!(
        read_tendermint(&mut conn).await,
        TendermintMessage::RequestMessage {
            vote_step: step,
            requested_votes: known,
        }
    );

    peer.stop_double_vote().await;
    assert!(!peer.injector().is_double_voting());
    assert_eq!(peer.events().subscriber_count(EventKind::ConsensusMessage), 0);
    assert_eq!(peer.events().subscriber_count(EventKind::StepState), 0);
    peer.stop_double_vote().await;
}

#[tokio::test]
async fn test_double_proposal_over_wire() {
    let node = FakeNode::bind().await;
    let (mut peer, mut conn) = consensus_pair(&node).await;
    let validator = Identity::generate();

    peer.start_double_proposal(validator.clone()).await.unwrap();
    assert!(peer.injector().is_double_proposing());

    let original = signed_proposal(&validator, 4, 1);
    conn.send_message(TendermintMessage::ProposalBlock(original.clone()))
        .await;

    match read_tendermint(&mut conn).await {
        TendermintMessage::ProposalBlock(forged) => {
            assert_eq!(forged.view, 1);
            assert_eq!(forged.priority_info, original.priority_info);
            assert_eq!(forged.block().unwrap().header.timestamp, 101);
            assert!(forged.is_signed_by(&validator.public_key()).unwrap());
        }
        other => panic!("expected ProposalBlock, got {:?}", other),
    }

    conn.send_message(TendermintMessage::StepState {
        vote_step: VoteStep::new(4, 1, Step::Propose),
        proposal: None,
        lock_view: None,
        known_votes: BitSet::new(),
    })
    .await;
    assert_eq!(
        read_tendermint(&mut conn).await,
        TendermintMessage::RequestProposal { height: 4, view: 1 }
    );

    peer.stop_double_proposal().await;
    assert!(!peer.injector().is_double_proposing());
    assert_eq!(peer.events().subscriber_count(EventKind::ProposalBlock), 0);
    assert_eq!(peer.events().subscriber_count(EventKind::StepState), 0);
}

#[tokio::test]
async fn test_end_disarms_injector() {
    let node = FakeNode::bind().await;
    let (mut peer, _conn) = consensus_pair(&node).await;

    peer.start_double_vote(Identity::generate(), Step::Precommit)
        .await
        .unwrap();
    peer.start_double_proposal(Identity::generate())
        .await
        .unwrap();
    assert_eq!(peer.events().subscriber_count(EventKind::StepState), 2);

    peer.end().await.unwrap();
    assert!(!peer.injector().is_double_voting());
    assert!(!peer.injector().is_double_proposing());
    assert_eq!(peer.events().subscriber_count(EventKind::StepState), 0);
}

#[tokio::test]
async fn test_rearm_replaces_task() {
    let node = FakeNode::bind().await;
    let (mut peer, _conn) = consensus_pair(&node).await;

    peer.start_double_vote(Identity::generate(), Step::Prevote)
        .await
        .unwrap();
    peer.start_double_vote(Identity::generate(), Step::Precommit)
        .await
        .unwrap();
    assert_eq!(peer.events().subscriber_count(EventKind::ConsensusMessage), 1);
}
