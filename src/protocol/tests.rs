use super::*;
use crate::codec::{decode, encode};
use crate::crypto::{blake256, Nonce, H160, H256};
use crate::identity::Identity;

fn sample_header(number: u64) -> Header {
    Header {
        parent_hash: H256::new([1; 32]),
        author: H160::new([2; 20]),
        state_root: H256::new([3; 32]),
        transactions_root: H256::new([4; 32]),
        next_validator_set_hash: H256::new([5; 32]),
        score: 1_000_000,
        number,
        timestamp: 1_600_000_000,
        extra_data: b"extra".to_vec(),
        seal: vec![encode(&0u64), encode(&b"seal".to_vec())],
    }
}

fn sample_priority_info() -> PriorityInfo {
    PriorityInfo {
        signer_index: 3,
        priority: H256::new([9; 32]),
        sub_user_index: 1,
        number_of_elections: 4,
        vrf_proof: vec![0xaa; 81],
    }
}

fn signed_vote(identity: &Identity, step: VoteStep, hash: Option<H256>) -> ConsensusVote {
    let on = VoteOn::new(step, hash);
    ConsensusVote::new(on, identity.sign(&on.digest()), 2)
}

// ===== Envelopes =====

#[test]
fn test_protocol_id_bytes() {
    for b in 1..=8u8 {
        assert_eq!(ProtocolId::from_byte(b).unwrap().to_byte(), b);
    }
    assert!(ProtocolId::from_byte(0).is_none());
    assert!(ProtocolId::from_byte(9).is_none());
    assert_eq!(ProtocolId::Ack.to_string(), "Ack");
}

#[test]
fn test_envelope_roundtrip_each_variant() {
    let key = Identity::generate().public_bytes();
    let envelopes = vec![
        Envelope::Sync1 {
            public_key: key,
            network_id: "tc".to_string(),
            port: 3486,
        },
        Envelope::Sync2 {
            public_key: key,
            network_id: String::new(),
            port: 0,
        },
        Envelope::Ack {
            public_key: key,
            encrypted_nonce: vec![7; 32],
        },
        Envelope::Nack,
        Envelope::NegotiationRequest {
            extension: BLOCK_SYNC_EXTENSION.to_string(),
            version: 0,
        },
        Envelope::NegotiationResponse {
            extension: TRANSACTION_SYNC_EXTENSION.to_string(),
            version: 1,
        },
        Envelope::Encrypted {
            extension: CONSENSUS_EXTENSION.to_string(),
            ciphertext: vec![1],
        },
        Envelope::Unencrypted {
            extension: CONSENSUS_EXTENSION.to_string(),
            data: Vec::new(),
        },
    ];
    for envelope in envelopes {
        let bytes = envelope.encode();
        assert_eq!(Envelope::decode(&bytes).unwrap(), envelope);
    }
}

#[test]
fn test_envelope_wire_layout() {
    let bytes = Envelope::Nack.encode();
    // [version 0, id 4]
    assert_eq!(bytes, vec![0xc2, 0x80, 0x04]);
}

#[test]
fn test_envelope_rejects_unknown_id_and_version() {
    let mut s = crate::codec::RlpStream::new();
    s.list(|s| {
        s.append(&0u8).append(&0x20u8);
    });
    assert!(matches!(
        Envelope::decode(&s.out()),
        Err(ProtocolError::InvalidMessageType(0x20))
    ));

    let mut s = crate::codec::RlpStream::new();
    s.list(|s| {
        s.append(&1u8).append(&4u8);
    });
    assert!(matches!(
        Envelope::decode(&s.out()),
        Err(ProtocolError::UnsupportedVersion(1))
    ));
}

#[test]
fn test_signed_envelope_open() {
    let nonce = Nonce::new(0xdead_beef);
    let envelope = Envelope::Unencrypted {
        extension: BLOCK_SYNC_EXTENSION.to_string(),
        data: vec![1, 2, 3],
    };
    let signed = SignedEnvelope::seal(envelope.clone(), &nonce).unwrap();
    assert_eq!(signed.envelope(), &envelope);

    let bytes = signed.encode();
    assert_eq!(SignedEnvelope::open(&bytes, &nonce).unwrap(), envelope);
}

#[test]
fn test_signed_envelope_wrong_nonce() {
    let envelope = Envelope::NegotiationRequest {
        extension: BLOCK_SYNC_EXTENSION.to_string(),
        version: 0,
    };
    let bytes = SignedEnvelope::seal(envelope, &Nonce::new(1))
        .unwrap()
        .encode();
    assert!(matches!(
        SignedEnvelope::open(&bytes, &Nonce::new(2)),
        Err(ProtocolError::DigestMismatch)
    ));
}

#[test]
fn test_signed_envelope_tampered_payload() {
    let nonce = Nonce::new(77);
    let envelope = Envelope::Unencrypted {
        extension: BLOCK_SYNC_EXTENSION.to_string(),
        data: vec![0x10, 0x20],
    };
    let mut bytes = SignedEnvelope::seal(envelope, &nonce).unwrap().encode();
    let position = bytes.iter().position(|b| *b == 0x20).unwrap();
    bytes[position] = 0x21;
    assert!(matches!(
        SignedEnvelope::open(&bytes, &nonce),
        Err(ProtocolError::DigestMismatch)
    ));
}

#[test]
fn test_digest_is_keyed_blake() {
    let nonce = Nonce::new(5);
    let encoded = Envelope::Nack.encode();
    let digest = envelope_digest(&encoded, &nonce).unwrap();
    assert_ne!(digest, blake256(&encoded));
    assert_eq!(
        SignedEnvelope::seal(Envelope::Nack, &nonce).unwrap().digest(),
        &digest
    );
}

// ===== Header / Block =====

#[test]
fn test_header_roundtrip_and_hash() {
    let header = sample_header(10);
    let decoded = Header::decode(&header.encode()).unwrap();
    assert_eq!(decoded, header);
    assert_eq!(decoded.hash(), header.hash());
    assert_eq!(header.hash(), blake256(&header.encode()));
}

#[test]
fn test_header_with_timestamp_changes_hash() {
    let header = sample_header(10);
    let bumped = header.with_timestamp(header.timestamp + 1);
    assert_eq!(bumped.timestamp, header.timestamp + 1);
    assert_eq!(bumped.number, header.number);
    assert_eq!(bumped.seal, header.seal);
    assert_ne!(bumped.hash(), header.hash());
}

#[test]
fn test_header_rejects_short_list() {
    let mut s = crate::codec::RlpStream::new();
    s.list(|s| {
        s.append(&H256::zero());
    });
    assert!(Header::decode(&s.out()).is_err());
}

#[test]
fn test_block_compress_roundtrip() {
    let block = Block::new(sample_header(3), vec![encode(&b"tx-1".to_vec())]);
    let compressed = block.compress().unwrap();
    assert_eq!(Block::decompress(&compressed).unwrap(), block);

    let empty = Block::new(sample_header(4), Vec::new());
    assert_eq!(Block::decompress(&empty.compress().unwrap()).unwrap(), empty);
}

// ===== Block sync =====

#[test]
fn test_status_roundtrip() {
    let message = BlockSyncMessage::Status {
        total_score: 12345,
        best_hash: H256::new([1; 32]),
        genesis_hash: H256::new([2; 32]),
    };
    let bytes = message.encode().unwrap();
    assert_eq!(BlockSyncMessage::decode(&bytes).unwrap(), message);
    assert_eq!(message.message_id(), BlockSyncMessageId::Status);
}

#[test]
fn test_header_request_roundtrip() {
    let message = BlockSyncMessage::Request(
        7,
        RequestMessage::Headers {
            start_number: 1,
            max_count: 128,
        },
    );
    let bytes = message.encode().unwrap();
    assert_eq!(BlockSyncMessage::decode(&bytes).unwrap(), message);
}

#[test]
fn test_body_request_roundtrip_lengths() {
    for hashes in [vec![], vec![H256::new([3; 32])]] {
        let message = BlockSyncMessage::Request(1, RequestMessage::Bodies(hashes));
        let bytes = message.encode().unwrap();
        assert_eq!(BlockSyncMessage::decode(&bytes).unwrap(), message);
    }
}

#[test]
fn test_headers_response_roundtrip_lengths() {
    for headers in [vec![], vec![sample_header(1).encode()]] {
        let message = BlockSyncMessage::Response(2, ResponseMessage::Headers(headers));
        let bytes = message.encode().unwrap();
        assert_eq!(BlockSyncMessage::decode(&bytes).unwrap(), message);
    }
}

#[test]
fn test_bodies_response_roundtrip_lengths() {
    let bodies_cases = vec![
        vec![],
        vec![vec![]],
        vec![vec![encode(&b"tx".to_vec())]],
    ];
    for bodies in bodies_cases {
        let message = BlockSyncMessage::Response(3, ResponseMessage::Bodies(bodies));
        let bytes = message.encode().unwrap();
        assert_eq!(BlockSyncMessage::decode(&bytes).unwrap(), message);
    }
}

#[test]
fn test_empty_bodies_decompress_to_empty_list() {
    let message = BlockSyncMessage::Response(0, ResponseMessage::Bodies(Vec::new()));
    let bytes = message.encode().unwrap();

    let rlp = crate::codec::Rlp::new(&bytes);
    let body = rlp.at(2).unwrap();
    let compressed: Vec<u8> = body.val_at(0).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), vec![0xc0]);
}

#[test]
fn test_state_sync_unsupported() {
    for id in 6..=9u8 {
        let mut s = crate::codec::RlpStream::new();
        s.list(|s| {
            s.append(&id).append(&1u64).append_list::<u64>(&[]);
        });
        let err = BlockSyncMessage::decode(&s.out()).unwrap_err();
        assert!(err.is_unsupported(), "id {} gave {:?}", id, err);
    }
}

#[test]
fn test_block_sync_unknown_id() {
    let mut s = crate::codec::RlpStream::new();
    s.list(|s| {
        s.append(&42u8);
    });
    let err = BlockSyncMessage::decode(&s.out()).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidMessageType(42)));
    assert!(!err.is_unsupported());
}

// ===== Transaction sync =====

#[test]
fn test_transaction_sync_roundtrip_lengths() {
    for txs in [vec![], vec![encode(&b"signed tx".to_vec())]] {
        let message = TransactionSyncMessage::new(txs);
        assert_eq!(
            TransactionSyncMessage::decode(&message.encode()).unwrap(),
            message
        );
    }
}

// ===== Consensus =====

#[test]
fn test_step_parse_and_order() {
    assert_eq!("Prevote".parse::<Step>().unwrap(), Step::Prevote);
    assert_eq!("precommit".parse::<Step>().unwrap(), Step::Precommit);
    assert!("vote".parse::<Step>().is_err());

    let a = VoteStep::new(1, 5, Step::Commit);
    let b = VoteStep::new(2, 0, Step::Propose);
    let c = VoteStep::new(2, 0, Step::Prevote);
    let d = VoteStep::new(2, 1, Step::Propose);
    assert!(a < b && b < c && c < d);
}

#[test]
fn test_vote_digest_matches_canonical_encoding() {
    let step = VoteStep::new(4, 1, Step::Prevote);
    let hash = H256::new([8; 32]);
    let on = VoteOn::new(step, Some(hash));

    let mut s = crate::codec::RlpStream::new();
    s.list(|s| {
        s.list(|s| {
            s.append(&4u64).append(&1u64).append(&1u8);
        })
        .list(|s| {
            s.append(&hash);
        });
    });
    assert_eq!(on.digest(), blake256(&s.out()));
    assert_ne!(on.digest(), VoteOn::new(step, None).digest());
}

#[test]
fn test_consensus_vote_signature() {
    let identity = Identity::generate();
    let vote = signed_vote(&identity, VoteStep::new(1, 0, Step::Precommit), None);
    assert!(vote.is_signed_by(&identity.public_key()));
    assert!(!vote.is_signed_by(&Identity::generate().public_key()));

    let decoded: ConsensusVote = decode(&encode(&vote)).unwrap();
    assert_eq!(decoded, vote);
    assert!(decoded.is_signed_by(&identity.public_key()));
}

#[test]
fn test_vote_signature_bound_to_step_and_hash() {
    let identity = Identity::generate();
    let public_key = identity.public_key();
    let hash = H256::new([6; 32]);
    let vote = signed_vote(&identity, VoteStep::new(10, 2, Step::Prevote), Some(hash));
    assert!(vote.is_signed_by(&public_key));

    let others = [
        VoteOn::new(VoteStep::new(11, 2, Step::Prevote), Some(hash)),
        VoteOn::new(VoteStep::new(10, 3, Step::Prevote), Some(hash)),
        VoteOn::new(VoteStep::new(10, 2, Step::Precommit), Some(hash)),
        VoteOn::new(VoteStep::new(10, 2, Step::Prevote), Some(H256::new([7; 32]))),
        VoteOn::new(VoteStep::new(10, 2, Step::Prevote), None),
    ];
    for on in others {
        assert!(
            !vote.signature.is_signed_by(&on.digest(), &public_key),
            "signature accepted for {:?}",
            on
        );
        let moved = ConsensusVote::new(on, vote.signature, vote.signer_index);
        assert!(!moved.is_signed_by(&public_key));
    }
}

#[test]
fn test_consensus_message_roundtrip_lengths() {
    let identity = Identity::generate();
    let cases = vec![
        vec![],
        vec![signed_vote(
            &identity,
            VoteStep::new(3, 0, Step::Prevote),
            Some(H256::new([1; 32])),
        )],
    ];
    for votes in cases {
        let message = TendermintMessage::ConsensusMessage(votes);
        assert_eq!(TendermintMessage::decode(&message.encode()).unwrap(), message);
    }
}

#[test]
fn test_proposal_block_roundtrip_and_signature() {
    let identity = Identity::generate();
    let block = Block::new(sample_header(12), vec![encode(&b"tx".to_vec())]);
    let on = proposal_vote_on(&block, 2);
    assert_eq!(on.step, VoteStep::new(12, 2, Step::Propose));
    assert_eq!(on.block_hash, Some(block.header.hash()));

    let proposal =
        ProposalBlock::new(identity.sign(&on.digest()), sample_priority_info(), 2, &block)
            .unwrap();
    assert_eq!(proposal.block().unwrap(), block);
    assert!(proposal.is_signed_by(&identity.public_key()).unwrap());

    let message = TendermintMessage::ProposalBlock(proposal);
    assert_eq!(TendermintMessage::decode(&message.encode()).unwrap(), message);
}

#[test]
fn test_step_state_roundtrip_optionals() {
    let vote_step = VoteStep::new(9, 0, Step::Propose);
    let cases = vec![
        (None, None),
        (
            Some(ProposalSummary {
                priority_info: sample_priority_info(),
                block_hash: H256::new([6; 32]),
            }),
            Some(3u64),
        ),
    ];
    for (proposal, lock_view) in cases {
        let message = TendermintMessage::StepState {
            vote_step,
            proposal,
            lock_view,
            known_votes: BitSet::with_indices(&[0, 5, 17]),
        };
        assert_eq!(TendermintMessage::decode(&message.encode()).unwrap(), message);
    }
}

#[test]
fn test_request_messages_roundtrip() {
    let request = TendermintMessage::RequestMessage {
        vote_step: VoteStep::new(1, 1, Step::Precommit),
        requested_votes: BitSet::new(),
    };
    assert_eq!(TendermintMessage::decode(&request.encode()).unwrap(), request);

    let proposal = TendermintMessage::RequestProposal { height: 0, view: 1 };
    assert_eq!(TendermintMessage::decode(&proposal.encode()).unwrap(), proposal);
}

#[test]
fn test_tendermint_unknown_id() {
    let mut s = crate::codec::RlpStream::new();
    s.list(|s| {
        s.append(&6u8);
    });
    assert!(matches!(
        TendermintMessage::decode(&s.out()),
        Err(ProtocolError::InvalidMessageType(6))
    ));
}

#[test]
fn test_bitset() {
    let mut set = BitSet::new();
    assert_eq!(set.as_bytes().len(), BITSET_SIZE);
    assert_eq!(set.count(), 0);
    set.set(3);
    set.set(9);
    assert!(set.is_set(3) && set.is_set(9));
    assert!(!set.is_set(4));
    assert_eq!(set.count(), 2);
    set.set(BITSET_SIZE * 8 + 1);
    assert!(set.is_set(BITSET_SIZE * 8 + 1));
    assert!(!set.is_set(100_000));
}

// ===== Extension dispatch =====

#[test]
fn test_extension_message_dispatch() {
    let message = ExtensionMessage::from(TransactionSyncMessage::new(vec![encode(&1u8)]));
    assert_eq!(message.extension(), TRANSACTION_SYNC_EXTENSION);
    let bytes = message.encode().unwrap();
    assert_eq!(
        ExtensionMessage::decode(TRANSACTION_SYNC_EXTENSION, &bytes).unwrap(),
        message
    );

    assert!(matches!(
        ExtensionMessage::decode("unknown", &bytes),
        Err(ProtocolError::UnknownExtension(_))
    ));
}

#[test]
fn test_status_score_limits() {
    let status = BlockSyncMessage::Status {
        total_score: u128::MAX,
        best_hash: H256::new([1; 32]),
        genesis_hash: H256::new([2; 32]),
    };
    assert_eq!(BlockSyncMessage::decode(&status.encode().unwrap()).unwrap(), status);

    // A score wider than 128 bits is rejected, not truncated.
    let mut wide = vec![0u8; 17];
    wide[0] = 1;
    let mut s = crate::codec::RlpStream::new();
    s.list(|s| {
        s.append(&1u8)
            .append_bytes(&wide)
            .append(&H256::zero())
            .append(&H256::zero());
    });
    assert!(matches!(
        BlockSyncMessage::decode(&s.out()),
        Err(ProtocolError::Decode(crate::codec::DecodeError::IntegerOverflow(16)))
    ));
}
