use super::*;
use crate::crypto::H256;
use crate::protocol::{TransactionSyncMessage, VoteStep, Step, BitSet};

fn status(score: u128) -> ExtensionMessage {
    ExtensionMessage::BlockSync(BlockSyncMessage::Status {
        total_score: score,
        best_hash: H256::zero(),
        genesis_hash: H256::zero(),
    })
}

fn header_response(request_id: u64, count: usize) -> ExtensionMessage {
    ExtensionMessage::BlockSync(BlockSyncMessage::Response(
        request_id,
        ResponseMessage::Headers(vec![vec![0xc0]; count]),
    ))
}

#[test]
fn test_event_kind_of() {
    assert_eq!(EventKind::of(&status(1)), EventKind::Status);
    assert_eq!(EventKind::of(&header_response(1, 0)), EventKind::HeaderResponse);
    assert_eq!(
        EventKind::of(&ExtensionMessage::BlockSync(BlockSyncMessage::Request(
            1,
            RequestMessage::Bodies(vec![])
        ))),
        EventKind::BodyRequest
    );
    assert_eq!(
        EventKind::of(&ExtensionMessage::TransactionSync(TransactionSyncMessage::default())),
        EventKind::TransactionSync
    );
    assert_eq!(
        EventKind::of(&ExtensionMessage::Tendermint(TendermintMessage::StepState {
            vote_step: VoteStep::new(1, 0, Step::Propose),
            proposal: None,
            lock_view: None,
            known_votes: BitSet::new(),
        })),
        EventKind::StepState
    );
}

#[tokio::test]
async fn test_subscribe_receives_in_order() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventKind::Status);

    assert_eq!(bus.publish(EventKind::Status, &status(1)), 1);
    assert_eq!(bus.publish(EventKind::Status, &status(2)), 1);
    assert_eq!(bus.publish(EventKind::HeaderResponse, &header_response(0, 1)), 0);

    assert_eq!(sub.recv().await, Some(status(1)));
    assert_eq!(sub.recv().await, Some(status(2)));
}

#[tokio::test]
async fn test_once_consumed_by_first_publish() {
    let bus = EventBus::new();
    let rx = bus.once(EventKind::Status);
    assert_eq!(bus.subscriber_count(EventKind::Status), 1);

    bus.publish(EventKind::Status, &status(5));
    assert_eq!(bus.subscriber_count(EventKind::Status), 0);
    assert_eq!(rx.await.unwrap(), status(5));

    assert_eq!(bus.publish(EventKind::Status, &status(6)), 0);
}

#[test]
fn test_drop_unsubscribes() {
    let bus = EventBus::new();
    let sub = bus.subscribe(EventKind::ConsensusMessage);
    let other = bus.subscribe(EventKind::ConsensusMessage);
    assert_eq!(bus.subscriber_count(EventKind::ConsensusMessage), 2);

    drop(sub);
    assert_eq!(bus.subscriber_count(EventKind::ConsensusMessage), 1);

    other.unsubscribe();
    assert_eq!(bus.subscriber_count(EventKind::ConsensusMessage), 0);
}

#[test]
fn test_unsubscribe_by_id() {
    let bus = EventBus::new();
    let sub = bus.subscribe(EventKind::StepState);
    assert!(bus.unsubscribe(EventKind::StepState, sub.id()));
    assert!(!bus.unsubscribe(EventKind::StepState, sub.id()));
    drop(sub);
    assert_eq!(bus.subscriber_count(EventKind::StepState), 0);
}

#[test]
fn test_subscription_outlives_bus() {
    let bus = EventBus::new();
    let sub = bus.subscribe(EventKind::Status);
    drop(bus);
    // Weak handle: nothing to remove from, nothing panics.
    drop(sub);
}

#[tokio::test]
async fn test_once_fails_when_bus_dropped() {
    let bus = EventBus::new();
    let rx = bus.once(EventKind::BodyResponse);
    drop(bus);
    assert!(rx.await.is_err());
}

#[test]
fn test_dropped_once_receiver_pruned() {
    let bus = EventBus::new();
    drop(bus.once(EventKind::Status));
    assert_eq!(bus.publish(EventKind::Status, &status(1)), 0);
    assert_eq!(bus.subscriber_count(EventKind::Status), 0);
}

#[test]
fn test_abandoned_once_pruned_on_register() {
    let bus = EventBus::new();
    for _ in 0..50 {
        drop(bus.once(EventKind::StepState));
    }
    let _live = bus.once(EventKind::StepState);
    assert_eq!(bus.subscriber_count(EventKind::StepState), 1);

    let _stream = bus.subscribe(EventKind::StepState);
    assert_eq!(bus.subscriber_count(EventKind::StepState), 2);
}

#[tokio::test]
async fn test_timed_out_wait_pruned() {
    let bus = EventBus::new();
    for _ in 0..10 {
        let rx = bus.once(EventKind::HeaderResponse);
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(1), rx).await;
        assert!(waited.is_err());
    }
    assert!(bus.subscriber_count(EventKind::HeaderResponse) <= 1);
}

#[test]
fn test_arrival_log_order_and_last() {
    let log = ArrivalLog::new();
    assert!(log.is_empty());
    assert!(log.last_header_response().is_none());

    log.push(header_response(1, 1));
    log.push(status(3));
    log.push(header_response(2, 3));
    log.push(ExtensionMessage::TransactionSync(TransactionSyncMessage::new(vec![vec![0x01]])));

    assert_eq!(log.len(), 4);
    assert_eq!(log.messages()[1], status(3));
    assert_eq!(log.last_header_response().unwrap().len(), 3);
    assert_eq!(log.last(EventKind::Status), Some(status(3)));
    assert!(log.last_body_response().is_none());
    assert_eq!(log.last_transaction_sync(), Some(vec![vec![0x01]]));
}

#[test]
fn test_arrival_log_requests() {
    let log = ArrivalLog::new();
    log.push(ExtensionMessage::BlockSync(BlockSyncMessage::Request(
        4,
        RequestMessage::Headers {
            start_number: 10,
            max_count: 20,
        },
    )));
    log.push(ExtensionMessage::BlockSync(BlockSyncMessage::Request(
        5,
        RequestMessage::Bodies(vec![H256::new([1; 32])]),
    )));

    assert_eq!(log.last_header_request(), Some((4, 10, 20)));
    assert_eq!(log.last_body_request(), Some((5, vec![H256::new([1; 32])])));
}

#[test]
fn test_event_kind_all_distinct_names() {
    let names: std::collections::HashSet<String> =
        EventKind::ALL.iter().map(|k| k.to_string()).collect();
    assert_eq!(names.len(), EventKind::ALL.len());
}
