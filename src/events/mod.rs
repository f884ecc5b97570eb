//! Arrival Log and Event Bus
//!
//! Every extension message the receive task decodes is appended to the
//! peer's [`ArrivalLog`] and published on its [`EventBus`] under the
//! matching [`EventKind`]. Subscribers either stream every event of a kind
//! ([`EventBus::subscribe`]) or take the next one ([`EventBus::once`]).
//!
//! The bus is owned per peer. A [`Subscription`] holds only a weak handle
//! on the bus and removes itself when dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::protocol::{
    BlockSyncMessage, ExtensionMessage, RequestMessage, ResponseMessage, TendermintMessage,
};

/// Kinds of events published for decoded extension messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    HeaderRequest,
    BodyRequest,
    HeaderResponse,
    BodyResponse,
    TransactionSync,
    ConsensusMessage,
    ProposalBlock,
    StepState,
    RequestMessage,
    RequestProposal,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::Status,
        EventKind::HeaderRequest,
        EventKind::BodyRequest,
        EventKind::HeaderResponse,
        EventKind::BodyResponse,
        EventKind::TransactionSync,
        EventKind::ConsensusMessage,
        EventKind::ProposalBlock,
        EventKind::StepState,
        EventKind::RequestMessage,
        EventKind::RequestProposal,
    ];

    /// The event kind a decoded message is published under.
    pub fn of(message: &ExtensionMessage) -> Self {
        match message {
            ExtensionMessage::BlockSync(BlockSyncMessage::Status { .. }) => EventKind::Status,
            ExtensionMessage::BlockSync(BlockSyncMessage::Request(_, request)) => match request {
                RequestMessage::Headers { .. } => EventKind::HeaderRequest,
                RequestMessage::Bodies(_) => EventKind::BodyRequest,
            },
            ExtensionMessage::BlockSync(BlockSyncMessage::Response(_, response)) => match response
            {
                ResponseMessage::Headers(_) => EventKind::HeaderResponse,
                ResponseMessage::Bodies(_) => EventKind::BodyResponse,
            },
            ExtensionMessage::TransactionSync(_) => EventKind::TransactionSync,
            ExtensionMessage::Tendermint(message) => match message {
                TendermintMessage::ConsensusMessage(_) => EventKind::ConsensusMessage,
                TendermintMessage::ProposalBlock(_) => EventKind::ProposalBlock,
                TendermintMessage::StepState { .. } => EventKind::StepState,
                TendermintMessage::RequestMessage { .. } => EventKind::RequestMessage,
                TendermintMessage::RequestProposal { .. } => EventKind::RequestProposal,
            },
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Status => "status",
            EventKind::HeaderRequest => "header_request",
            EventKind::BodyRequest => "body_request",
            EventKind::HeaderResponse => "header_response",
            EventKind::BodyResponse => "body_response",
            EventKind::TransactionSync => "transaction_sync",
            EventKind::ConsensusMessage => "consensus_message",
            EventKind::ProposalBlock => "proposal_block",
            EventKind::StepState => "step_state",
            EventKind::RequestMessage => "request_message",
            EventKind::RequestProposal => "request_proposal",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Event Bus
// ============================================================================

enum Sink {
    Stream(mpsc::UnboundedSender<ExtensionMessage>),
    Once(oneshot::Sender<ExtensionMessage>),
}

impl Sink {
    /// The receiving side is gone.
    fn is_closed(&self) -> bool {
        match self {
            Sink::Stream(tx) => tx.is_closed(),
            Sink::Once(tx) => tx.is_closed(),
        }
    }
}

struct Subscriber {
    id: u64,
    sink: Sink,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<EventKind, Vec<Subscriber>>,
}

impl Registry {
    fn insert(&mut self, kind: EventKind, sink: Sink) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let list = self.subscribers.entry(kind).or_default();
        list.retain(|s| !s.sink.is_closed());
        list.push(Subscriber { id, sink });
        id
    }

    fn remove(&mut self, kind: EventKind, id: u64) -> bool {
        let Some(list) = self.subscribers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.subscribers.remove(&kind);
        }
        removed
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-peer publish/subscribe hub keyed by [`EventKind`].
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every future event of `kind` until the subscription drops.
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = lock(&self.registry).insert(kind, Sink::Stream(tx));
        Subscription {
            kind,
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Receive only the next event of `kind`.
    ///
    /// The registration is consumed by the first publish of that kind.
    /// Registrations whose receiver was dropped are pruned on the next
    /// registration of the same kind.
    pub fn once(&self, kind: EventKind) -> oneshot::Receiver<ExtensionMessage> {
        let (tx, rx) = oneshot::channel();
        lock(&self.registry).insert(kind, Sink::Once(tx));
        rx
    }

    /// Remove a subscription by id. Returns whether it was registered.
    pub fn unsubscribe(&self, kind: EventKind, id: u64) -> bool {
        lock(&self.registry).remove(kind, id)
    }

    /// Deliver `message` to every subscriber of `kind`.
    ///
    /// One-shot subscribers and subscribers whose receiver is gone are
    /// dropped. Returns the number of deliveries.
    pub fn publish(&self, kind: EventKind, message: &ExtensionMessage) -> usize {
        let mut registry = lock(&self.registry);
        let Some(list) = registry.subscribers.remove(&kind) else {
            return 0;
        };

        let mut delivered = 0;
        let mut kept = Vec::with_capacity(list.len());
        for subscriber in list {
            match subscriber.sink {
                Sink::Stream(tx) => {
                    if tx.send(message.clone()).is_ok() {
                        delivered += 1;
                        kept.push(Subscriber {
                            id: subscriber.id,
                            sink: Sink::Stream(tx),
                        });
                    }
                }
                Sink::Once(tx) => {
                    if tx.send(message.clone()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        if !kept.is_empty() {
            registry.subscribers.insert(kind, kept);
        }
        trace!(%kind, delivered, "Published event");
        delivered
    }

    /// Number of registered subscribers for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.registry)
            .subscribers
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.registry);
        let counts: HashMap<EventKind, usize> = registry
            .subscribers
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

/// A streaming registration on an [`EventBus`].
///
/// Dropping it unsubscribes.
pub struct Subscription {
    kind: EventKind,
    id: u64,
    receiver: mpsc::UnboundedReceiver<ExtensionMessage>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the bus is gone and the backlog drained.
    pub async fn recv(&mut self) -> Option<ExtensionMessage> {
        self.receiver.recv().await
    }

    /// Remove this registration now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.kind, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

// ============================================================================
// Arrival Log
// ============================================================================

/// Append-only record of decoded extension messages in arrival order.
#[derive(Clone, Debug, Default)]
pub struct ArrivalLog {
    messages: Arc<RwLock<Vec<ExtensionMessage>>>,
}

impl ArrivalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: ExtensionMessage) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Snapshot of every message so far, oldest first.
    pub fn messages(&self) -> Vec<ExtensionMessage> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Most recent message satisfying `f`, mapped through it.
    pub fn find_last<T, F>(&self, f: F) -> Option<T>
    where
        F: FnMut(&ExtensionMessage) -> Option<T>,
    {
        self.read().iter().rev().find_map(f)
    }

    /// Most recent message published under `kind`.
    pub fn last(&self, kind: EventKind) -> Option<ExtensionMessage> {
        self.find_last(|m| (EventKind::of(m) == kind).then(|| m.clone()))
    }

    /// Encoded headers of the most recent header response.
    pub fn last_header_response(&self) -> Option<Vec<Vec<u8>>> {
        self.find_last(|m| match m {
            ExtensionMessage::BlockSync(BlockSyncMessage::Response(
                _,
                ResponseMessage::Headers(headers),
            )) => Some(headers.clone()),
            _ => None,
        })
    }

    /// Bodies of the most recent body response.
    pub fn last_body_response(&self) -> Option<Vec<Vec<Vec<u8>>>> {
        self.find_last(|m| match m {
            ExtensionMessage::BlockSync(BlockSyncMessage::Response(
                _,
                ResponseMessage::Bodies(bodies),
            )) => Some(bodies.clone()),
            _ => None,
        })
    }

    /// `(request_id, start_number, max_count)` of the most recent header request.
    pub fn last_header_request(&self) -> Option<(u64, u64, u64)> {
        self.find_last(|m| match m {
            ExtensionMessage::BlockSync(BlockSyncMessage::Request(
                request_id,
                RequestMessage::Headers {
                    start_number,
                    max_count,
                },
            )) => Some((*request_id, *start_number, *max_count)),
            _ => None,
        })
    }

    /// `(request_id, hashes)` of the most recent body request.
    pub fn last_body_request(&self) -> Option<(u64, Vec<crate::crypto::H256>)> {
        self.find_last(|m| match m {
            ExtensionMessage::BlockSync(BlockSyncMessage::Request(
                request_id,
                RequestMessage::Bodies(hashes),
            )) => Some((*request_id, hashes.clone())),
            _ => None,
        })
    }

    /// Transactions of the most recent transaction sync message.
    pub fn last_transaction_sync(&self) -> Option<Vec<Vec<u8>>> {
        self.find_last(|m| match m {
            ExtensionMessage::TransactionSync(message) => Some(message.transactions().to_vec()),
            _ => None,
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ExtensionMessage>> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests;
