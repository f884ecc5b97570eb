//! Byzantine Behavior Injector
//!
//! Makes the simulated peer equivocate on behalf of a validator whose secret
//! it holds:
//!
//! - **Double vote**: for every vote the validator casts at the armed step,
//!   send a second, validly signed vote at the same height/view/step for the
//!   zero hash. When the node reports a step state at that step, ask it for
//!   the votes it knows about after a short delay so it sees both.
//! - **Double proposal**: for every block the validator proposes, send a
//!   second, validly signed proposal for the same block with its timestamp
//!   bumped by one. When the node reports a Propose step state, ask it for
//!   the proposal after the delay.
//!
//! Each behavior runs as a task holding two event subscriptions. Stopping
//! aborts the task, which drops the subscriptions.

use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::crypto::H256;
use crate::events::{EventBus, EventKind, Subscription};
use crate::identity::Identity;
use crate::peer::Outbound;
use crate::protocol::{
    proposal_vote_on, Block, ConsensusVote, ExtensionMessage, ProposalBlock, ProtocolError, Step,
    TendermintMessage, VoteOn,
};

/// Forge a conflicting vote for the first vote at `step` signed by `identity`.
///
/// The forged vote targets the zero hash at the same vote step and keeps the
/// signer index. Votes already for the zero hash are skipped.
pub fn forge_vote(identity: &Identity, step: Step, votes: &[ConsensusVote]) -> Option<ConsensusVote> {
    let public_key = identity.public_key();
    let original = votes.iter().find(|vote| {
        vote.vote_step().step == step
            && vote.block_hash() != Some(H256::zero())
            && vote.is_signed_by(&public_key)
    })?;

    let on = VoteOn::new(original.vote_step(), Some(H256::zero()));
    Some(ConsensusVote::new(
        on,
        identity.sign(&on.digest()),
        original.signer_index,
    ))
}

/// Forge a conflicting proposal if `proposal` was signed by `identity`.
///
/// The forged proposal carries the same block with its timestamp plus one,
/// at the same view with the same priority info.
pub fn forge_proposal(
    identity: &Identity,
    proposal: &ProposalBlock,
) -> Result<Option<ProposalBlock>, ProtocolError> {
    let block = proposal.block()?;
    let original = proposal_vote_on(&block, proposal.view);
    if !identity.signed(&proposal.signature, &original.digest()) {
        return Ok(None);
    }

    let header = block
        .header
        .with_timestamp(block.header.timestamp.wrapping_add(1));
    let forged_block = Block::new(header, block.transactions);
    let on = proposal_vote_on(&forged_block, proposal.view);
    let forged = ProposalBlock::new(
        identity.sign(&on.digest()),
        proposal.priority_info.clone(),
        proposal.view,
        &forged_block,
    )?;
    Ok(Some(forged))
}

/// Arms and disarms the two equivocation behaviors for one peer.
#[derive(Debug)]
pub struct Injector {
    request_delay: Duration,
    double_vote: Option<JoinHandle<()>>,
    double_proposal: Option<JoinHandle<()>>,
}

impl Injector {
    pub fn new(request_delay: Duration) -> Self {
        Self {
            request_delay,
            double_vote: None,
            double_proposal: None,
        }
    }

    pub fn is_double_voting(&self) -> bool {
        self.double_vote.is_some()
    }

    pub fn is_double_proposing(&self) -> bool {
        self.double_proposal.is_some()
    }

    /// Start double voting at `step`, replacing any previous arming.
    pub async fn start_double_vote(
        &mut self,
        identity: Identity,
        step: Step,
        outbound: Outbound,
        bus: &EventBus,
    ) {
        self.stop_double_vote().await;
        let votes = bus.subscribe(EventKind::ConsensusMessage);
        let states = bus.subscribe(EventKind::StepState);
        let delay = self.request_delay;
        info!(%step, "Double vote armed");
        self.double_vote = Some(tokio::spawn(run_double_vote(
            identity, step, outbound, votes, states, delay,
        )));
    }

    /// Stop double voting. Idempotent.
    pub async fn stop_double_vote(&mut self) {
        if let Some(task) = self.double_vote.take() {
            task.abort();
            let _ = task.await; // Ignore JoinError from abort
            info!("Double vote disarmed");
        }
    }

    /// Start double proposing, replacing any previous arming.
    pub async fn start_double_proposal(
        &mut self,
        identity: Identity,
        outbound: Outbound,
        bus: &EventBus,
    ) {
        self.stop_double_proposal().await;
        let proposals = bus.subscribe(EventKind::ProposalBlock);
        let states = bus.subscribe(EventKind::StepState);
        let delay = self.request_delay;
        info!("Double proposal armed");
        self.double_proposal = Some(tokio::spawn(run_double_proposal(
            identity, outbound, proposals, states, delay,
        )));
    }

    /// Stop double proposing. Idempotent.
    pub async fn stop_double_proposal(&mut self) {
        if let Some(task) = self.double_proposal.take() {
            task.abort();
            let _ = task.await; // Ignore JoinError from abort
            info!("Double proposal disarmed");
        }
    }

    /// Stop both behaviors.
    pub async fn stop_all(&mut self) {
        self.stop_double_vote().await;
        self.stop_double_proposal().await;
    }
}

impl Drop for Injector {
    fn drop(&mut self) {
        for task in [self.double_vote.take(), self.double_proposal.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

async fn send_logged(outbound: &Outbound, message: TendermintMessage, what: &'static str) {
    let message = ExtensionMessage::from(message);
    if let Err(e) = outbound.send_message(&message).await {
        warn!(error = %e, what, "Injector send failed");
    }
}

async fn run_double_vote(
    identity: Identity,
    step: Step,
    outbound: Outbound,
    mut votes: Subscription,
    mut states: Subscription,
    delay: Duration,
) {
    let mut requests = JoinSet::new();
    loop {
        tokio::select! {
            Some(message) = votes.recv() => {
                let ExtensionMessage::Tendermint(TendermintMessage::ConsensusMessage(received)) = message else {
                    continue;
                };
                let Some(forged) = forge_vote(&identity, step, &received) else {
                    continue;
                };
                info!(
                    vote_step = %forged.vote_step(),
                    signer_index = forged.signer_index,
                    "Sending double vote"
                );
                send_logged(&outbound, TendermintMessage::ConsensusMessage(vec![forged]), "double vote").await;
            }
            Some(message) = states.recv() => {
                let ExtensionMessage::Tendermint(TendermintMessage::StepState { vote_step, known_votes, .. }) = message else {
                    continue;
                };
                if vote_step.step != step {
                    continue;
                }
                debug!(%vote_step, "Scheduling vote request");
                let outbound = outbound.clone();
                requests.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let request = TendermintMessage::RequestMessage {
                        vote_step,
                        requested_votes: known_votes,
                    };
                    send_logged(&outbound, request, "vote request").await;
                });
            }
            Some(_) = requests.join_next(), if !requests.is_empty() => {}
            else => break,
        }
    }
}

async fn run_double_proposal(
    identity: Identity,
    outbound: Outbound,
    mut proposals: Subscription,
    mut states: Subscription,
    delay: Duration,
) {
    let mut requests = JoinSet::new();
    loop {
        tokio::select! {
            Some(message) = proposals.recv() => {
                let ExtensionMessage::Tendermint(TendermintMessage::ProposalBlock(proposal)) = message else {
                    continue;
                };
                match forge_proposal(&identity, &proposal) {
                    Ok(Some(forged)) => {
                        info!(view = forged.view, "Sending double proposal");
                        send_logged(&outbound, TendermintMessage::ProposalBlock(forged), "double proposal").await;
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Ignoring undecodable proposal"),
                }
            }
            Some(message) = states.recv() => {
                let ExtensionMessage::Tendermint(TendermintMessage::StepState { vote_step, .. }) = message else {
                    continue;
                };
                if vote_step.step != Step::Propose {
                    continue;
                }
                debug!(%vote_step, "Scheduling proposal request");
                let outbound = outbound.clone();
                requests.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let request = TendermintMessage::RequestProposal {
                        height: vote_step.height,
                        view: vote_step.view,
                    };
                    send_logged(&outbound, request, "proposal request").await;
                });
            }
            Some(_) = requests.join_next(), if !requests.is_empty() => {}
            else => break,
        }
    }
}

#[cfg(test)]
mod tests;
