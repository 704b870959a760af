use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rand::{thread_rng, Rng};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::NodeConfig;
use crate::messages::{Envelope, MessageKind};
use crate::node_state::{NodeState, NodeStatus, Phase};
use crate::quorum::is_quorum;
use crate::transport::{Mailbox, Transport};
use crate::types::{NodeId, Origin, Payload, Proposal, Round};

/// What a node did with an envelope it could make sense of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Applied,
    /// refers to a round or phase this node has moved past, dropped without side effects
    Stale,
}

/// Envelopes a node refuses to interpret. Never fatal, the node carries on with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ignored {
    #[error("{0} is not a member of the cluster")]
    UnknownSender(NodeId),
    #[error("{0:?} without a value")]
    MissingValue(MessageKind),
    #[error("{0:?} cannot come from outside the cluster")]
    ExternalOrigin(MessageKind),
    #[error("monitor event sent by {0}")]
    ForeignMonitor(NodeId),
    #[error("{0:?} addressed to self")]
    FromSelf(MessageKind),
}

/// A cluster member, acting as proposer, acceptor and learner.
pub struct Node<V, T> {
    id: NodeId,
    peers: Arc<BTreeSet<NodeId>>,
    state: NodeState<V>,
    transport: T,
    config: NodeConfig,
    election_timeout: Duration,
}

impl<V, T> Node<V, T>
where
    V: Payload,
    T: Transport<V>,
{
    /// `peers` lists every member of the cluster, this node included.
    pub fn new(id: NodeId, peers: Arc<BTreeSet<NodeId>>, transport: T, config: NodeConfig) -> Self {
        debug_assert!(peers.contains(&id), "{id} is missing from its own peer set");
        let election_timeout = roll_election_timeout(&config);
        Self {
            id,
            peers,
            state: NodeState::new(Instant::now()),
            transport,
            config,
            election_timeout,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> &NodeState<V> {
        &self.state
    }

    pub fn status(&self) -> NodeStatus<V> {
        self.state.status(self.id)
    }

    pub fn election_timeout(&self) -> Duration {
        self.election_timeout
    }

    fn total_nodes(&self) -> usize {
        self.peers.len()
    }

    /// Runs the node until `shutdown` fires or its sender is dropped, then hands back the final state.
    pub async fn run(
        mut self,
        mut mailbox: Mailbox<V>,
        mut shutdown: oneshot::Receiver<()>,
        status: watch::Sender<NodeStatus<V>>,
    ) -> NodeState<V> {
        let mut heartbeat = interval(self.config.heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        status.send_replace(self.status());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("shutting down");
                    break;
                }
                envelope = mailbox.recv() => {
                    let Some(envelope) = envelope else {
                        tracing::debug!("mailbox closed");
                        break;
                    };
                    if let Err(ignored) = self.dispatch(envelope) {
                        tracing::debug!(%ignored, "ignored message");
                    }
                }
                _ = heartbeat.tick(), if self.state.phase == Phase::Leader => {
                    self.emit_heartbeat();
                }
            }

            status.send_if_modified(|published| {
                let current = self.state.status(self.id);
                if *published == current {
                    false
                } else {
                    *published = current;
                    true
                }
            });
        }

        self.state
    }

    /// Single entry point for every envelope that reaches this node.
    pub fn dispatch(&mut self, envelope: Envelope<V>) -> Result<Handled, Ignored> {
        tracing::trace!(message = ?envelope);

        let sender = match envelope.sender() {
            Origin::External if envelope.is_client_value() => {
                let Some(Proposal::Value(value)) = envelope.into_value() else {
                    return Err(Ignored::MissingValue(MessageKind::Prepare));
                };
                return Ok(self.handle_client_value(value));
            }
            Origin::External => return Err(Ignored::ExternalOrigin(envelope.kind())),
            Origin::Node(sender) => sender,
        };

        if !self.peers.contains(&sender) {
            return Err(Ignored::UnknownSender(sender));
        }

        let kind = envelope.kind();
        let round = envelope.round();
        match kind {
            MessageKind::MonitorLeader if sender == self.id => Ok(self.monitor_leader()),
            MessageKind::MonitorLeader => Err(Ignored::ForeignMonitor(sender)),
            _ if sender == self.id => Err(Ignored::FromSelf(kind)),
            MessageKind::Prepare => Ok(self.handle_prepare(sender, round)),
            MessageKind::Promise => Ok(self.handle_promise(sender, round)),
            MessageKind::HeartBeat => Ok(self.handle_heartbeat(sender, round)),
            MessageKind::Accept => {
                let value = envelope.into_value().ok_or(Ignored::MissingValue(kind))?;
                Ok(self.handle_accept(sender, round, value))
            }
            MessageKind::Accepted => {
                let value = envelope.into_value().ok_or(Ignored::MissingValue(kind))?;
                Ok(self.handle_accepted(sender, round, value))
            }
            MessageKind::Chosen => {
                let value = envelope.into_value().ok_or(Ignored::MissingValue(kind))?;
                Ok(self.handle_chosen(sender, round, value))
            }
        }
    }

    /// Starts a fresh round with this node as proposer.
    ///
    /// Stale if no round above the current one is left, the node then stays where it is.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn start_election(&mut self) -> Handled {
        let Some(round) = self.state.current_round.next() else {
            tracing::warn!("no round left after {}, not starting an election", self.state.current_round);
            return Handled::Stale;
        };
        self.state.adopt_round(round);

        let proposal = match &self.state.client_value {
            Some(value) => Proposal::Value(value.clone()),
            None => Proposal::LeaderBid(self.id),
        };
        self.state.proposed_value = Some(proposal);
        self.state.leader_id = None;
        self.state.phase = Phase::Electing;
        self.state.last_heartbeat = Instant::now();
        self.election_timeout = roll_election_timeout(&self.config);

        // our own acceptor promises right away
        self.state.tally.clear();
        self.state.tally.insert(self.id);

        tracing::info!("starting election for {round}");
        self.broadcast(Envelope::prepare(round, self.id));

        if is_quorum(&self.state.tally, self.total_nodes()) {
            self.send_accept();
        }
        Handled::Applied
    }

    fn handle_client_value(&mut self, value: V) -> Handled {
        tracing::info!("received a client value");
        self.state.client_value = Some(value);
        self.start_election()
    }

    fn handle_prepare(&mut self, sender: NodeId, round: Round) -> Handled {
        if round <= self.state.current_round {
            tracing::trace!(
                "prepare {} <= current {} from {}: ignoring",
                round,
                self.state.current_round,
                sender
            );
            return Handled::Stale;
        }

        self.state.adopt_round(round);
        self.state.step_down(self.id);
        // a live proposer counts as a sign of life, no need to compete with it right away
        self.state.last_heartbeat = Instant::now();

        tracing::debug!("promising {round} to {sender}");
        self.unicast(sender, Envelope::promise(round, self.id));
        Handled::Applied
    }

    fn handle_promise(&mut self, sender: NodeId, round: Round) -> Handled {
        if self.state.phase != Phase::Electing || round != self.state.current_round {
            tracing::trace!("promise for {} from {}: not electing in it", round, sender);
            return Handled::Stale;
        }

        self.state.tally.insert(sender);
        if is_quorum(&self.state.tally, self.total_nodes()) {
            tracing::debug!("transition: Electing → Proposing");
            self.send_accept();
        }
        Handled::Applied
    }

    /// Asks every acceptor to accept the proposal of the current round.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn send_accept(&mut self) {
        let Some(value) = self.state.proposed_value.clone() else {
            tracing::warn!("nothing to propose in {}", self.state.current_round);
            return;
        };
        let round = self.state.current_round;

        self.state.phase = Phase::Proposing;
        self.state.tally.clear();
        // accepting our own proposal: we promised this round to ourselves
        self.state.tally.insert(self.id);

        self.broadcast(Envelope::accept(round, value, self.id));

        if is_quorum(&self.state.tally, self.total_nodes()) {
            self.become_leader();
        }
    }

    fn handle_accept(&mut self, sender: NodeId, round: Round, value: Proposal<V>) -> Handled {
        if round != self.state.current_round {
            tracing::trace!(
                "accept {} != current {} from {}: ignoring",
                round,
                self.state.current_round,
                sender
            );
            return Handled::Stale;
        }

        if self.state.phase != Phase::Idle {
            self.state.step_down(self.id);
        }
        self.state.proposed_value = Some(value.clone());
        self.state.last_heartbeat = Instant::now();

        tracing::debug!("accepting the proposal of {sender} for {round}");
        self.unicast(sender, Envelope::accepted(round, value, self.id));
        Handled::Applied
    }

    fn handle_accepted(&mut self, sender: NodeId, round: Round, value: Proposal<V>) -> Handled {
        if self.state.phase != Phase::Proposing || round != self.state.current_round {
            tracing::trace!("accepted for {} from {}: not proposing in it", round, sender);
            return Handled::Stale;
        }
        if self.state.proposed_value.as_ref() != Some(&value) {
            tracing::warn!("{sender} accepted a different value for {round}: ignoring");
            return Handled::Stale;
        }

        self.state.tally.insert(sender);
        if is_quorum(&self.state.tally, self.total_nodes()) {
            self.become_leader();
        }
        Handled::Applied
    }

    fn become_leader(&mut self) {
        let round = self.state.current_round;
        let Some(value) = self.state.proposed_value.clone() else {
            return;
        };

        tracing::debug!("transition: Proposing → Leader");
        tracing::info!("value chosen in {round}, leading the cluster 👑");
        self.state.phase = Phase::Leader;
        self.state.leader_id = Some(self.id);
        self.state.tally.clear();
        self.state.chosen = Some((round, value.clone()));

        self.broadcast(Envelope::chosen(round, value, self.id));
    }

    fn handle_chosen(&mut self, sender: NodeId, round: Round, value: Proposal<V>) -> Handled {
        if round < self.state.current_round {
            tracing::trace!(
                "chosen {} < current {} from {}: ignoring",
                round,
                self.state.current_round,
                sender
            );
            return Handled::Stale;
        }
        if let Some((chosen_round, chosen)) = &self.state.chosen {
            debug_assert!(
                *chosen_round != round || *chosen == value,
                "two different values chosen in {round}"
            );
        }

        self.state.adopt_round(round);
        self.state.step_down(self.id);
        self.state.proposed_value = Some(value.clone());
        self.state.chosen = Some((round, value));
        self.state.leader_id = Some(sender);
        self.state.last_heartbeat = Instant::now();

        tracing::info!("learned the value chosen in {round}, leader is {sender}");
        Handled::Applied
    }

    fn handle_heartbeat(&mut self, sender: NodeId, round: Round) -> Handled {
        if round < self.state.current_round {
            tracing::trace!(
                "heartbeat {} < current {} from {}: ignoring",
                round,
                self.state.current_round,
                sender
            );
            return Handled::Stale;
        }

        if round > self.state.current_round || self.state.phase != Phase::Idle {
            self.state.adopt_round(round);
            self.state.step_down(self.id);
        }
        self.state.leader_id = Some(sender);
        self.state.last_heartbeat = Instant::now();
        Handled::Applied
    }

    /// Called on every liveness monitor tick: starts an election if the leader went quiet.
    pub fn monitor_leader(&mut self) -> Handled {
        if self.state.phase == Phase::Leader {
            return Handled::Applied;
        }

        let silence = self.state.last_heartbeat.elapsed();
        if silence >= self.election_timeout {
            match self.state.leader_id {
                Some(leader) => tracing::warn!("no heartbeat from {leader} for {silence:?}"),
                None => tracing::debug!("no leader after {silence:?}"),
            }
            return self.start_election();
        }
        Handled::Applied
    }

    /// Asserts leadership towards every peer.
    pub fn emit_heartbeat(&mut self) {
        if self.state.phase != Phase::Leader {
            return;
        }
        self.broadcast(Envelope::heartbeat(self.state.current_round, self.id));
    }

    fn unicast(&self, target: NodeId, envelope: Envelope<V>) {
        if let Err(error) = self.transport.unicast(target, envelope) {
            tracing::debug!(%error, "unicast failed");
        }
    }

    fn broadcast(&self, envelope: Envelope<V>) {
        if let Err(error) = self.transport.broadcast(self.id, envelope) {
            tracing::debug!(%error, "broadcast incomplete");
        }
    }
}

fn roll_election_timeout(config: &NodeConfig) -> Duration {
    if config.election_timeout.is_empty() {
        config.election_timeout.start
    } else {
        thread_rng().gen_range(config.election_timeout.clone())
    }
}
