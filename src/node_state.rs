use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};

use tokio::time::Instant;

use crate::types::{NodeId, Proposal, Round};

/// Where a node stands in the current round.
///
/// The phase is a summary of the rest of [`NodeState`], every node is acceptor and learner
/// whatever its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// not driving any round
    #[default]
    Idle,
    /// proposer waiting for promises
    Electing,
    /// proposer waiting for acceptances
    Proposing,
    /// proposal chosen, sending heartbeats
    Leader,
}

/// State owned by a single node. Only the owning node's handlers mutate it.
pub struct NodeState<V> {
    pub(crate) current_round: Round,
    pub(crate) proposed_value: Option<Proposal<V>>,
    pub(crate) leader_id: Option<NodeId>,
    /// promises in [`Phase::Electing`], acceptances in [`Phase::Proposing`]
    pub(crate) tally: BTreeSet<NodeId>,
    pub(crate) last_heartbeat: Instant,
    pub(crate) phase: Phase,
    /// last value handed to this node by a client, proposed in the next election
    pub(crate) client_value: Option<V>,
    pub(crate) chosen: Option<(Round, Proposal<V>)>,
}

impl<V> NodeState<V> {
    pub fn new(now: Instant) -> Self {
        Self {
            current_round: Round::ZERO,
            proposed_value: None,
            leader_id: None,
            tally: BTreeSet::new(),
            last_heartbeat: now,
            phase: Phase::Idle,
            client_value: None,
            chosen: None,
        }
    }

    pub fn current_round(&self) -> Round {
        self.current_round
    }

    pub fn proposed_value(&self) -> Option<&Proposal<V>> {
        self.proposed_value.as_ref()
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn tally(&self) -> &BTreeSet<NodeId> {
        &self.tally
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn chosen(&self) -> Option<(Round, &Proposal<V>)> {
        self.chosen.as_ref().map(|(round, value)| (*round, value))
    }

    /// Moves to a round seen from a peer. Rounds never go backwards.
    pub(crate) fn adopt_round(&mut self, round: Round) {
        debug_assert!(round >= self.current_round, "{round} < {}", self.current_round);
        self.current_round = self.current_round.max(round);
    }

    /// Drops any proposer or leader role held in a round that has been superseded.
    pub(crate) fn step_down(&mut self, me: NodeId) {
        if self.phase != Phase::Idle {
            tracing::debug!("transition: {:?} → Idle", self.phase);
        }
        self.phase = Phase::Idle;
        self.tally.clear();
        if self.leader_id == Some(me) {
            self.leader_id = None;
        }
    }
}

impl<V: Clone> NodeState<V> {
    pub fn status(&self, id: NodeId) -> NodeStatus<V> {
        NodeStatus {
            id,
            round: self.current_round,
            phase: self.phase,
            leader: self.leader_id,
            proposed_value: self.proposed_value.clone(),
            chosen: self.chosen.clone(),
        }
    }
}

impl<V> Debug for NodeState<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeState")
            .field("current_round", &self.current_round.0)
            .field("phase", &self.phase)
            .field("leader_id", &self.leader_id)
            .field("tally", &self.tally.len())
            .field("proposed_value", &self.proposed_value)
            .field(
                "chosen",
                if self.chosen.is_some() {
                    &"Something"
                } else {
                    &"Nothing"
                },
            )
            .finish_non_exhaustive()
    }
}

/// Read-only snapshot of a node, published after every event it handles.
#[derive(Clone, PartialEq)]
pub struct NodeStatus<V> {
    pub id: NodeId,
    pub round: Round,
    pub phase: Phase,
    pub leader: Option<NodeId>,
    pub proposed_value: Option<Proposal<V>>,
    pub chosen: Option<(Round, Proposal<V>)>,
}

impl<V> NodeStatus<V> {
    pub fn initial(id: NodeId) -> Self {
        Self {
            id,
            round: Round::ZERO,
            phase: Phase::Idle,
            leader: None,
            proposed_value: None,
            chosen: None,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.phase == Phase::Leader
    }
}

impl<V> Debug for NodeStatus<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStatus")
            .field("id", &self.id.0)
            .field("round", &self.round.0)
            .field("phase", &self.phase)
            .field("leader", &self.leader.map(|id| id.0))
            .field("chosen_round", &self.chosen.as_ref().map(|(round, _)| round.0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_idle_in_round_zero() {
        let state = NodeState::<u64>::new(Instant::now());
        assert_eq!(state.current_round(), Round::ZERO);
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.tally().is_empty());
        assert!(state.leader_id().is_none());
        assert!(state.chosen().is_none());
    }

    #[test]
    fn adopting_an_older_round_never_goes_backwards() {
        let mut state = NodeState::<u64>::new(Instant::now());
        state.adopt_round(Round(4));
        assert_eq!(state.current_round(), Round(4));
        state.adopt_round(Round(4));
        assert_eq!(state.current_round(), Round(4));
    }

    #[test]
    fn stepping_down_forgets_own_leadership_only() {
        let me = NodeId(1);
        let mut state = NodeState::<u64>::new(Instant::now());
        state.phase = Phase::Leader;
        state.leader_id = Some(me);
        state.tally.insert(NodeId(0));
        state.step_down(me);
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.tally().is_empty());
        assert_eq!(state.leader_id(), None);

        state.leader_id = Some(NodeId(2));
        state.step_down(me);
        assert_eq!(state.leader_id(), Some(NodeId(2)));
    }

    #[test]
    fn status_mirrors_state() {
        let mut state = NodeState::new(Instant::now());
        state.current_round = Round(3);
        state.leader_id = Some(NodeId(2));
        state.chosen = Some((Round(3), Proposal::Value("v".to_string())));
        let status = state.status(NodeId(0));
        assert_eq!(status.round, Round(3));
        assert_eq!(status.leader, Some(NodeId(2)));
        assert_eq!(status.chosen, Some((Round(3), Proposal::Value("v".to_string()))));
        assert!(!status.is_leader());
    }
}
