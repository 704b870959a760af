use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, Origin, Proposal, Round};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Prepare,
    Promise,
    Accept,
    Accepted,
    Chosen,
    HeartBeat,
    /// self-addressed nudge from the liveness monitor
    MonitorLeader,
}

/// One protocol event travelling between nodes.
///
/// Envelopes are built through the constructors below and can only be read afterwards.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<V> {
    kind: MessageKind,
    round: Round,
    value: Option<Proposal<V>>,
    sender: Origin,
}

impl<V> Envelope<V> {
    fn new(kind: MessageKind, round: Round, value: Option<Proposal<V>>, sender: Origin) -> Self {
        Self {
            kind,
            round,
            value,
            sender,
        }
    }

    /// A value submitted by a client. The round is left unassigned, the receiving node stamps it.
    pub fn client_value(value: V) -> Self {
        Self::new(MessageKind::Prepare, Round::ZERO, Some(Proposal::Value(value)), Origin::External)
    }

    pub fn prepare(round: Round, from: NodeId) -> Self {
        Self::new(MessageKind::Prepare, round, None, Origin::Node(from))
    }

    pub fn promise(round: Round, from: NodeId) -> Self {
        Self::new(MessageKind::Promise, round, None, Origin::Node(from))
    }

    pub fn accept(round: Round, value: Proposal<V>, from: NodeId) -> Self {
        Self::new(MessageKind::Accept, round, Some(value), Origin::Node(from))
    }

    pub fn accepted(round: Round, value: Proposal<V>, from: NodeId) -> Self {
        Self::new(MessageKind::Accepted, round, Some(value), Origin::Node(from))
    }

    pub fn chosen(round: Round, value: Proposal<V>, from: NodeId) -> Self {
        Self::new(MessageKind::Chosen, round, Some(value), Origin::Node(from))
    }

    pub fn heartbeat(round: Round, from: NodeId) -> Self {
        Self::new(MessageKind::HeartBeat, round, None, Origin::Node(from))
    }

    pub fn monitor_leader(me: NodeId) -> Self {
        Self::new(MessageKind::MonitorLeader, Round::ZERO, None, Origin::Node(me))
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn sender(&self) -> Origin {
        self.sender
    }

    pub fn value(&self) -> Option<&Proposal<V>> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Proposal<V>> {
        self.value
    }

    pub fn is_client_value(&self) -> bool {
        self.kind == MessageKind::Prepare && self.sender == Origin::External
    }
}

impl<V> Debug for Envelope<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_client_value() {
            f.debug_struct("ClientValue")
        } else {
            f.debug_struct(match self.kind {
                MessageKind::Prepare => "Prepare",
                MessageKind::Promise => "Promise",
                MessageKind::Accept => "Accept",
                MessageKind::Accepted => "Accepted",
                MessageKind::Chosen => "Chosen",
                MessageKind::HeartBeat => "HeartBeat ♥",
                MessageKind::MonitorLeader => "MonitorLeader",
            })
        }
        .field("round", &self.round.0)
        .field("sender", &self.sender)
        .field("value", &self.value)
        .finish()
    }
}
