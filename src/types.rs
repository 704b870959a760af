use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Anything a client can ask the cluster to agree on.
///
/// The protocol clones and compares payloads but never looks inside them.
pub trait Payload: Clone + PartialEq + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Identifier of a node. Identifiers don't have to be dense or contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "node({})", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Proposal number. A higher round always supersedes a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Round(pub u64);

impl Round {
    /// No round seen yet. Client values travel with this round until a node stamps them.
    pub const ZERO: Self = Self(0);

    /// The round after this one, `None` once the round space is exhausted.
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "round({})", self.0)
    }
}

/// Who put an envelope on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Node(NodeId),
    /// a client outside the cluster
    External,
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Node(id) => Display::fmt(id, f),
            Origin::External => f.write_str("external"),
        }
    }
}

/// The value a proposer tries to get chosen.
///
/// Without a client value a proposer still runs the protocol to become leader,
/// bidding with its own identifier.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proposal<V> {
    Value(V),
    LeaderBid(NodeId),
}

impl<V> Proposal<V> {
    pub fn as_value(&self) -> Option<&V> {
        match self {
            Proposal::Value(value) => Some(value),
            Proposal::LeaderBid(_) => None,
        }
    }
}

impl<V> Debug for Proposal<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Proposal::Value(_) => f.write_str("Value"),
            Proposal::LeaderBid(id) => f.debug_tuple("LeaderBid").field(id).finish(),
        }
    }
}
