use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{thread_rng, Rng};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::Envelope;
use crate::types::NodeId;

pub type Mailbox<V> = mpsc::UnboundedReceiver<Envelope<V>>;
pub type MailboxSender<V> = mpsc::UnboundedSender<Envelope<V>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no mailbox registered for {0}")]
    UnknownNode(NodeId),
    #[error("mailbox of {0} is closed")]
    MailboxClosed(NodeId),
    #[error("broadcast from {from} could not reach {targets:?}")]
    Unreachable { from: NodeId, targets: Vec<NodeId> },
}

/// How envelopes leave a node. Delivery is best effort: a successful call only means the
/// envelope was handed over, not that it arrived.
pub trait Transport<V> {
    /// Delivers `envelope` to `target`.
    fn unicast(&self, target: NodeId, envelope: Envelope<V>) -> Result<(), TransportError>;

    /// Delivers `envelope` to every node except `from`.
    fn broadcast(&self, from: NodeId, envelope: Envelope<V>) -> Result<(), TransportError>;
}

/// In-memory delivery fabric: one unbounded mailbox per node.
///
/// Can lose messages at random and copy every handed-over envelope to a tap, which is how
/// tests observe traffic without touching the nodes.
pub struct MemoryTransport<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    mailboxes: BTreeMap<NodeId, MailboxSender<V>>,
    drop_probability: f64,
    tap: Option<mpsc::UnboundedSender<(NodeId, Envelope<V>)>>,
}

impl<V> Clone for MemoryTransport<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> MemoryTransport<V> {
    /// Builds a lossless fabric and returns the receiving end of every mailbox.
    pub fn new(ids: impl IntoIterator<Item = NodeId>) -> (Self, BTreeMap<NodeId, Mailbox<V>>) {
        MemoryTransportBuilder::default().build(ids)
    }

    pub fn builder() -> MemoryTransportBuilder<V> {
        MemoryTransportBuilder::default()
    }

    /// A sender into the mailbox of `id`, bypassing loss and tap. Used for self-addressed events.
    pub fn mailbox(&self, id: NodeId) -> Option<MailboxSender<V>> {
        self.inner.mailboxes.get(&id).cloned()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inner.mailboxes.keys().copied()
    }

    fn deliver(&self, target: NodeId, envelope: Envelope<V>) -> Result<(), TransportError> {
        let mailbox = self
            .inner
            .mailboxes
            .get(&target)
            .ok_or(TransportError::UnknownNode(target))?;

        if self.inner.drop_probability > 0.0 && thread_rng().gen_bool(self.inner.drop_probability) {
            tracing::trace!(dropped = ?envelope, to = %target);
            return Ok(());
        }

        if let Some(tap) = &self.inner.tap {
            // observers going away must not affect delivery
            let _ = tap.send((target, envelope.clone()));
        }

        mailbox
            .send(envelope)
            .map_err(|_| TransportError::MailboxClosed(target))
    }
}

impl<V: Clone> Transport<V> for MemoryTransport<V> {
    fn unicast(&self, target: NodeId, envelope: Envelope<V>) -> Result<(), TransportError> {
        self.deliver(target, envelope)
    }

    fn broadcast(&self, from: NodeId, envelope: Envelope<V>) -> Result<(), TransportError> {
        let mut unreachable = Vec::new();
        for target in self.node_ids().filter(|id| *id != from) {
            if self.deliver(target, envelope.clone()).is_err() {
                unreachable.push(target);
            }
        }

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(TransportError::Unreachable {
                from,
                targets: unreachable,
            })
        }
    }
}

pub struct MemoryTransportBuilder<V> {
    drop_probability: f64,
    tap: Option<mpsc::UnboundedSender<(NodeId, Envelope<V>)>>,
}

impl<V> Default for MemoryTransportBuilder<V> {
    fn default() -> Self {
        Self {
            drop_probability: 0.0,
            tap: None,
        }
    }
}

impl<V: Clone> MemoryTransportBuilder<V> {
    pub fn drop_probability(mut self, drop_probability: f64) -> Self {
        self.drop_probability = drop_probability.clamp(0.0, 1.0);
        self
    }

    /// Every envelope handed to a mailbox is also sent here, paired with its destination.
    pub fn tap(mut self, tap: mpsc::UnboundedSender<(NodeId, Envelope<V>)>) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn build(self, ids: impl IntoIterator<Item = NodeId>) -> (MemoryTransport<V>, BTreeMap<NodeId, Mailbox<V>>) {
        let mut senders = BTreeMap::new();
        let mut receivers = BTreeMap::new();
        for id in ids {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(id, tx);
            receivers.insert(id, rx);
        }

        let transport = MemoryTransport {
            inner: Arc::new(Inner {
                mailboxes: senders,
                drop_probability: self.drop_probability,
                tap: self.tap,
            }),
        };
        (transport, receivers)
    }
}
