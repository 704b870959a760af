use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use itertools::Itertools;
use rand::seq::IteratorRandom;
use rand::thread_rng;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};

use crate::config::{ClusterConfig, ConfigError};
use crate::messages::Envelope;
use crate::monitor::LivenessMonitor;
use crate::node::Node;
use crate::node_state::{NodeState, NodeStatus};
use crate::transport::{MemoryTransport, TransportError};
use crate::types::{NodeId, Payload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("a cluster needs at least one node")]
    Empty,
    #[error("{0} is not part of the cluster")]
    UnknownNode(NodeId),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct ClusterNode<V> {
    /// dropping it stops the node
    guard: Option<oneshot::Sender<()>>,
    status: watch::Receiver<NodeStatus<V>>,
    handle: JoinHandle<NodeState<V>>,
    /// exits once the node's mailbox closes
    monitor: JoinHandle<()>,
}

/// A set of nodes wired together through a [`MemoryTransport`], each running in its own task.
///
/// Must be created from within a tokio runtime.
pub struct Cluster<V> {
    transport: MemoryTransport<V>,
    nodes: BTreeMap<NodeId, ClusterNode<V>>,
}

impl<V: Payload> Cluster<V> {
    /// Spawns `node_count` nodes with identifiers `0..node_count`.
    pub fn create(node_count: usize, config: ClusterConfig) -> Result<Self, ClusterError> {
        Self::with_ids((0..node_count as u64).map(NodeId), config)
    }

    pub fn with_ids(ids: impl IntoIterator<Item = NodeId>, config: ClusterConfig) -> Result<Self, ClusterError> {
        Self::spawn(ids.into_iter().collect(), config, None)
    }

    /// Like [`Cluster::with_ids`], also copying every delivered envelope to `tap`.
    pub fn with_tap(
        ids: impl IntoIterator<Item = NodeId>,
        config: ClusterConfig,
        tap: mpsc::UnboundedSender<(NodeId, Envelope<V>)>,
    ) -> Result<Self, ClusterError> {
        Self::spawn(ids.into_iter().collect(), config, Some(tap))
    }

    fn spawn(
        ids: BTreeSet<NodeId>,
        config: ClusterConfig,
        tap: Option<mpsc::UnboundedSender<(NodeId, Envelope<V>)>>,
    ) -> Result<Self, ClusterError> {
        if ids.is_empty() {
            return Err(ClusterError::Empty);
        }
        config.node.validate()?;

        let mut builder = MemoryTransport::builder().drop_probability(config.drop_probability);
        if let Some(tap) = tap {
            builder = builder.tap(tap);
        }
        let (transport, mut mailboxes) = builder.build(ids.iter().copied());
        let peers = Arc::new(ids);
        let liveness = LivenessMonitor::new(config.node.monitor_period);

        let mut nodes = BTreeMap::new();
        for &id in peers.iter() {
            let mailbox = mailboxes.remove(&id).ok_or(ClusterError::UnknownNode(id))?;
            let self_sender = transport.mailbox(id).ok_or(ClusterError::UnknownNode(id))?;

            let node = Node::new(id, Arc::clone(&peers), transport.clone(), config.node.clone());
            let (guard, shutdown) = oneshot::channel();
            let (status_tx, status_rx) = watch::channel(NodeStatus::initial(id));

            let handle = tokio::spawn(
                node.run(mailbox, shutdown, status_tx)
                    .instrument(info_span!("node", id = id.0)),
            );
            let monitor = liveness.spawn(id, self_sender);

            nodes.insert(
                id,
                ClusterNode {
                    guard: Some(guard),
                    status: status_rx,
                    handle,
                    monitor,
                },
            );
        }

        tracing::info!("cluster of {} nodes started: {}", nodes.len(), nodes.keys().join(", "));
        Ok(Self { transport, nodes })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hands a client value to one node picked uniformly at random and returns its identifier.
    pub fn inject_client_value(&self, payload: V) -> Result<NodeId, ClusterError> {
        let target = self
            .nodes
            .keys()
            .copied()
            .choose(&mut thread_rng())
            .ok_or(ClusterError::Empty)?;
        self.inject_client_value_at(target, payload)?;
        Ok(target)
    }

    /// Hands a client value to `target`. Clients talk to nodes directly, the value is never lost
    /// by the fabric.
    pub fn inject_client_value_at(&self, target: NodeId, payload: V) -> Result<(), ClusterError> {
        let mailbox = self.transport.mailbox(target).ok_or(ClusterError::UnknownNode(target))?;
        tracing::debug!("client value sent to {target}");
        mailbox
            .send(Envelope::client_value(payload))
            .map_err(|_| TransportError::MailboxClosed(target))?;
        Ok(())
    }

    /// Stops a node as if its process died. Returns false if it was already stopped.
    pub fn crash(&mut self, id: NodeId) -> bool {
        match self.nodes.get_mut(&id).and_then(|node| node.guard.take()) {
            Some(guard) => {
                tracing::info!("crashing {id}");
                drop(guard);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|node| node.guard.is_some())
    }

    /// Latest status published by `id`.
    pub fn status(&self, id: NodeId) -> Option<NodeStatus<V>> {
        self.nodes.get(&id).map(|node| node.status.borrow().clone())
    }

    pub fn watch(&self, id: NodeId) -> Option<watch::Receiver<NodeStatus<V>>> {
        self.nodes.get(&id).map(|node| node.status.clone())
    }

    /// Running node that currently believes it leads, in the highest round if several do.
    pub fn leader(&self) -> Option<NodeId> {
        self.node_ids()
            .filter(|id| self.is_running(*id))
            .filter_map(|id| self.status(id))
            .filter(NodeStatus::is_leader)
            .max_by_key(|status| status.round)
            .map(|status| status.id)
    }

    /// Waits until the status of `id` satisfies `predicate`.
    ///
    /// Returns `None` if the node is unknown or stops first.
    pub async fn wait_for(
        &self,
        id: NodeId,
        mut predicate: impl FnMut(&NodeStatus<V>) -> bool,
    ) -> Option<NodeStatus<V>> {
        let mut status = self.watch(id)?;
        let matching = status.wait_for(|current| predicate(current)).await.ok()?.clone();
        Some(matching)
    }

    /// Stops every node and collects their final states.
    pub async fn shutdown(mut self) -> BTreeMap<NodeId, NodeState<V>> {
        tracing::debug!("dropping node guards");
        for node in self.nodes.values_mut() {
            node.guard.take();
        }

        let mut ids = Vec::with_capacity(self.nodes.len());
        let mut handles = Vec::with_capacity(self.nodes.len());
        let mut monitors = Vec::with_capacity(self.nodes.len());
        for (id, node) in self.nodes {
            ids.push(id);
            handles.push(node.handle);
            monitors.push(node.monitor);
        }

        let mut states = BTreeMap::new();
        for (id, result) in ids.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(state) => {
                    states.insert(id, state);
                }
                Err(error) => tracing::error!(%error, "{id} did not stop cleanly"),
            }
        }

        for result in join_all(monitors).await {
            if let Err(error) = result {
                tracing::error!(%error, "monitor did not stop cleanly");
            }
        }
        states
    }
}
