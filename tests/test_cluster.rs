#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use oxidized_paxos::prelude::*;

pub type TestNode = Node<String, MemoryTransport<String>>;

/// Nodes driven by hand: nothing runs until the test delivers envelopes, so every interleaving
/// is chosen by the test.
pub struct Pump {
    nodes: BTreeMap<NodeId, TestNode>,
    mailboxes: BTreeMap<NodeId, Mailbox<String>>,
}

impl Pump {
    pub fn new(n_nodes: u64) -> Self {
        let ids: BTreeSet<NodeId> = (0..n_nodes).map(NodeId).collect();
        let peers = Arc::new(ids.clone());
        let (transport, mailboxes) = MemoryTransport::new(ids.iter().copied());
        let nodes = ids
            .iter()
            .map(|id| (*id, Node::new(*id, peers.clone(), transport.clone(), NodeConfig::default())))
            .collect();
        Self { nodes, mailboxes }
    }

    pub fn node(&self, id: u64) -> &TestNode {
        &self.nodes[&NodeId(id)]
    }

    pub fn node_mut(&mut self, id: u64) -> &mut TestNode {
        self.nodes.get_mut(&NodeId(id)).expect("known node")
    }

    /// Removes everything waiting in the mailbox of `id` without handling it.
    pub fn take_pending(&mut self, id: u64) -> Vec<Envelope<String>> {
        let mailbox = self.mailboxes.get_mut(&NodeId(id)).expect("known node");
        let mut pending = Vec::new();
        while let Ok(envelope) = mailbox.try_recv() {
            pending.push(envelope);
        }
        pending
    }

    pub fn deliver(&mut self, id: u64, envelope: Envelope<String>) -> Result<Handled, Ignored> {
        self.node_mut(id).dispatch(envelope)
    }

    /// Delivers pending envelopes round-robin until every mailbox is empty.
    pub fn run_until_quiet(&mut self) -> usize {
        let ids: Vec<u64> = self.nodes.keys().map(|id| id.0).collect();
        let mut delivered = 0;
        loop {
            let mut progressed = false;
            for &id in &ids {
                for envelope in self.take_pending(id) {
                    let _ = self.deliver(id, envelope);
                    delivered += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return delivered;
            }
        }
    }
}

pub fn sender_of(envelope: &Envelope<String>) -> Option<u64> {
    match envelope.sender() {
        Origin::Node(id) => Some(id.0),
        Origin::External => None,
    }
}

pub fn value(value: &str) -> Proposal<String> {
    Proposal::Value(value.to_string())
}

/// Elections are only triggered by the test.
pub fn patient_config() -> ClusterConfig {
    ClusterConfig::default().with_node(
        NodeConfig::default().with_election_timeout(Duration::from_secs(3600)..Duration::from_secs(3601)),
    )
}

pub fn fast_config() -> ClusterConfig {
    ClusterConfig::default().with_node(
        NodeConfig::default()
            .with_election_timeout(Duration::from_millis(150)..Duration::from_millis(300))
            .with_heartbeat_period(Duration::from_millis(50))
            .with_monitor_period(Duration::from_millis(10)),
    )
}

/// Polls the cluster until a running node other than `excluding` leads, or `limit` elapses.
pub async fn wait_for_leader(
    cluster: &Cluster<String>,
    excluding: Option<NodeId>,
    limit: Duration,
) -> Option<NodeId> {
    tokio::time::timeout(limit, async {
        loop {
            if let Some(leader) = cluster.leader().filter(|leader| Some(*leader) != excluding) {
                return leader;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .ok()
}
