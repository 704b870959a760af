pub mod cluster;
pub mod config;
pub mod logging;
pub mod messages;
pub mod monitor;
pub mod node;
pub mod node_state;
pub mod quorum;
pub mod transport;
pub mod types;

pub mod prelude {
    pub use crate::cluster::{Cluster, ClusterError};
    pub use crate::config::{ClusterConfig, ConfigError, NodeConfig};
    pub use crate::messages::{Envelope, MessageKind};
    pub use crate::monitor::LivenessMonitor;
    pub use crate::node::{Handled, Ignored, Node};
    pub use crate::node_state::{NodeState, NodeStatus, Phase};
    pub use crate::quorum::{is_quorum, quorum_size};
    pub use crate::transport::{Mailbox, MailboxSender, MemoryTransport, Transport, TransportError};
    pub use crate::types::{NodeId, Origin, Payload, Proposal, Round};
}
