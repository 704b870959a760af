use std::ops::Range;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_ELECTION_TIMEOUT: Range<Duration> = Duration::from_millis(200)..Duration::from_millis(350);

pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);

pub const DEFAULT_MONITOR_PERIOD: Duration = Duration::from_millis(50);

/// Timings of a single node. Passed to the node and its liveness monitor when they are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Leader silence tolerated before starting an election, rolled uniformly from this range
    /// on every election so that competing proposers drift apart.
    pub election_timeout: Range<Duration>,
    /// How often a leader asserts itself.
    pub heartbeat_period: Duration,
    /// How often the liveness monitor nudges the node.
    pub monitor_period: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be longer than zero")]
    ZeroPeriod(&'static str),
}

impl NodeConfig {
    /// Timers cannot tick with a zero period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_period.is_zero() {
            return Err(ConfigError::ZeroPeriod("heartbeat period"));
        }
        if self.monitor_period.is_zero() {
            return Err(ConfigError::ZeroPeriod("monitor period"));
        }
        Ok(())
    }

    pub fn with_election_timeout(mut self, election_timeout: Range<Duration>) -> Self {
        self.election_timeout = election_timeout;
        self
    }

    pub fn with_heartbeat_period(mut self, heartbeat_period: Duration) -> Self {
        self.heartbeat_period = heartbeat_period;
        self
    }

    pub fn with_monitor_period(mut self, monitor_period: Duration) -> Self {
        self.monitor_period = monitor_period;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            election_timeout: DEFAULT_ELECTION_TIMEOUT,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            monitor_period: DEFAULT_MONITOR_PERIOD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub node: NodeConfig,
    /// Probability in `[0, 1]` that the in-memory transport silently loses a message.
    pub drop_probability: f64,
}

impl ClusterConfig {
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.node = node;
        self
    }

    pub fn with_drop_probability(mut self, drop_probability: f64) -> Self {
        self.drop_probability = drop_probability.clamp(0.0, 1.0);
        self
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            drop_probability: 0.0,
        }
    }
}
