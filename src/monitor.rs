use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::Instrument;

use crate::messages::Envelope;
use crate::transport::MailboxSender;
use crate::types::NodeId;

/// Periodically reminds a node to check on its leader.
///
/// Holds no protocol state: every tick it pushes a `MonitorLeader` event into the node's
/// mailbox and the node decides whether the leader has been quiet for too long.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    period: Duration,
}

impl LivenessMonitor {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks until the mailbox of `node` is closed. Returns as soon as it closes, without
    /// waiting for the next tick.
    pub async fn run<V>(self, node: NodeId, mailbox: MailboxSender<V>) {
        let mut ticks = interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick is immediate, skip it
        ticks.tick().await;

        loop {
            tokio::select! {
                _ = mailbox.closed() => break,
                _ = ticks.tick() => {
                    if mailbox.send(Envelope::monitor_leader(node)).is_err() {
                        break;
                    }
                }
            }
        }
        tracing::trace!("mailbox closed, stopping the monitor");
    }

    pub fn spawn<V>(self, node: NodeId, mailbox: MailboxSender<V>) -> JoinHandle<()>
    where
        V: Send + 'static,
    {
        tokio::spawn(
            self.run(node, mailbox)
                .instrument(tracing::info_span!("monitor", id = node.0)),
        )
    }
}
