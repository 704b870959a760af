use std::time::Duration;

use oxidized_paxos::logging;
use oxidized_paxos::prelude::*;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::Level;

const N_NODES: usize = 3;

const TIME_TO_CHOOSE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    // Note: guard must remain in scope
    let _guard = match std::env::var("PAXOS_LOG_DIR") {
        Ok(dir) => Some(logging::init_file(dir, "paxos", Level::DEBUG)),
        Err(_) => {
            logging::init_stdout(Level::INFO);
            None
        }
    };

    let cluster = match Cluster::<String>::create(N_NODES, ClusterConfig::default()) {
        Ok(cluster) => cluster,
        Err(error) => {
            tracing::error!(%error, "could not start the cluster");
            return;
        }
    };

    tracing::info!("type a value and press enter to propose it, ctrl-d to stop");
    let mut lines = BufReader::new(stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let value = match line {
            Ok(Some(value)) if value.trim().is_empty() => continue,
            Ok(Some(value)) => value.trim().to_string(),
            Ok(None) => break,
            Err(error) => {
                tracing::error!(%error, "could not read stdin");
                break;
            }
        };

        let target = match cluster.inject_client_value(value.clone()) {
            Ok(target) => target,
            Err(error) => {
                tracing::warn!(%error, "client value not delivered");
                continue;
            }
        };

        let chosen = tokio::time::timeout(
            TIME_TO_CHOOSE,
            cluster.wait_for(target, |status| {
                status
                    .chosen
                    .as_ref()
                    .and_then(|(_, proposal)| proposal.as_value())
                    .is_some_and(|chosen| *chosen == value)
            }),
        )
        .await;

        match chosen {
            Ok(Some(status)) => tracing::info!(
                "\"{}\" chosen in {}, leader is {}",
                value,
                status.round,
                status.leader.map_or("nobody".to_string(), |id| id.to_string())
            ),
            Ok(None) => tracing::warn!("{target} stopped before \"{value}\" was chosen"),
            Err(_) => tracing::warn!("\"{value}\" not chosen after {TIME_TO_CHOOSE:?}, maybe a competing proposal won"),
        }
    }

    let states = cluster.shutdown().await;
    for (id, state) in states {
        tracing::info!("{id}: {state:?}");
    }
}
