use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use oxidized_paxos::prelude::*;
use rand::Rng;
use tokio::sync::{oneshot, watch};

const N_PEERS: u64 = 8;
const MESSAGES_PER_PEER: usize = 500;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_peers_only_reach_state_through_the_mailbox() {
    let ids: BTreeSet<NodeId> = (0..=N_PEERS).map(NodeId).collect();
    let (transport, mut mailboxes) = MemoryTransport::<String>::new(ids.iter().copied());
    let me = NodeId(0);
    let node = Node::new(me, Arc::new(ids.clone()), transport.clone(), NodeConfig::default());

    let (guard, shutdown) = oneshot::channel();
    let (status_tx, mut status_rx) = watch::channel(NodeStatus::initial(me));
    let mailbox = mailboxes.remove(&me).unwrap();
    let node_handle = tokio::spawn(node.run(mailbox, shutdown, status_tx));

    // rounds published by the node only ever grow
    let mut probe = status_rx.clone();
    let observer = tokio::spawn(async move {
        let mut last = Round::ZERO;
        while status_rx.changed().await.is_ok() {
            let round = status_rx.borrow_and_update().round;
            assert!(round >= last, "{round} after {last}");
            last = round;
        }
        let round = status_rx.borrow().round;
        assert!(round >= last);
        round
    });

    let mut senders = Vec::new();
    for peer in 1..=N_PEERS {
        let mailbox = transport.mailbox(me).unwrap();
        senders.push(tokio::spawn(async move {
            let mut highest = Round::ZERO;
            for _ in 0..MESSAGES_PER_PEER {
                let round = Round(rand::thread_rng().gen_range(1..10_000));
                highest = highest.max(round);
                let envelope = if rand::thread_rng().gen_bool(0.5) {
                    Envelope::prepare(round, NodeId(peer))
                } else {
                    Envelope::heartbeat(round, NodeId(peer))
                };
                mailbox.send(envelope).unwrap();
                tokio::task::yield_now().await;
            }
            highest
        }));
    }

    let mut highest = Round::ZERO;
    for sender in senders {
        highest = highest.max(sender.await.unwrap());
    }

    // outsiders are ignored, the node keeps going
    transport.mailbox(me).unwrap().send(Envelope::prepare(Round(u64::MAX), NodeId(99))).unwrap();

    let settled = tokio::time::timeout(
        Duration::from_secs(5),
        probe.wait_for(|status| status.round == highest),
    )
    .await
    .is_ok_and(|reached| reached.is_ok());
    assert!(settled, "node never reached {highest}");

    drop(guard);
    let state = node_handle.await.unwrap();
    assert_eq!(state.current_round(), highest);
    assert_eq!(state.phase(), Phase::Idle);

    let last_published = observer.await.unwrap();
    assert_eq!(last_published, highest);
    drop(mailboxes);
}
