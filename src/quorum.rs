use std::collections::BTreeSet;

use crate::types::NodeId;

/// Smallest number of distinct nodes forming a majority of `total_nodes`.
pub const fn quorum_size(total_nodes: usize) -> usize {
    total_nodes / 2 + 1
}

/// Returns true if `tally` holds a majority of a cluster of `total_nodes` nodes.
///
/// Call it right after every insertion into a tally, a transition missed here is never retried.
pub fn is_quorum(tally: &BTreeSet<NodeId>, total_nodes: usize) -> bool {
    tally.len() >= quorum_size(total_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(ids: &[u64]) -> BTreeSet<NodeId> {
        ids.iter().copied().map(NodeId).collect()
    }

    #[test]
    fn single_node_is_its_own_majority() {
        assert_eq!(quorum_size(1), 1);
        assert!(!is_quorum(&tally(&[]), 1));
        assert!(is_quorum(&tally(&[0]), 1));
    }

    #[test]
    fn two_nodes_need_both() {
        assert_eq!(quorum_size(2), 2);
        assert!(!is_quorum(&tally(&[1]), 2));
        assert!(is_quorum(&tally(&[0, 1]), 2));
    }

    #[test]
    fn three_nodes_need_two() {
        assert_eq!(quorum_size(3), 2);
        assert!(!is_quorum(&tally(&[2]), 3));
        assert!(is_quorum(&tally(&[0, 2]), 3));
        assert!(is_quorum(&tally(&[0, 1, 2]), 3));
    }

    #[test]
    fn even_clusters_need_strictly_more_than_half() {
        assert_eq!(quorum_size(4), 3);
        assert!(!is_quorum(&tally(&[0, 1]), 4));
        assert!(is_quorum(&tally(&[0, 1, 3]), 4));
    }

    #[test]
    fn majority_iff_more_than_half() {
        for total in 1..=9usize {
            for votes in 0..=total {
                let ids: Vec<u64> = (0..votes as u64).collect();
                assert_eq!(is_quorum(&tally(&ids), total), votes * 2 > total, "{votes}/{total}");
            }
        }
    }

    #[test]
    fn identifiers_do_not_need_to_be_dense() {
        let sparse = tally(&[17, 4_000_000_001, 0xdead_beef]);
        assert!(is_quorum(&sparse, 5));
        assert!(!is_quorum(&sparse, 6));
    }
}
