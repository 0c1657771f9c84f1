//! Structural graph construction.
//!
//! Turns resolved dependencies into bidirectional previous/next edges and
//! computes the entry (seed) and terminal (end) nodes. Carries no
//! execution-order logic.

use std::collections::HashSet;

use super::node::Node;

/// Construct bidirectional branches between the given nodes.
///
/// For every node, every resolved dependency target joins the node's
/// previous collection and the node joins the target's next collection.
/// Edges are added idempotently: a pair related through both an explicit
/// dependency and an inferred property reference still shares a single edge.
pub(crate) fn construct_branches(nodes: &mut [Node], resolved: &[Vec<usize>]) {
    for index in 0..nodes.len() {
        for &target in &resolved[index] {
            if nodes[index].previous.contains(&target) {
                continue;
            }

            nodes[index].previous.push(target);
            nodes[target].next.push(index);
        }
    }
}

/// Fetch the nodes with no predecessors, the valid concurrent entry points
pub(crate) fn fetch_starting(nodes: &[Node]) -> Vec<usize> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.previous.is_empty())
        .map(|(index, _)| index)
        .collect()
}

/// Walk the graph forward from the given seeds, invoking the visitor once per
/// reachable node and returning the reachable nodes with no successors
pub(crate) fn walk<F>(nodes: &[Node], seeds: &[usize], mut visit: F) -> Vec<usize>
where
    F: FnMut(&Node),
{
    let mut ends = Vec::new();
    let mut visited = HashSet::with_capacity(nodes.len());
    let mut pending: Vec<usize> = seeds.to_vec();

    while let Some(index) = pending.pop() {
        if !visited.insert(index) {
            continue;
        }

        let node = &nodes[index];
        visit(node);

        if node.next.is_empty() {
            ends.push(index);
        }

        pending.extend(&node.next);
    }

    ends
}
