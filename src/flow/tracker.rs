//! Per-pass completion tracking.
//!
//! A tracker records which steps have completed during one directional pass
//! and owns the per-step execution locks guarding against double execution.
//! The forward pass and the compensation pass never share a tracker: "met"
//! state restarts for the reverse walk.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::{Mutex as ExecutionLock, MutexGuard};

/// Concurrency-safe record of completed steps for a single pass
#[derive(Debug)]
pub struct Tracker {
    completed: Mutex<HashSet<usize>>,
    locks: Vec<ExecutionLock<()>>,
}

impl Tracker {
    /// Construct a tracker for a graph with the given number of nodes
    pub fn new(nodes: usize) -> Self {
        Self {
            completed: Mutex::new(HashSet::with_capacity(nodes)),
            locks: (0..nodes).map(|_| ExecutionLock::new(())).collect(),
        }
    }

    /// Record the given node as completed. Idempotent.
    pub fn mark(&self, node: usize) {
        let mut completed = self.completed.lock().unwrap();
        completed.insert(node);
    }

    /// Check whether every given node has completed
    pub fn met(&self, nodes: &[usize]) -> bool {
        let completed = self.completed.lock().unwrap();
        nodes.iter().all(|node| completed.contains(node))
    }

    /// Check whether a single node has completed
    pub fn met_one(&self, node: usize) -> bool {
        let completed = self.completed.lock().unwrap();
        completed.contains(&node)
    }

    /// Acquire the execution lock of the given node, held while the node
    /// checks its completion state and runs its action
    pub async fn lock(&self, node: usize) -> MutexGuard<'_, ()> {
        self.locks[node].lock().await
    }
}
