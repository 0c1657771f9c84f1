//! Flow steps and their forward and compensating execution.
//!
//! Nodes live inside an arena owned by the manager and address each other by
//! index, so the bidirectional previous/next edges never form ownership
//! cycles. Each scheduled execution runs as an independent tokio task; fan-in
//! is expected to schedule a node once per incoming edge, and the per-node
//! execution lock together with the tracker guarantees the action still runs
//! at most once per invocation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::definition::PropertyReference;
use crate::refs::Store;

use super::processes::Processes;
use super::tracker::Tracker;
use super::Action;

/// A unit of work pairing a forward action with an optional compensating
/// action, plus its graph edges
pub struct Node {
    /// Step name (unique within the flow)
    pub name: String,

    /// Forward action, invoked against the shared store
    pub action: Option<Arc<dyn Action>>,

    /// Compensating action, invoked during rollback
    pub compensation: Option<Arc<dyn Action>>,

    /// Names of steps that must complete before this one starts
    pub depends_on: Vec<String>,

    /// Property references read at run time, merged from the bound actions
    /// and the flow definition
    pub references: Vec<PropertyReference>,

    pub(crate) previous: Vec<usize>,
    pub(crate) next: Vec<usize>,
}

impl Node {
    /// Construct a new node with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: None,
            compensation: None,
            depends_on: Vec::new(),
            references: Vec::new(),
            previous: Vec::new(),
            next: Vec::new(),
        }
    }

    /// Bind the forward action, merging its property references
    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.merge_references(action.references());
        self.action = Some(action);
        self
    }

    /// Bind the compensating action, merging its property references
    pub fn with_compensation(mut self, action: Arc<dyn Action>) -> Self {
        self.merge_references(action.references());
        self.compensation = Some(action);
        self
    }

    /// Declare an explicit dependency on another step
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Declare a property reference read at run time
    pub fn with_reference(mut self, reference: PropertyReference) -> Self {
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
        self
    }

    fn merge_references(&mut self, references: &[PropertyReference]) {
        for reference in references {
            if !self.references.contains(reference) {
                self.references.push(reference.clone());
            }
        }
    }
}

/// Arena of nodes addressed by stable index
pub(crate) struct Graph {
    pub(crate) nodes: Vec<Node>,
}

impl Graph {
    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Spawn a forward execution of the given node as an independent task.
/// The caller must have accounted for the unit on the process tracker.
pub(crate) fn schedule_forward(
    graph: &Arc<Graph>,
    index: usize,
    ctx: &CancellationToken,
    tracker: &Arc<Tracker>,
    processes: &Arc<Processes>,
    store: &Arc<Store>,
) {
    let graph = graph.clone();
    let ctx = ctx.clone();
    let tracker = tracker.clone();
    let processes = processes.clone();
    let store = store.clone();

    tokio::spawn(async move {
        forward(&graph, index, &ctx, &tracker, &processes, &store).await;
        processes.done();
    });
}

/// Execute the given node and schedule its successors.
///
/// Runs once per incoming edge that reaches this node; early returns cover
/// the cases where a sibling path arrived before every dependency finished or
/// a racing path already executed the node.
async fn forward(
    graph: &Arc<Graph>,
    index: usize,
    ctx: &CancellationToken,
    tracker: &Arc<Tracker>,
    processes: &Arc<Processes>,
    store: &Arc<Store>,
) {
    let node = graph.node(index);

    if !tracker.met(&node.previous) {
        debug!(node = %node.name, "has not met dependencies yet");
        return;
    }

    {
        let _lock = tracker.lock(index).await;

        if tracker.met_one(index) {
            return;
        }

        if let Some(action) = &node.action {
            debug!(node = %node.name, "executing node call");

            if let Err(err) = action.call(ctx.clone(), store).await {
                error!(node = %node.name, error = %err, "node call failed");
                processes.fatal(err);
                return;
            }
        }

        tracker.mark(index);
    }

    if processes.has_err() {
        debug!(node = %node.name, "halting branch, an error has been recorded");
        return;
    }

    processes.add(node.next.len());
    for &next in &node.next {
        schedule_forward(graph, next, ctx, tracker, processes, store);
    }
}

/// Spawn a compensating execution of the given node as an independent task
pub(crate) fn schedule_revert(
    graph: &Arc<Graph>,
    index: usize,
    ctx: &CancellationToken,
    tracker: &Arc<Tracker>,
    processes: &Arc<Processes>,
    store: &Arc<Store>,
) {
    let graph = graph.clone();
    let ctx = ctx.clone();
    let tracker = tracker.clone();
    let processes = processes.clone();
    let store = store.clone();

    tokio::spawn(async move {
        revert(&graph, index, &ctx, &tracker, &processes, &store).await;
        processes.done();
    });
}

/// Compensate the given node and schedule its predecessors.
///
/// Mirrors the forward pass with previous/next swapped. Compensation is
/// best-effort: a failing compensating action is aggregated and the sweep
/// continues, so every reachable node still gets a chance to compensate.
async fn revert(
    graph: &Arc<Graph>,
    index: usize,
    ctx: &CancellationToken,
    tracker: &Arc<Tracker>,
    processes: &Arc<Processes>,
    store: &Arc<Store>,
) {
    let node = graph.node(index);

    if !tracker.met(&node.next) {
        debug!(node = %node.name, "successors have not been compensated yet");
        return;
    }

    {
        let _lock = tracker.lock(index).await;

        if !tracker.met_one(index) {
            if let Some(compensation) = &node.compensation {
                debug!(node = %node.name, "executing node rollback");

                if let Err(err) = compensation.call(ctx.clone(), store).await {
                    warn!(node = %node.name, error = %err, "node rollback failed");
                    processes.report(err);
                }
            }

            tracker.mark(index);
        }
    }

    processes.add(node.previous.len());
    for &previous in &node.previous {
        schedule_revert(graph, previous, ctx, tracker, processes, store);
    }
}
