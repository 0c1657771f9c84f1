//! Flow manager: orchestrates one full run of a flow.
//!
//! The manager is built once at startup from a static flow definition and
//! reused for every request. Each invocation gets its own reference store and
//! trackers, so concurrent invocations never share mutable state; the node
//! graph itself is immutable after construction.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::definition::{self, ConfigError, Dependent, FlowDefinition};
use crate::refs::Store;

use super::branches;
use super::node::{self, Graph, Node};
use super::processes::{Processes, WaitGroup};
use super::tracker::Tracker;
use super::Handlers;

/// Adapter giving the dependency resolver a view of a node's declared
/// dependencies merged with the ones inferred from its property references
struct Merged<'a> {
    name: &'a str,
    depends_on: Vec<String>,
}

impl Dependent for Merged<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// Orchestrates the execution and compensation of a single flow
pub struct Manager {
    name: String,
    graph: Arc<Graph>,
    starting: Vec<usize>,
    ends: Vec<usize>,
    references: usize,
    wg: Arc<WaitGroup>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.name)
            .field("starting", &self.starting)
            .field("ends", &self.ends)
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Construct a new manager for the given nodes.
    ///
    /// Dependencies are resolved (declared and inferred from property
    /// references), branches are constructed and the seed and end nodes are
    /// collected along with the reference count used to pre-size stores.
    /// Fails with a [`ConfigError`] on circular or unresolved dependencies;
    /// no manager is produced in that case.
    pub fn new(name: impl Into<String>, mut nodes: Vec<Node>) -> Result<Self, ConfigError> {
        let name = name.into();

        let merged: Vec<Merged> = nodes
            .iter()
            .map(|node| Merged {
                name: &node.name,
                depends_on: merge_dependencies(node, &nodes),
            })
            .collect();

        let resolved = definition::resolve(&name, &merged)?;
        branches::construct_branches(&mut nodes, &resolved);

        let starting = branches::fetch_starting(&nodes);

        let mut references = 0;
        let ends = branches::walk(&nodes, &starting, |node| {
            references += node.references.len();
        });

        Ok(Self {
            name,
            graph: Arc::new(Graph { nodes }),
            starting,
            ends,
            references,
            wg: Arc::new(WaitGroup::new()),
        })
    }

    /// Construct a manager from a flow definition, binding actions to steps
    /// by name
    pub fn from_definition(
        definition: &FlowDefinition,
        handlers: &mut HashMap<String, Handlers>,
    ) -> Result<Self, ConfigError> {
        definition.validate()?;

        let nodes = definition
            .steps
            .iter()
            .map(|step| {
                let mut node = Node::new(&step.name);

                if let Some(bound) = handlers.remove(&step.name) {
                    if let Some(action) = bound.action {
                        node = node.with_action(action);
                    }
                    if let Some(compensation) = bound.compensation {
                        node = node.with_compensation(compensation);
                    }
                }

                for name in &step.depends_on {
                    node = node.with_dependency(name);
                }

                for reference in &step.references {
                    node = node.with_reference(reference.clone());
                }

                node
            })
            .collect();

        Self::new(definition.name.as_str(), nodes)
    }

    /// The name of this flow
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construct a reference store pre-sized for this flow's references
    pub fn new_store(&self) -> Arc<Store> {
        Arc::new(Store::new(self.references))
    }

    /// Execute the flow against the given store.
    ///
    /// All seed nodes are started concurrently and execution fans out through
    /// the graph; the call blocks until every transitively scheduled unit has
    /// finished and returns the first recorded error, if any. On failure a
    /// compensation sweep is launched detached from this call and is
    /// observable through [`Manager::wait`].
    #[instrument(skip_all, fields(flow = %self.name, invocation = %Uuid::new_v4()))]
    pub async fn call(&self, ctx: CancellationToken, store: Arc<Store>) -> Result<()> {
        self.wg.add(1);
        debug!("executing flow");

        let processes = Arc::new(Processes::new(self.starting.len()));
        let tracker = Arc::new(Tracker::new(self.graph.len()));

        for &seed in &self.starting {
            node::schedule_forward(&self.graph, seed, &ctx, &tracker, &processes, &store);
        }

        processes.wait().await;
        debug!("processes completed");

        if let Some(err) = processes.take_err() {
            error!(error = %err, "an error occurred, executing rollback");

            self.wg.add(1);
            let graph = self.graph.clone();
            let ends = self.ends.clone();
            let wg = self.wg.clone();
            tokio::spawn(async move {
                revert(graph, ends, tracker, store).await;
                wg.done();
            });

            self.wg.done();
            return Err(err);
        }

        debug!("flow completed");
        self.wg.done();
        Ok(())
    }

    /// Wait until all calls and detached compensation work have drained
    pub async fn wait(&self) {
        self.wg.wait().await;
    }
}

/// Merge a node's declared dependencies with the steps named by the resources
/// of its property references. A reference to the node's own output and a
/// resource naming no step are both ignored.
fn merge_dependencies(node: &Node, nodes: &[Node]) -> Vec<String> {
    let mut merged = node.depends_on.clone();

    for reference in &node.references {
        let base = reference.resource_base();

        if base == node.name {
            continue;
        }

        if !nodes.iter().any(|other| other.name == base) {
            continue;
        }

        if !merged.iter().any(|name| name == base) {
            merged.push(base.to_string());
        }
    }

    merged
}

/// Compensate the executed nodes found inside the given forward tracker.
///
/// Walks backward from the end nodes with a fresh tracker pre-seeded with
/// every node the forward pass never executed, so work that never ran is
/// never compensated. Failures are aggregated; the sweep always completes.
async fn revert(graph: Arc<Graph>, ends: Vec<usize>, executed: Arc<Tracker>, store: Arc<Store>) {
    let ctx = CancellationToken::new();
    let tracker = Arc::new(Tracker::new(graph.len()));

    for index in 0..graph.len() {
        if !executed.met_one(index) {
            tracker.mark(index);
        }
    }

    let processes = Arc::new(Processes::new(ends.len()));

    for &end in &ends {
        node::schedule_revert(&graph, end, &ctx, &tracker, &processes, &store);
    }

    processes.wait().await;

    let flaws = processes.take_reports();
    if !flaws.is_empty() {
        error!(failures = flaws.len(), "rollback completed with failures");
    } else {
        debug!("rollback completed");
    }
}
