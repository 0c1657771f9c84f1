//! Flow orchestration engine.
//!
//! A flow is a statically configured DAG of steps. The manager seeds
//! concurrent execution at the entry steps, every step gates on its
//! predecessors through a per-pass tracker, executes its action against the
//! shared reference store and fans out to its successors. When a step fails,
//! the first error is recorded, forward scheduling halts and a best-effort
//! compensation sweep walks the graph backward from its terminal steps.

pub mod branches;
pub mod manager;
pub mod node;
pub mod processes;
pub mod tracker;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::definition::PropertyReference;
use crate::refs::Store;

pub use manager::Manager;
pub use node::Node;
pub use processes::{Processes, WaitGroup};
pub use tracker::Tracker;

/// A transport caller implementation bound to a flow step.
///
/// Implemented by transport-specific callers; the engine has no knowledge of
/// wire formats. The cancellation token is delegated to the implementation and
/// never enforced by the engine itself.
#[async_trait]
pub trait Action: Send + Sync {
    /// Property references read by this action at run time, used to infer
    /// data dependencies between steps at construction time
    fn references(&self) -> &[PropertyReference] {
        &[]
    }

    /// Execute the action against the shared reference store
    async fn call(&self, ctx: CancellationToken, store: &Store) -> Result<()>;
}

/// Forward and compensating actions bound to a step by name when a manager is
/// constructed from a flow definition
#[derive(Default)]
pub struct Handlers {
    /// Forward action
    pub action: Option<Arc<dyn Action>>,

    /// Compensating action invoked during rollback
    pub compensation: Option<Arc<dyn Action>>,
}
