//! braid - Micro-service flow orchestrator with compensating rollback
//!
//! Given a statically configured graph of service calls (a "flow"), braid
//! executes them respecting declared and data-inferred dependencies,
//! exchanges values between calls through a shared reference store, and
//! compensates already-completed calls when any step fails.
//!
//! # Architecture
//!
//! - A flow manager is built once from a static definition and reused for
//!   every request; the step graph never changes after construction
//! - Each invocation gets its own reference store and trackers, so
//!   concurrent invocations never share mutable state
//! - Steps execute as independent tokio tasks gated on their predecessors,
//!   giving at-most-once execution under unbounded fan-out/fan-in
//! - On failure the first error wins, forward scheduling halts and a
//!   best-effort compensation sweep walks the graph backward
//!
//! # Modules
//!
//! - `codec`: Translation between wire payloads and store references
//! - `definition`: Static flow definitions and dependency resolution
//! - `flow`: The orchestration engine (Manager, Node, Tracker)
//! - `refs`: The concurrent reference store shared between steps

pub mod codec;
pub mod definition;
pub mod flow;
pub mod refs;

// Re-export main types at crate root for convenience
pub use codec::{Codec, JsonCodec};
pub use definition::{
    ConfigError, Dependent, FlowDefinition, Manifest, PropertyReference, StepDefinition,
};
pub use flow::{Action, Handlers, Manager, Node};
pub use refs::{Reference, Store};
