//! Port-graph interpreter and join-law checker for propnet.
//!
//! Where `propnet-core` wires live nodes together, this crate keeps the
//! static topology as plain records (gadgets, ports and connections) and runs
//! it with pure primitive functions over port snapshots.
//!
//! # Modules
//!
//! - [`records`]: serializable gadget/port/connection records and their ids
//! - [`graph`]: [`PortGraph`], the petgraph-backed topology with port values
//! - [`primitives`]: gadget and cell primitives plus their registry
//! - [`interpreter`]: propagation over a port graph with a step guard
//! - [`store`]: the [`PortGraphStore`] trait and an in-memory backend
//! - [`engine`]: a store plus primitives, addressed by graph id
//! - [`laws`]: associativity/commutativity/idempotence checks for joins

pub mod engine;
pub mod graph;
pub mod interpreter;
pub mod laws;
pub mod primitives;
pub mod records;
pub mod store;

// Re-export key types for ergonomic use.
pub use engine::Engine;
pub use graph::PortGraph;
pub use interpreter::{
    Interpreter, InterpreterConfig, PropagationReport, RuntimeError, TraceEntry, WriteCause,
};
pub use laws::{
    check_builtin, run_law_checks, Law, LawCheckConfig, LawCheckResult, LawViolation, Verdict,
};
pub use primitives::{Primitive, PrimitiveRegistry, PortValues};
pub use records::{
    ConnectionRecord, GadgetId, GadgetRecord, GraphDocument, GraphId, PortDirection, PortId,
    PortRecord,
};
pub use store::{InMemoryGraphStore, PortGraphStore};
