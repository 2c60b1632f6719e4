//! Port-graph interpreter.
//!
//! Executes a [`PortGraph`](crate::graph::PortGraph) by writing a port value
//! and propagating the consequences until every port has settled.
//!
//! # Architecture
//!
//! - [`Interpreter`] borrows a graph and a
//!   [`PrimitiveRegistry`](crate::primitives::PrimitiveRegistry) and runs one
//!   propagation per [`Interpreter::set_port_value`] call.
//! - [`InterpreterConfig`] switches tracing on and bounds the number of work
//!   steps per call.
//! - [`PropagationReport`] lists the ports a call changed.
//! - [`RuntimeError`] covers missing graph elements, bad wiring and
//!   non-convergence.
//! - [`TraceEntry`] records each changed port when tracing is enabled.
//!
//! # Usage
//!
//! ```ignore
//! let mut interp = Interpreter::new(&mut graph, &registry, InterpreterConfig::default());
//! interp.set_port_value(&"sum.a".into(), json!(5))?;
//! interp.set_port_value(&"sum.b".into(), json!(3))?;
//! assert_eq!(interp.graph().value(&"sum.out".into())?, &json!(8));
//! ```

pub mod error;
pub mod state;
pub mod trace;

pub use error::RuntimeError;
pub use state::{Interpreter, InterpreterConfig, PropagationReport};
pub use trace::{TraceEntry, WriteCause};
