//! Runtime error types for the port-graph interpreter.
//!
//! Every variant names the graph element it concerns. Missing inputs and
//! unchanged writes are not errors: primitives simply produce nothing.

use serde::{Deserialize, Serialize};

use crate::records::{GadgetId, GraphId, PortId};

/// Errors produced by port-graph construction and interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum RuntimeError {
    #[error("graph not found: {graph}")]
    GraphNotFound { graph: GraphId },

    #[error("port not found: {port}")]
    PortNotFound { port: PortId },

    #[error("gadget not found: {gadget}")]
    GadgetNotFound { gadget: GadgetId },

    #[error("primitive not found: '{primitive}'")]
    PrimitiveNotFound { primitive: String },

    #[error("duplicate port: {port}")]
    DuplicatePort { port: PortId },

    #[error("duplicate gadget: {gadget}")]
    DuplicateGadget { gadget: GadgetId },

    #[error("invalid connection: {reason}")]
    InvalidConnection { reason: String },

    /// The convergence guard tripped. Every port touched by the call has been
    /// rolled back.
    #[error("propagation from port {port} did not converge within {limit} steps ({steps} taken)")]
    NonConvergent {
        port: PortId,
        steps: usize,
        limit: usize,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Serialization {
            message: err.to_string(),
        }
    }
}
