//! Core error types for propnet-core.
//!
//! Only structural misuse is an error here. Data-level anomalies (an
//! incomparable merge, a function still waiting on inputs) travel through the
//! graph as ordinary [`LatticeValue`](crate::value::LatticeValue)s instead.

use crate::id::NodeId;
use thiserror::Error;

/// Core errors produced by the propnet-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A Function was wired or fed on an input it does not declare.
    #[error("unknown input '{input}' on node {node}")]
    UnknownInput { node: NodeId, input: String },

    /// A value reached a multi-input Function without naming its input.
    #[error("node {node} has several inputs; accept requires an input name")]
    MissingInputName { node: NodeId },

    /// Attempted to box a lattice value inside another lattice value.
    #[error("a lattice value cannot wrap another lattice value")]
    NestedValue,

    /// A node id was not found.
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A snapshot named a node kind the registry does not know.
    #[error("unknown node kind: '{kind}'")]
    UnknownKind { kind: String },

    /// Synchronous propagation recursed past the configured limit.
    #[error("propagation depth limit ({limit}) exceeded at node {node}")]
    PropagationDepthExceeded { node: NodeId, limit: usize },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A snapshot was structurally inconsistent.
    #[error("invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },
}
