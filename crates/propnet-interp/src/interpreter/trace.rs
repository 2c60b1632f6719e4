//! Propagation trace recording.
//!
//! When tracing is enabled via [`InterpreterConfig::trace_enabled`], the
//! interpreter records a [`TraceEntry`] for every port write that changed a
//! value.
//!
//! [`InterpreterConfig::trace_enabled`]: super::InterpreterConfig::trace_enabled

use serde::{Deserialize, Serialize};

use crate::records::{GadgetId, PortId};

/// Why a port was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteCause {
    /// The caller of `set_port_value`.
    External,
    /// Carried along a connection from another port.
    Connection { from: PortId },
    /// Produced by a gadget's primitive.
    Gadget { gadget: GadgetId, primitive: String },
}

/// A single changed port value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Work-stack step at which the write happened, starting at 1.
    pub step: usize,
    pub port: PortId,
    pub previous: serde_json::Value,
    pub value: serde_json::Value,
    pub cause: WriteCause,
}
