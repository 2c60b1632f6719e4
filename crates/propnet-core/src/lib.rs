//! Propagation networks: lattice cells, named-input functions and the
//! networks that own them.

pub mod cell;
pub mod error;
pub mod function;
pub mod id;
pub mod join;
pub mod library;
pub mod network;
pub mod node;
pub mod propagate;
pub mod snapshot;
pub mod value;

// Re-export commonly used types
pub use cell::Cell;
pub use error::CoreError;
pub use function::{Function, FunctionSpec, InputRecord};
pub use id::NodeId;
pub use join::Join;
pub use network::Network;
pub use node::{Node, NodeRef, TapHandle, DEFAULT_OUTPUT};
pub use propagate::PropagationLimits;
pub use snapshot::{NetworkSnapshot, NodeRecord, NodeRegistry};
pub use value::{HostBox, LatticeValue, ValueKind, ValueSet};
