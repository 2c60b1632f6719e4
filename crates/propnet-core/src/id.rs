//! Stable node identity.
//!
//! Ids are random v4 UUIDs so that nodes restored from a snapshot keep their
//! original identity without colliding with nodes created afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Allocates a fresh, never-before-seen id.
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn node_id_display_is_the_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(format!("{}", NodeId(uuid)), uuid.to_string());
    }

    #[test]
    fn serde_roundtrip_is_a_bare_string() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
