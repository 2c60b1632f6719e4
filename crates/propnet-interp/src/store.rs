//! The [`PortGraphStore`] trait and its in-memory backend.
//!
//! A store holds many port graphs keyed by [`GraphId`]. The interpreter
//! mutates graphs in place, so the trait hands out mutable borrows rather
//! than copies.

use indexmap::IndexMap;

use crate::graph::PortGraph;
use crate::interpreter::RuntimeError;
use crate::records::GraphId;

/// Storage contract for port graphs.
pub trait PortGraphStore {
    /// Stores `graph` under `id`, replacing any previous graph.
    fn save_graph(&mut self, id: GraphId, graph: PortGraph) -> Result<(), RuntimeError>;

    /// Returns a copy of a stored graph.
    fn load_graph(&self, id: &GraphId) -> Result<PortGraph, RuntimeError>;

    fn graph(&self, id: &GraphId) -> Result<&PortGraph, RuntimeError>;

    fn graph_mut(&mut self, id: &GraphId) -> Result<&mut PortGraph, RuntimeError>;

    fn delete_graph(&mut self, id: &GraphId) -> Result<PortGraph, RuntimeError>;

    fn list_graphs(&self) -> Vec<GraphId>;
}

/// Keeps every graph in memory. Used by tests and by the CLI.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    graphs: IndexMap<GraphId, PortGraph>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PortGraphStore for InMemoryGraphStore {
    fn save_graph(&mut self, id: GraphId, graph: PortGraph) -> Result<(), RuntimeError> {
        self.graphs.insert(id, graph);
        Ok(())
    }

    fn load_graph(&self, id: &GraphId) -> Result<PortGraph, RuntimeError> {
        self.graph(id).cloned()
    }

    fn graph(&self, id: &GraphId) -> Result<&PortGraph, RuntimeError> {
        self.graphs
            .get(id)
            .ok_or_else(|| RuntimeError::GraphNotFound { graph: id.clone() })
    }

    fn graph_mut(&mut self, id: &GraphId) -> Result<&mut PortGraph, RuntimeError> {
        self.graphs
            .get_mut(id)
            .ok_or_else(|| RuntimeError::GraphNotFound { graph: id.clone() })
    }

    fn delete_graph(&mut self, id: &GraphId) -> Result<PortGraph, RuntimeError> {
        self.graphs
            .shift_remove(id)
            .ok_or_else(|| RuntimeError::GraphNotFound { graph: id.clone() })
    }

    fn list_graphs(&self) -> Vec<GraphId> {
        self.graphs.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{PortDirection, PortRecord};

    #[test]
    fn save_load_delete() {
        let mut store = InMemoryGraphStore::new();
        let mut graph = PortGraph::new();
        graph.add_port(PortRecord::free("x", PortDirection::Output)).unwrap();
        store.save_graph("g".into(), graph).unwrap();

        assert_eq!(store.list_graphs(), vec![GraphId::new("g")]);
        assert_eq!(store.load_graph(&"g".into()).unwrap().port_count(), 1);

        store.delete_graph(&"g".into()).unwrap();
        assert!(store.list_graphs().is_empty());
    }

    #[test]
    fn missing_graph_is_reported() {
        let mut store = InMemoryGraphStore::new();
        assert_eq!(
            store.graph_mut(&"nope".into()).unwrap_err(),
            RuntimeError::GraphNotFound {
                graph: GraphId::new("nope")
            }
        );
    }
}
