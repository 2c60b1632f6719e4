//! PortGraph: the in-memory form of a port-graph document.
//!
//! Ports are the nodes of a petgraph `StableGraph` and connections are its
//! edges, so removing a port never invalidates the indices of the others.
//! Gadgets are kept beside the graph, keyed by id. All mutation goes through
//! `PortGraph` methods, which keep the id indices consistent.

use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::interpreter::RuntimeError;
use crate::records::{
    ConnectionRecord, GadgetId, GadgetRecord, GraphDocument, PortDirection, PortId, PortRecord,
};

/// A port graph with id lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct PortGraph {
    ports: StableGraph<PortRecord, ConnectionRecord, Directed, u32>,
    port_index: HashMap<PortId, NodeIndex<u32>>,
    gadgets: IndexMap<GadgetId, GadgetRecord>,
}

impl PortGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from records, validating every reference.
    pub fn from_document(doc: GraphDocument) -> Result<Self, RuntimeError> {
        let mut graph = PortGraph::new();
        for gadget in doc.gadgets {
            graph.add_gadget(gadget)?;
        }
        for port in doc.ports {
            graph.add_port(port)?;
        }
        for connection in doc.connections {
            graph.connect(connection)?;
        }
        Ok(graph)
    }

    /// Flattens back to records: gadgets, ports and connections in
    /// insertion order.
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            gadgets: self.gadgets.values().cloned().collect(),
            ports: self.ports().cloned().collect(),
            connections: self.connections().cloned().collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let doc: GraphDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    pub fn to_json(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    // -----------------------------------------------------------------------
    // Gadgets
    // -----------------------------------------------------------------------

    pub fn add_gadget(&mut self, record: GadgetRecord) -> Result<(), RuntimeError> {
        if self.gadgets.contains_key(&record.name) {
            return Err(RuntimeError::DuplicateGadget {
                gadget: record.name,
            });
        }
        self.gadgets.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn gadget(&self, id: &GadgetId) -> Option<&GadgetRecord> {
        self.gadgets.get(id)
    }

    pub fn gadgets(&self) -> impl Iterator<Item = &GadgetRecord> {
        self.gadgets.values()
    }

    /// Removes a gadget together with all of its ports.
    pub fn remove_gadget(&mut self, id: &GadgetId) -> Result<GadgetRecord, RuntimeError> {
        let record = self
            .gadgets
            .shift_remove(id)
            .ok_or_else(|| RuntimeError::GadgetNotFound { gadget: id.clone() })?;
        let owned: Vec<PortId> = self
            .ports()
            .filter(|p| p.gadget.as_ref() == Some(id))
            .map(|p| p.name.clone())
            .collect();
        for port in owned {
            self.remove_port(&port)?;
        }
        Ok(record)
    }

    /// The gadget's ports in one direction, keyed by port name.
    pub fn gadget_ports(
        &self,
        gadget: &GadgetId,
        direction: PortDirection,
    ) -> IndexMap<String, &PortRecord> {
        self.ports()
            .filter(|p| p.gadget.as_ref() == Some(gadget) && p.direction == direction)
            .map(|p| (p.port_name.clone(), p))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Ports
    // -----------------------------------------------------------------------

    pub fn add_port(&mut self, record: PortRecord) -> Result<(), RuntimeError> {
        if self.port_index.contains_key(&record.name) {
            return Err(RuntimeError::DuplicatePort { port: record.name });
        }
        if let Some(gadget) = &record.gadget {
            if !self.gadgets.contains_key(gadget) {
                return Err(RuntimeError::GadgetNotFound {
                    gadget: gadget.clone(),
                });
            }
            let clash = self.ports().any(|p| {
                p.gadget.as_ref() == Some(gadget)
                    && p.direction == record.direction
                    && p.port_name == record.port_name
            });
            if clash {
                return Err(RuntimeError::DuplicatePort { port: record.name });
            }
        }
        let name = record.name.clone();
        let idx = self.ports.add_node(record);
        self.port_index.insert(name, idx);
        Ok(())
    }

    /// Removes a port and every connection touching it.
    pub fn remove_port(&mut self, id: &PortId) -> Result<PortRecord, RuntimeError> {
        let idx = self.index(id)?;
        self.port_index.remove(id);
        self.ports
            .remove_node(idx)
            .ok_or_else(|| RuntimeError::PortNotFound { port: id.clone() })
    }

    pub fn port(&self, id: &PortId) -> Option<&PortRecord> {
        self.port_index.get(id).and_then(|idx| self.ports.node_weight(*idx))
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.node_weights()
    }

    pub fn port_count(&self) -> usize {
        self.ports.node_count()
    }

    /// Current value of a port.
    pub fn value(&self, id: &PortId) -> Result<&serde_json::Value, RuntimeError> {
        self.port(id)
            .map(|p| &p.current_value)
            .ok_or_else(|| RuntimeError::PortNotFound { port: id.clone() })
    }

    /// Overwrites a port's value without propagating. Returns the previous
    /// value.
    pub fn write_value(
        &mut self,
        id: &PortId,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, RuntimeError> {
        let idx = self.index(id)?;
        let port = self
            .ports
            .node_weight_mut(idx)
            .ok_or_else(|| RuntimeError::PortNotFound { port: id.clone() })?;
        Ok(std::mem::replace(&mut port.current_value, value))
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Adds a connection. The source may not be a gadget input and the target
    /// may not be a gadget output.
    pub fn connect(&mut self, record: ConnectionRecord) -> Result<(), RuntimeError> {
        let source = self.index(&record.source)?;
        let target = self.index(&record.target)?;
        if source == target {
            return Err(RuntimeError::InvalidConnection {
                reason: format!("port {} cannot feed itself", record.source),
            });
        }
        if let Some(port) = self.ports.node_weight(source) {
            if port.gadget.is_some() && port.direction == PortDirection::Input {
                return Err(RuntimeError::InvalidConnection {
                    reason: format!("source {} is a gadget input", record.source),
                });
            }
        }
        if let Some(port) = self.ports.node_weight(target) {
            if port.gadget.is_some() && port.direction == PortDirection::Output {
                return Err(RuntimeError::InvalidConnection {
                    reason: format!("target {} is a gadget output", record.target),
                });
            }
        }
        if self.connections().any(|c| c.name == record.name) {
            return Err(RuntimeError::InvalidConnection {
                reason: format!("connection {} already exists", record.name),
            });
        }
        self.ports.add_edge(source, target, record);
        Ok(())
    }

    /// Removes a connection by name.
    pub fn disconnect(&mut self, name: &str) -> Option<ConnectionRecord> {
        let edge = self
            .ports
            .edge_indices()
            .find(|e| self.ports.edge_weight(*e).map(|c| c.name.as_str()) == Some(name))?;
        self.ports.remove_edge(edge)
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.ports
            .edge_indices()
            .filter_map(|e| self.ports.edge_weight(e))
    }

    /// Targets of every outgoing connection, in connection order.
    pub fn downstream(&self, id: &PortId) -> Result<Vec<PortId>, RuntimeError> {
        let idx = self.index(id)?;
        let mut edges: Vec<_> = self
            .ports
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.weight().target.clone()))
            .collect();
        edges.sort_by_key(|(edge, _)| edge.index());
        Ok(edges.into_iter().map(|(_, target)| target).collect())
    }

    fn index(&self, id: &PortId) -> Result<NodeIndex<u32>, RuntimeError> {
        self.port_index
            .get(id)
            .copied()
            .ok_or_else(|| RuntimeError::PortNotFound { port: id.clone() })
    }
}

impl TryFrom<GraphDocument> for PortGraph {
    type Error = RuntimeError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        PortGraph::from_document(doc)
    }
}

impl From<PortGraph> for GraphDocument {
    fn from(graph: PortGraph) -> Self {
        graph.to_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adder() -> PortGraph {
        let mut graph = PortGraph::new();
        let sum = GadgetId::new("sum");
        graph
            .add_gadget(GadgetRecord {
                name: sum.clone(),
                kind: "arith".into(),
                primitive_name: "add".into(),
            })
            .unwrap();
        for (name, direction) in [
            ("a", PortDirection::Input),
            ("b", PortDirection::Input),
            ("out", PortDirection::Output),
        ] {
            graph.add_port(PortRecord::owned(&sum, name, direction)).unwrap();
        }
        graph
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut graph = adder();
        let err = graph
            .add_port(PortRecord::owned(&GadgetId::new("sum"), "a", PortDirection::Input))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicatePort { .. }));

        let err = graph
            .add_gadget(GadgetRecord {
                name: GadgetId::new("sum"),
                kind: "arith".into(),
                primitive_name: "add".into(),
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateGadget { .. }));
    }

    #[test]
    fn ports_must_name_known_gadgets() {
        let mut graph = PortGraph::new();
        let err = graph
            .add_port(PortRecord::owned(&GadgetId::new("ghost"), "a", PortDirection::Input))
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::GadgetNotFound {
                gadget: GadgetId::new("ghost")
            }
        );
    }

    #[test]
    fn connection_direction_is_checked() {
        let mut graph = adder();
        graph.add_port(PortRecord::free("x", PortDirection::Output)).unwrap();

        let into_output = ConnectionRecord::between(&"x".into(), &"sum.out".into());
        assert!(matches!(
            graph.connect(into_output),
            Err(RuntimeError::InvalidConnection { .. })
        ));

        let from_input = ConnectionRecord::between(&"sum.a".into(), &"x".into());
        assert!(matches!(
            graph.connect(from_input),
            Err(RuntimeError::InvalidConnection { .. })
        ));

        let ok = ConnectionRecord::between(&"x".into(), &"sum.a".into());
        graph.connect(ok).unwrap();
        assert_eq!(graph.downstream(&"x".into()).unwrap(), vec![PortId::new("sum.a")]);
    }

    #[test]
    fn removing_a_gadget_removes_its_ports_and_edges() {
        let mut graph = adder();
        graph.add_port(PortRecord::free("x", PortDirection::Output)).unwrap();
        graph
            .connect(ConnectionRecord::between(&"x".into(), &"sum.a".into()))
            .unwrap();

        graph.remove_gadget(&GadgetId::new("sum")).unwrap();
        assert_eq!(graph.port_count(), 1);
        assert_eq!(graph.connections().count(), 0);
        assert!(graph.downstream(&"x".into()).unwrap().is_empty());
    }

    #[test]
    fn document_round_trip() {
        let mut graph = adder();
        graph.add_port(PortRecord::free("x", PortDirection::Output)).unwrap();
        graph
            .connect(ConnectionRecord::between(&"x".into(), &"sum.a".into()))
            .unwrap();
        graph.write_value(&"x".into(), json!(4)).unwrap();

        let json = serde_json::to_string(&graph).unwrap();
        let back: PortGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_document(), graph.to_document());
        assert_eq!(back.value(&"x".into()).unwrap(), &json!(4));
    }

    #[test]
    fn invalid_document_fails_to_load() {
        let json = r#"{"ports": [], "connections": [{"name": "c", "source": "a", "target": "b"}]}"#;
        assert!(matches!(
            PortGraph::from_json(json),
            Err(RuntimeError::PortNotFound { .. })
        ));
        assert!(serde_json::from_str::<PortGraph>(json).is_err());
    }
}
