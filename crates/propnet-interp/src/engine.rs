//! Engine: a store of port graphs plus the primitives that run them.

use serde_json::Value;

use crate::graph::PortGraph;
use crate::interpreter::{Interpreter, InterpreterConfig, PropagationReport, RuntimeError};
use crate::primitives::PrimitiveRegistry;
use crate::records::{GraphId, PortId};
use crate::store::{InMemoryGraphStore, PortGraphStore};

pub struct Engine<S: PortGraphStore = InMemoryGraphStore> {
    store: S,
    primitives: PrimitiveRegistry,
    config: InterpreterConfig,
}

impl Engine<InMemoryGraphStore> {
    /// An in-memory engine with the built-in primitives.
    pub fn in_memory(config: InterpreterConfig) -> Self {
        Engine::new(
            InMemoryGraphStore::new(),
            PrimitiveRegistry::with_builtins(),
            config,
        )
    }
}

impl<S: PortGraphStore> Engine<S> {
    pub fn new(store: S, primitives: PrimitiveRegistry, config: InterpreterConfig) -> Self {
        Engine {
            store,
            primitives,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn primitives(&self) -> &PrimitiveRegistry {
        &self.primitives
    }

    pub fn primitives_mut(&mut self) -> &mut PrimitiveRegistry {
        &mut self.primitives
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Adds or replaces a graph.
    pub fn load(&mut self, id: GraphId, graph: PortGraph) -> Result<(), RuntimeError> {
        self.store.save_graph(id, graph)
    }

    /// Writes `value` to a port of a stored graph and propagates.
    pub fn set_port_value(
        &mut self,
        graph: &GraphId,
        port: &PortId,
        value: Value,
    ) -> Result<PropagationReport, RuntimeError> {
        let graph = self.store.graph_mut(graph)?;
        Interpreter::new(graph, &self.primitives, self.config.clone()).set_port_value(port, value)
    }

    pub fn port_value(&self, graph: &GraphId, port: &PortId) -> Result<Value, RuntimeError> {
        Ok(self.store.graph(graph)?.value(port)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ConnectionRecord, PortDirection, PortRecord};
    use serde_json::json;

    #[test]
    fn graphs_are_isolated_by_id() {
        let mut engine = Engine::in_memory(InterpreterConfig::default());
        for id in ["left", "right"] {
            let mut graph = PortGraph::new();
            graph.add_port(PortRecord::free("x", PortDirection::Output)).unwrap();
            graph.add_port(PortRecord::free("y", PortDirection::Input)).unwrap();
            graph
                .connect(ConnectionRecord::between(&"x".into(), &"y".into()))
                .unwrap();
            engine.load(id.into(), graph).unwrap();
        }

        engine
            .set_port_value(&"left".into(), &"x".into(), json!(7))
            .unwrap();
        assert_eq!(engine.port_value(&"left".into(), &"y".into()).unwrap(), json!(7));
        assert_eq!(
            engine.port_value(&"right".into(), &"y".into()).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn unknown_graph_is_an_error() {
        let mut engine = Engine::in_memory(InterpreterConfig::default());
        let err = engine
            .set_port_value(&"missing".into(), &"x".into(), json!(1))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::GraphNotFound { .. }));
    }
}
