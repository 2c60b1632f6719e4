//! Interpreter state and the propagation loop.
//!
//! [`Interpreter::set_port_value`] writes a port and pushes the consequences
//! through the graph depth-first. Recursion is replaced by an explicit work
//! stack: every pending write is a [`Work`] item, and children are pushed in
//! reverse so they pop in connection order. The visiting order is the same
//! as a recursive walk, but graph depth never touches the call stack.
//!
//! A write that leaves a port unchanged stops there. That is what makes
//! propagation terminate for ACI primitives. A cycle of strictly growing
//! values never stops; [`InterpreterConfig::max_steps`] turns that into a
//! [`RuntimeError::NonConvergent`] after rolling every touched port back.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::PortGraph;
use crate::primitives::{PortValues, PrimitiveRegistry};
use crate::records::{GadgetId, PortDirection, PortId};

use super::error::RuntimeError;
use super::trace::{TraceEntry, WriteCause};

/// Configuration for the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Whether to record a trace of every changed port.
    pub trace_enabled: bool,
    /// Upper bound on work-stack steps per `set_port_value` call. `None`
    /// means unbounded, so slow but convergent graphs are never cut short.
    pub max_steps: Option<usize>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            trace_enabled: false,
            max_steps: None,
        }
    }
}

/// A pending port write.
#[derive(Debug, Clone)]
struct Work {
    port: PortId,
    value: Value,
    cause: WriteCause,
}

/// Outcome of one `set_port_value` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagationReport {
    /// Work items processed, including no-op writes.
    pub steps: usize,
    /// Ports whose value changed, in first-change order, with final values.
    pub changed: IndexMap<PortId, Value>,
    /// Present when tracing is enabled.
    pub trace: Option<Vec<TraceEntry>>,
}

impl PropagationReport {
    /// True when the initial write was a no-op.
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Runs propagation over a borrowed graph.
pub struct Interpreter<'g> {
    graph: &'g mut PortGraph,
    primitives: &'g PrimitiveRegistry,
    config: InterpreterConfig,
}

impl<'g> Interpreter<'g> {
    pub fn new(
        graph: &'g mut PortGraph,
        primitives: &'g PrimitiveRegistry,
        config: InterpreterConfig,
    ) -> Self {
        Interpreter {
            graph,
            primitives,
            config,
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn graph(&self) -> &PortGraph {
        &*self.graph
    }

    /// Writes `value` to `port` and propagates until nothing changes.
    ///
    /// Writing a port's current value is a no-op. A write to a gadget input
    /// re-runs the gadget; a write to a gadget output or a free port is
    /// carried along every outgoing connection.
    pub fn set_port_value(
        &mut self,
        port: &PortId,
        value: Value,
    ) -> Result<PropagationReport, RuntimeError> {
        // Fail before touching anything if the entry port is unknown.
        self.graph.value(port)?;

        let mut stack = vec![Work {
            port: port.clone(),
            value,
            cause: WriteCause::External,
        }];
        let mut journal: IndexMap<PortId, Value> = IndexMap::new();
        let mut report = PropagationReport {
            trace: self.config.trace_enabled.then(Vec::new),
            ..PropagationReport::default()
        };

        while let Some(work) = stack.pop() {
            report.steps += 1;
            if let Some(limit) = self.config.max_steps {
                if report.steps > limit {
                    let restored = journal.len();
                    self.rollback(journal)?;
                    tracing::debug!(
                        port = %port,
                        steps = report.steps,
                        limit,
                        restored,
                        "propagation did not converge; rolled back"
                    );
                    return Err(RuntimeError::NonConvergent {
                        port: port.clone(),
                        steps: report.steps,
                        limit,
                    });
                }
            }

            match self.apply(work, &mut journal, &mut report) {
                Ok(children) => stack.extend(children.into_iter().rev()),
                Err(err) => {
                    self.rollback(journal)?;
                    return Err(err);
                }
            }
        }

        Ok(report)
    }

    /// Performs one write and returns the follow-up writes, in order.
    fn apply(
        &mut self,
        work: Work,
        journal: &mut IndexMap<PortId, Value>,
        report: &mut PropagationReport,
    ) -> Result<Vec<Work>, RuntimeError> {
        if self.graph.value(&work.port)? == &work.value {
            return Ok(Vec::new());
        }

        let previous = self.graph.write_value(&work.port, work.value.clone())?;
        journal.entry(work.port.clone()).or_insert_with(|| previous.clone());
        report.changed.insert(work.port.clone(), work.value.clone());
        tracing::trace!(port = %work.port, value = %work.value, "port written");
        if let Some(trace) = &mut report.trace {
            trace.push(TraceEntry {
                step: report.steps,
                port: work.port.clone(),
                previous,
                value: work.value.clone(),
                cause: work.cause,
            });
        }

        let record = self
            .graph
            .port(&work.port)
            .ok_or_else(|| RuntimeError::PortNotFound {
                port: work.port.clone(),
            })?;

        match (&record.gadget, record.direction) {
            (Some(gadget), PortDirection::Input) => {
                let gadget = gadget.clone();
                self.run_gadget(&gadget)
            }
            _ => {
                let targets = self.graph.downstream(&work.port)?;
                Ok(targets
                    .into_iter()
                    .map(|target| Work {
                        port: target,
                        value: work.value.clone(),
                        cause: WriteCause::Connection {
                            from: work.port.clone(),
                        },
                    })
                    .collect())
            }
        }
    }

    /// Evaluates a gadget's primitive over its current port values and turns
    /// the result into output writes.
    fn run_gadget(&self, gadget: &GadgetId) -> Result<Vec<Work>, RuntimeError> {
        let record = self
            .graph
            .gadget(gadget)
            .ok_or_else(|| RuntimeError::GadgetNotFound {
                gadget: gadget.clone(),
            })?;
        let primitive = self.primitives.get(&record.primitive_name).ok_or_else(|| {
            RuntimeError::PrimitiveNotFound {
                primitive: record.primitive_name.clone(),
            }
        })?;

        let inputs = snapshot(&*self.graph, gadget, PortDirection::Input);
        let outputs_by_name = self.graph.gadget_ports(gadget, PortDirection::Output);
        let outputs: PortValues = outputs_by_name
            .iter()
            .map(|(name, port)| (name.clone(), port.current_value.clone()))
            .collect();

        let mut writes = Vec::new();
        for (name, value) in primitive.evaluate(&inputs, &outputs) {
            match outputs_by_name.get(&name) {
                Some(port) => writes.push(Work {
                    port: port.name.clone(),
                    value,
                    cause: WriteCause::Gadget {
                        gadget: gadget.clone(),
                        primitive: record.primitive_name.clone(),
                    },
                }),
                None => tracing::debug!(
                    gadget = %gadget,
                    output = %name,
                    "primitive wrote an output the gadget does not have"
                ),
            }
        }
        Ok(writes)
    }

    fn rollback(&mut self, journal: IndexMap<PortId, Value>) -> Result<(), RuntimeError> {
        for (port, value) in journal {
            self.graph.write_value(&port, value)?;
        }
        Ok(())
    }
}

/// Current values of a gadget's ports in one direction, keyed by port name.
fn snapshot(graph: &PortGraph, gadget: &GadgetId, direction: PortDirection) -> PortValues {
    graph
        .gadget_ports(gadget, direction)
        .into_iter()
        .map(|(name, port)| (name, port.current_value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ConnectionRecord, GadgetRecord, PortRecord};
    use serde_json::json;

    fn gadget(graph: &mut PortGraph, name: &str, primitive: &str, inputs: &[&str], outputs: &[&str]) {
        let id = GadgetId::new(name);
        graph
            .add_gadget(GadgetRecord {
                name: id.clone(),
                kind: primitive.into(),
                primitive_name: primitive.into(),
            })
            .unwrap();
        for input in inputs {
            graph
                .add_port(PortRecord::owned(&id, *input, PortDirection::Input))
                .unwrap();
        }
        for output in outputs {
            graph
                .add_port(PortRecord::owned(&id, *output, PortDirection::Output))
                .unwrap();
        }
    }

    fn wire(graph: &mut PortGraph, from: &str, to: &str) {
        graph
            .connect(ConnectionRecord::between(&from.into(), &to.into()))
            .unwrap();
    }

    fn value(graph: &PortGraph, port: &str) -> Value {
        graph.value(&port.into()).unwrap().clone()
    }

    #[test]
    fn adder_runs_when_both_inputs_are_set() {
        let mut graph = PortGraph::new();
        gadget(&mut graph, "sum", "add", &["a", "b"], &["out"]);
        let registry = PrimitiveRegistry::with_builtins();
        let mut interp = Interpreter::new(&mut graph, &registry, InterpreterConfig::default());

        interp.set_port_value(&"sum.a".into(), json!(5)).unwrap();
        assert_eq!(value(interp.graph(), "sum.out"), Value::Null);

        interp.set_port_value(&"sum.b".into(), json!(3)).unwrap();
        assert_eq!(value(interp.graph(), "sum.out"), json!(8));
    }

    #[test]
    fn unchanged_write_is_a_noop() {
        let mut graph = PortGraph::new();
        graph.add_port(PortRecord::free("x", PortDirection::Output)).unwrap();
        let registry = PrimitiveRegistry::with_builtins();
        let mut interp = Interpreter::new(&mut graph, &registry, InterpreterConfig::default());

        let first = interp.set_port_value(&"x".into(), json!(1)).unwrap();
        assert!(!first.is_noop());
        let second = interp.set_port_value(&"x".into(), json!(1)).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.steps, 1);
    }

    #[test]
    fn free_ports_fan_out_along_connections() {
        let mut graph = PortGraph::new();
        for name in ["src", "left", "right"] {
            graph.add_port(PortRecord::free(name, PortDirection::Output)).unwrap();
        }
        wire(&mut graph, "src", "left");
        wire(&mut graph, "src", "right");
        let registry = PrimitiveRegistry::with_builtins();
        let config = InterpreterConfig {
            trace_enabled: true,
            max_steps: None,
        };
        let mut interp = Interpreter::new(&mut graph, &registry, config);

        let report = interp.set_port_value(&"src".into(), json!("hi")).unwrap();
        assert_eq!(value(interp.graph(), "left"), json!("hi"));
        assert_eq!(value(interp.graph(), "right"), json!("hi"));

        let trace = report.trace.unwrap();
        let ports: Vec<&str> = trace.iter().map(|t| t.port.as_str()).collect();
        assert_eq!(ports, vec!["src", "left", "right"]);
        assert_eq!(
            trace[1].cause,
            WriteCause::Connection {
                from: PortId::new("src")
            }
        );
    }

    #[test]
    fn max_cell_cycle_converges() {
        let mut graph = PortGraph::new();
        for name in ["a", "b", "c"] {
            gadget(&mut graph, name, "max_cell", &["value"], &["out"]);
        }
        wire(&mut graph, "a.out", "b.value");
        wire(&mut graph, "b.out", "c.value");
        wire(&mut graph, "c.out", "a.value");
        let registry = PrimitiveRegistry::with_builtins();
        let config = InterpreterConfig {
            trace_enabled: false,
            max_steps: Some(1_000),
        };
        let mut interp = Interpreter::new(&mut graph, &registry, config);

        interp.set_port_value(&"a.value".into(), json!(5)).unwrap();
        for cell in ["a.out", "b.out", "c.out"] {
            assert_eq!(value(interp.graph(), cell), json!(5));
        }

        interp.set_port_value(&"b.value".into(), json!(10)).unwrap();
        for cell in ["a.out", "b.out", "c.out"] {
            assert_eq!(value(interp.graph(), cell), json!(10));
        }
    }

    #[test]
    fn growing_cycle_is_rolled_back() {
        // inc.out -> top.value, top.out -> inc.a; inc.b = 1.
        let mut graph = PortGraph::new();
        gadget(&mut graph, "inc", "add", &["a", "b"], &["out"]);
        gadget(&mut graph, "top", "max_cell", &["value"], &["out"]);
        wire(&mut graph, "inc.out", "top.value");
        wire(&mut graph, "top.out", "inc.a");
        let registry = PrimitiveRegistry::with_builtins();
        let config = InterpreterConfig {
            trace_enabled: false,
            max_steps: Some(200),
        };
        let mut interp = Interpreter::new(&mut graph, &registry, config);

        interp.set_port_value(&"inc.b".into(), json!(1)).unwrap();
        let err = interp.set_port_value(&"inc.a".into(), json!(0)).unwrap_err();
        match err {
            RuntimeError::NonConvergent { port, steps, limit } => {
                assert_eq!(port, PortId::new("inc.a"));
                assert_eq!(limit, 200);
                assert_eq!(steps, 201);
            }
            other => panic!("expected NonConvergent, got {other:?}"),
        }

        for port in ["inc.a", "inc.out", "top.value", "top.out"] {
            assert_eq!(value(interp.graph(), port), Value::Null, "{port}");
        }
        assert_eq!(value(interp.graph(), "inc.b"), json!(1));
    }

    #[test]
    fn missing_primitive_is_an_error_and_rolls_back() {
        let mut graph = PortGraph::new();
        gadget(&mut graph, "odd", "no_such_primitive", &["in"], &["out"]);
        let registry = PrimitiveRegistry::with_builtins();
        let mut interp = Interpreter::new(&mut graph, &registry, InterpreterConfig::default());

        let err = interp.set_port_value(&"odd.in".into(), json!(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::PrimitiveNotFound { .. }));
        assert_eq!(value(interp.graph(), "odd.in"), Value::Null);
    }

    #[test]
    fn unknown_port_is_reported() {
        let mut graph = PortGraph::new();
        let registry = PrimitiveRegistry::with_builtins();
        let mut interp = Interpreter::new(&mut graph, &registry, InterpreterConfig::default());
        assert_eq!(
            interp.set_port_value(&"ghost".into(), json!(1)).unwrap_err(),
            RuntimeError::PortNotFound {
                port: PortId::new("ghost")
            }
        );
    }
}
