//! Fixed-arity functions with named, single-writer inputs.
//!
//! A [`Function`] declares its inputs up front. Each input has at most one
//! upstream connection; connecting again replaces the old one. Inputs start
//! out `null`, and the pure compute step only runs once every input holds a
//! value. A compute step returning `null` withholds output.
//!
//! Functions are not ACI: the latest value per input wins.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::{self, Node, NodeCore, UpstreamLink, WeakNodeRef, DEFAULT_OUTPUT};
use crate::propagate;
use crate::value::LatticeValue;

/// The full input record handed to a compute step, in declaration order.
pub type InputRecord = IndexMap<String, LatticeValue>;

/// A pure compute step.
pub type ComputeFn = Rc<dyn Fn(&InputRecord) -> LatticeValue>;

// ---------------------------------------------------------------------------
// FunctionSpec
// ---------------------------------------------------------------------------

/// Everything needed to build a Function of a given kind: its declared inputs
/// and compute step. Registries hold specs; nodes are built from them.
#[derive(Clone)]
pub struct FunctionSpec {
    pub kind: String,
    pub inputs: Vec<String>,
    pub compute: ComputeFn,
}

impl FunctionSpec {
    pub fn new<I, S>(
        kind: impl Into<String>,
        inputs: I,
        compute: impl Fn(&InputRecord) -> LatticeValue + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FunctionSpec {
            kind: kind.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            compute: Rc::new(compute),
        }
    }

    pub fn build(&self) -> Rc<Function> {
        self.build_with_id(NodeId::new())
    }

    pub fn build_with_id(&self, id: NodeId) -> Rc<Function> {
        Function::from_parts(id, self.kind.clone(), self.inputs.clone(), self.compute.clone())
    }
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

pub struct Function {
    core: NodeCore,
    kind: String,
    inputs: Vec<String>,
    received: RefCell<InputRecord>,
    upstream: RefCell<IndexMap<String, UpstreamLink>>,
    compute: ComputeFn,
}

impl Function {
    /// Creates a function node of `kind` with the given inputs and compute
    /// step.
    pub fn new<I, S>(
        kind: impl Into<String>,
        inputs: I,
        compute: impl Fn(&InputRecord) -> LatticeValue + 'static,
    ) -> Rc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FunctionSpec::new(kind, inputs, compute).build()
    }

    fn from_parts(id: NodeId, kind: String, inputs: Vec<String>, compute: ComputeFn) -> Rc<Self> {
        let received = inputs
            .iter()
            .map(|name| (name.clone(), LatticeValue::Null))
            .collect();
        Rc::new_cyclic(|me: &Weak<Function>| {
            let this: WeakNodeRef = me.clone();
            Function {
                core: NodeCore::new(id, this),
                kind,
                inputs,
                received: RefCell::new(received),
                upstream: RefCell::new(IndexMap::new()),
                compute,
            }
        })
    }

    /// Declared input names, in declaration order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn declares(&self, input: &str) -> bool {
        self.inputs.iter().any(|name| name == input)
    }

    /// The stored value of every input (`null` where nothing arrived yet).
    pub fn received(&self) -> InputRecord {
        self.received.borrow().clone()
    }

    /// Current output.
    pub fn value(&self) -> LatticeValue {
        self.core.output(DEFAULT_OUTPUT)
    }

    /// Wires `source.output` into `input`, replacing any existing connection
    /// on that input, and pulls the source's current value.
    ///
    /// Fails fast with [`CoreError::UnknownInput`] if `input` is not declared.
    pub fn connect_from(
        &self,
        input: &str,
        source: &dyn Node,
        output: &str,
    ) -> Result<(), CoreError> {
        if !self.declares(input) {
            return Err(CoreError::UnknownInput {
                node: self.id(),
                input: input.to_string(),
            });
        }

        let previous = self.upstream.borrow().get(input).cloned();
        if let Some(previous) = previous {
            tracing::warn!(
                node = %self.id(),
                input,
                previous = %previous.source_id,
                replacement = %source.id(),
                "replacing existing input connection"
            );
            if let Some(old_source) = previous.source() {
                old_source.remove_downstream(self.id(), Some(input));
            }
        }

        node::link(source, self, output, Some(input))?;
        let current = source.get_output(output);
        propagate::deliver(self, current, Some(source.id()), Some(input))
    }

    /// Drops the connection feeding `input`. The stored input value and the
    /// output stay as they are.
    pub fn disconnect(&self, input: &str) {
        let removed = self.upstream.borrow_mut().shift_remove(input);
        if let Some(source) = removed.and_then(|link| link.source()) {
            source.remove_downstream(self.id(), Some(input));
        }
    }

    /// Re-evaluates the compute step from the stored inputs, emitting if the
    /// output changes. Does nothing while any input is still `null`.
    pub fn recompute(&self) -> Result<(), CoreError> {
        let record = self.received.borrow().clone();
        if record.values().any(LatticeValue::is_null) {
            return Ok(());
        }

        let result = (self.compute)(&record);
        if result.is_null() {
            tracing::debug!(node = %self.id(), kind = %self.kind, "compute withheld output");
            return Ok(());
        }

        if self.core.set_output(DEFAULT_OUTPUT, result) {
            self.core.emit(DEFAULT_OUTPUT)
        } else {
            Ok(())
        }
    }

    fn resolve_input(&self, input: Option<&str>) -> Result<String, CoreError> {
        match input {
            Some(name) if self.declares(name) => Ok(name.to_string()),
            Some(name) => Err(CoreError::UnknownInput {
                node: self.id(),
                input: name.to_string(),
            }),
            None if self.inputs.len() == 1 => Ok(self.inputs[0].clone()),
            None => Err(CoreError::MissingInputName { node: self.id() }),
        }
    }

    pub(crate) fn restore_link(
        &self,
        input: &str,
        source: &dyn Node,
        output: &str,
    ) -> Result<(), CoreError> {
        node::link(source, self, output, Some(input))
    }

    pub(crate) fn restore_state(&self, received: InputRecord, output: LatticeValue) {
        {
            let mut slots = self.received.borrow_mut();
            for (name, value) in received {
                if let Some(slot) = slots.get_mut(&name) {
                    *slot = value;
                }
            }
        }
        self.core.set_output(DEFAULT_OUTPUT, output);
    }
}

impl Node for Function {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn accept(
        &self,
        value: LatticeValue,
        _source: Option<NodeId>,
        input: Option<&str>,
    ) -> Result<(), CoreError> {
        let input = self.resolve_input(input)?;
        if value.is_null() {
            return Ok(());
        }

        let changed = {
            let mut received = self.received.borrow_mut();
            match received.get_mut(&input) {
                Some(slot) if *slot == value => false,
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            }
        };

        if changed {
            self.recompute()
        } else {
            Ok(())
        }
    }

    fn add_upstream(&self, link: UpstreamLink) -> Result<(), CoreError> {
        let input = self.resolve_input(link.input.as_deref())?;
        let mut upstream = self.upstream.borrow_mut();
        upstream.retain(|_, l| l.is_live());
        upstream.insert(input, link);
        Ok(())
    }

    fn remove_upstream(&self, source: NodeId, input: Option<&str>) {
        self.upstream.borrow_mut().retain(|name, link| {
            !(link.source_id == source && (input.is_none() || input == Some(name.as_str())))
        });
    }

    fn upstream(&self) -> Vec<UpstreamLink> {
        let mut upstream = self.upstream.borrow_mut();
        upstream.retain(|_, l| l.is_live());
        upstream.values().cloned().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::library;
    use std::cell::Cell as StdCell;

    fn num(n: f64) -> LatticeValue {
        LatticeValue::Number(n)
    }

    fn counting_add() -> (Rc<Function>, Rc<StdCell<usize>>) {
        let calls = Rc::new(StdCell::new(0));
        let counter = calls.clone();
        let f = Function::new("add", ["a", "b"], move |inputs| {
            counter.set(counter.get() + 1);
            match (inputs["a"].as_number(), inputs["b"].as_number()) {
                (Some(a), Some(b)) => num(a + b),
                _ => LatticeValue::Null,
            }
        });
        (f, calls)
    }

    #[test]
    fn does_not_compute_until_all_inputs_arrive() {
        let (f, calls) = counting_add();
        f.accept(num(5.0), None, Some("a")).unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(f.value(), LatticeValue::Null);
        assert_eq!(f.received()["b"], LatticeValue::Null);
    }

    #[test]
    fn computes_once_then_once_per_change() {
        let (f, calls) = counting_add();
        f.accept(num(5.0), None, Some("a")).unwrap();
        f.accept(num(3.0), None, Some("b")).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(f.value(), num(8.0));

        f.accept(num(10.0), None, Some("a")).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(f.value(), num(13.0));

        f.accept(num(10.0), None, Some("a")).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unknown_input_on_connect_fails_fast() {
        let (f, _) = counting_add();
        let source = Cell::max();
        let err = f.connect_from("c", &*source, DEFAULT_OUTPUT).unwrap_err();
        assert!(matches!(err, CoreError::UnknownInput { ref input, .. } if input == "c"));
        assert_eq!(source.core().downstream_len(), 0);
    }

    #[test]
    fn unnamed_accept_needs_a_single_input() {
        let (f, _) = counting_add();
        assert!(matches!(
            f.accept(num(1.0), None, None),
            Err(CoreError::MissingInputName { .. })
        ));

        let neg = library::negate().build();
        neg.accept(num(2.0), None, None).unwrap();
        assert_eq!(neg.value(), num(-2.0));
    }

    #[test]
    fn reconnect_replaces_previous_source() {
        let (f, _) = counting_add();
        let first = Cell::max();
        let second = Cell::max();
        first.accept(num(1.0), None, None).unwrap();
        second.accept(num(2.0), None, None).unwrap();

        f.connect_from("a", &*first, DEFAULT_OUTPUT).unwrap();
        f.connect_from("a", &*second, DEFAULT_OUTPUT).unwrap();

        assert_eq!(first.core().downstream_len(), 0);
        assert_eq!(second.core().downstream_len(), 1);
        assert_eq!(f.upstream().len(), 1);
        assert_eq!(f.upstream()[0].source_id, second.id());
        assert_eq!(f.received()["a"], num(2.0));
    }

    #[test]
    fn null_compute_result_withholds_output() {
        let div = library::divide().build();
        div.accept(num(1.0), None, Some("a")).unwrap();
        div.accept(num(0.0), None, Some("b")).unwrap();
        assert_eq!(div.value(), LatticeValue::Null);

        div.accept(num(4.0), None, Some("b")).unwrap();
        assert_eq!(div.value(), num(0.25));
    }

    #[test]
    fn disconnect_keeps_computed_state() {
        let add = library::add().build();
        let a = Cell::max();
        let b = Cell::max();
        add.connect_from("a", &*a, DEFAULT_OUTPUT).unwrap();
        add.connect_from("b", &*b, DEFAULT_OUTPUT).unwrap();
        a.accept(num(1.0), None, None).unwrap();
        b.accept(num(2.0), None, None).unwrap();
        assert_eq!(add.value(), num(3.0));

        add.disconnect("a");
        a.accept(num(100.0), None, None).unwrap();
        assert_eq!(add.value(), num(3.0));
        assert_eq!(add.received()["a"], num(1.0));
    }

    #[test]
    fn links_to_dropped_sources_are_pruned() {
        let add = library::add().build();
        let a = Cell::max();
        let b = Cell::max();
        add.connect_from("a", &*a, DEFAULT_OUTPUT).unwrap();
        add.connect_from("b", &*b, DEFAULT_OUTPUT).unwrap();
        drop(a);

        let upstream = add.upstream();
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream[0].source_id, b.id());
    }
}
