//! The node base protocol shared by every graph node.
//!
//! A node has a stable [`NodeId`], a map of named outputs (the default output
//! is [`DEFAULT_OUTPUT`]), and a set of downstream edges. Every edge holds a
//! *weak* reference to its target: the only strong references to a node are
//! owned by its [`Network`](crate::network::Network) (and by whoever built
//! it). When a target is reclaimed, its edge is pruned the next time the
//! source emits.
//!
//! Specializations ([`Cell`](crate::cell::Cell),
//! [`Function`](crate::function::Function),
//! [`Network`](crate::network::Network)) embed a [`NodeCore`] and implement
//! the [`Node`] trait's `accept`.

use std::any::Any;
use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::propagate;
use crate::value::LatticeValue;

/// Name of the output every node has.
pub const DEFAULT_OUTPUT: &str = "default";

/// Strong, type-erased handle to a node.
pub type NodeRef = Rc<dyn Node>;

/// Weak, type-erased handle to a node.
pub type WeakNodeRef = Weak<dyn Node>;

/// Observer invoked on every emission with `(output_name, value)`.
pub type TapFn = Rc<dyn Fn(&str, &LatticeValue)>;

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// An edge from one of a node's outputs to a downstream node.
#[derive(Debug, Clone)]
pub struct DownstreamEdge {
    /// The receiving node. May have been reclaimed.
    pub target: WeakNodeRef,
    /// Id of the receiving node, kept so dead edges can still be identified.
    pub target_id: NodeId,
    /// Which of the source's outputs this edge hangs off.
    pub output: String,
    /// Input name on the target. Only Functions use it.
    pub input: Option<String>,
}

impl DownstreamEdge {
    pub fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }
}

/// A node's record of one of its inbound connections.
#[derive(Debug, Clone)]
pub struct UpstreamLink {
    /// The sending node. May have been reclaimed.
    pub source: WeakNodeRef,
    /// Id of the sending node.
    pub source_id: NodeId,
    /// Which output of the source is read.
    pub output: String,
    /// Input name on the receiving node, for Functions.
    pub input: Option<String>,
}

impl UpstreamLink {
    pub fn is_live(&self) -> bool {
        self.source.strong_count() > 0
    }

    /// Upgrades to the source, if it is still alive.
    pub fn source(&self) -> Option<NodeRef> {
        self.source.upgrade()
    }
}

// ---------------------------------------------------------------------------
// Taps
// ---------------------------------------------------------------------------

type TapList = RefCell<Vec<(u64, TapFn)>>;

/// Keeps a tap registered. Dropping the handle removes the tap.
#[must_use = "dropping a TapHandle removes the tap immediately"]
pub struct TapHandle {
    id: u64,
    taps: Weak<TapList>,
}

impl TapHandle {
    /// Keeps the tap for as long as the node lives.
    pub fn persist(mut self) {
        self.taps = Weak::new();
    }
}

impl Drop for TapHandle {
    fn drop(&mut self) {
        if let Some(taps) = self.taps.upgrade() {
            taps.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// NodeCore
// ---------------------------------------------------------------------------

/// State shared by all node kinds: identity, outputs, downstream edges,
/// metadata and taps.
///
/// All fields use interior mutability because propagation is re-entrant: a
/// node may be delivered a value while one of its own emissions is still on
/// the stack. No borrow is ever held across a delivery.
pub struct NodeCore {
    id: NodeId,
    this: WeakNodeRef,
    outputs: RefCell<IndexMap<String, LatticeValue>>,
    downstream: RefCell<SmallVec<[DownstreamEdge; 4]>>,
    metadata: RefCell<IndexMap<String, serde_json::Value>>,
    taps: Rc<TapList>,
    next_tap: StdCell<u64>,
}

impl NodeCore {
    /// `this` must point at the node embedding this core; build it with
    /// `Rc::new_cyclic`.
    pub fn new(id: NodeId, this: WeakNodeRef) -> Self {
        NodeCore {
            id,
            this,
            outputs: RefCell::new(IndexMap::new()),
            downstream: RefCell::new(SmallVec::new()),
            metadata: RefCell::new(IndexMap::new()),
            taps: Rc::new(RefCell::new(Vec::new())),
            next_tap: StdCell::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Weak handle to the owning node.
    pub fn this(&self) -> WeakNodeRef {
        self.this.clone()
    }

    /// Current value of an output, or `Null` if it was never set.
    pub fn output(&self, name: &str) -> LatticeValue {
        self.outputs
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(LatticeValue::Null)
    }

    /// All outputs that have been set.
    pub fn outputs(&self) -> IndexMap<String, LatticeValue> {
        self.outputs.borrow().clone()
    }

    /// Writes an output without emitting. Returns `true` if it changed.
    pub(crate) fn set_output(&self, name: &str, value: LatticeValue) -> bool {
        let mut outputs = self.outputs.borrow_mut();
        if outputs.get(name) == Some(&value) {
            return false;
        }
        if value.is_null() && !outputs.contains_key(name) {
            return false;
        }
        outputs.insert(name.to_string(), value);
        true
    }

    /// Registers an edge. Adding the same (target, output, input) twice is a
    /// no-op.
    pub fn add_downstream(&self, edge: DownstreamEdge) {
        let mut downstream = self.downstream.borrow_mut();
        let exists = downstream.iter().any(|e| {
            e.target_id == edge.target_id && e.output == edge.output && e.input == edge.input
        });
        if !exists {
            downstream.push(edge);
        }
    }

    /// Removes edges to `target`. With `input = None` every edge to the target
    /// goes; otherwise only the edge feeding that input.
    pub fn remove_downstream(&self, target: NodeId, input: Option<&str>) {
        self.downstream.borrow_mut().retain(|e| {
            !(e.target_id == target && (input.is_none() || e.input.as_deref() == input))
        });
    }

    /// Snapshot of the downstream edge set, dead edges included.
    pub fn downstream(&self) -> Vec<DownstreamEdge> {
        self.downstream.borrow().iter().cloned().collect()
    }

    /// Number of downstream edges, dead edges included.
    pub fn downstream_len(&self) -> usize {
        self.downstream.borrow().len()
    }

    pub fn get_metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.metadata.borrow().get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.borrow_mut().insert(key.into(), value);
    }

    pub fn metadata(&self) -> IndexMap<String, serde_json::Value> {
        self.metadata.borrow().clone()
    }

    /// Registers an observer called with every emitted value.
    pub fn tap(&self, f: impl Fn(&str, &LatticeValue) + 'static) -> TapHandle {
        let id = self.next_tap.get();
        self.next_tap.set(id + 1);
        self.taps.borrow_mut().push((id, Rc::new(f)));
        TapHandle {
            id,
            taps: Rc::downgrade(&self.taps),
        }
    }

    /// Pushes the current value of `output` to every live downstream edge
    /// attached to it. Dead edges (any output) are pruned on the way.
    pub fn emit(&self, output: &str) -> Result<(), CoreError> {
        let value = self.output(output);

        let targets: Vec<(NodeRef, Option<String>)> = {
            let mut downstream = self.downstream.borrow_mut();
            let before = downstream.len();
            downstream.retain(|e| e.is_live());
            let pruned = before - downstream.len();
            if pruned > 0 {
                tracing::debug!(node = %self.id, pruned, "pruned dead downstream edges");
            }
            downstream
                .iter()
                .filter(|e| e.output == output)
                .filter_map(|e| e.target.upgrade().map(|t| (t, e.input.clone())))
                .collect()
        };

        let taps: Vec<TapFn> = self.taps.borrow().iter().map(|(_, f)| f.clone()).collect();
        for tap in taps {
            tap(output, &value);
        }

        for (target, input) in targets {
            propagate::deliver(&*target, value.clone(), Some(self.id), input.as_deref())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// The protocol every graph node implements.
///
/// Only `accept` carries kind-specific semantics; identity, outputs, emission,
/// metadata and taps come from the embedded [`NodeCore`].
pub trait Node: Any {
    fn core(&self) -> &NodeCore;

    /// Registry kind name (`"max"`, `"add"`, `"network"`, ...).
    fn kind(&self) -> &str;

    /// Incorporates an inbound value. `input` names the receiving input on
    /// Functions and is ignored elsewhere.
    fn accept(
        &self,
        value: LatticeValue,
        source: Option<NodeId>,
        input: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Records an inbound connection without pulling its value.
    fn add_upstream(&self, link: UpstreamLink) -> Result<(), CoreError>;

    /// Forgets inbound connections from `source` (restricted to one input
    /// when `input` is given).
    fn remove_upstream(&self, source: NodeId, input: Option<&str>);

    /// Current inbound connections, live or not.
    fn upstream(&self) -> Vec<UpstreamLink>;

    fn as_any(&self) -> &dyn Any;

    fn id(&self) -> NodeId {
        self.core().id()
    }

    fn get_output(&self, name: &str) -> LatticeValue {
        self.core().output(name)
    }

    fn emit(&self, output: &str) -> Result<(), CoreError> {
        self.core().emit(output)
    }

    fn add_downstream(&self, edge: DownstreamEdge) {
        self.core().add_downstream(edge)
    }

    fn remove_downstream(&self, target: NodeId, input: Option<&str>) {
        self.core().remove_downstream(target, input)
    }

    fn get_metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.core().get_metadata(key)
    }

    fn set_metadata(&self, key: &str, value: serde_json::Value) {
        self.core().set_metadata(key, value)
    }

    fn tap(&self, f: Box<dyn Fn(&str, &LatticeValue)>) -> TapHandle {
        self.core().tap(f)
    }
}

/// Wires `source.output` into `target`, registering both directions of the
/// edge. Used by Cell and Function `connect_from` and by snapshot restore.
pub(crate) fn link(
    source: &dyn Node,
    target: &dyn Node,
    output: &str,
    input: Option<&str>,
) -> Result<(), CoreError> {
    target.add_upstream(UpstreamLink {
        source: source.core().this(),
        source_id: source.id(),
        output: output.to_string(),
        input: input.map(str::to_string),
    })?;
    source.add_downstream(DownstreamEdge {
        target: target.core().this(),
        target_id: target.id(),
        output: output.to_string(),
        input: input.map(str::to_string),
    });
    Ok(())
}
