//! Snapshot and restore of whole networks.
//!
//! A snapshot is a flat list of [`NodeRecord`]s: one per node reachable from
//! the root network through membership (nested networks included). Edges are
//! stored on the receiving side, by source id and output name, so restoring
//! is two-pass: build every node first, then re-link.
//!
//! Node kinds are resolved through an explicit [`NodeRegistry`]. Custom joins
//! and function kinds must be registered before their snapshots can be
//! restored.
//!
//! Restoring never propagates. Outputs, Function input records and the edges
//! come back exactly as they were captured.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::error::CoreError;
use crate::function::{Function, FunctionSpec, InputRecord};
use crate::id::NodeId;
use crate::join::Join;
use crate::library;
use crate::network::{Network, NETWORK_KIND};
use crate::node::{Node, NodeRef, DEFAULT_OUTPUT};
use crate::value::LatticeValue;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Which specialization a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Cell,
    Function,
    Network,
}

/// The upstream end of a stored edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub source_id: NodeId,
    pub output_name: String,
}

/// Serialized form of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,
    /// Join name for cells, function kind for functions, `"network"` for
    /// networks.
    pub kind: String,
    pub role: NodeRole,
    #[serde(default)]
    pub outputs: IndexMap<String, LatticeValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, serde_json::Value>,
    /// Cell sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    /// Function input connections, by input name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, SourceRef>,
    /// Function input values as last received.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub received: InputRecord,
    /// Network members.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<NodeId>,
}

impl NodeRecord {
    fn capture(node: &dyn Node) -> Self {
        let core = node.core();
        let mut record = NodeRecord {
            id: node.id(),
            kind: node.kind().to_string(),
            role: NodeRole::Cell,
            outputs: core.outputs(),
            metadata: core.metadata(),
            sources: Vec::new(),
            inputs: IndexMap::new(),
            received: IndexMap::new(),
            members: Vec::new(),
        };

        let any = node.as_any();
        if let Some(network) = any.downcast_ref::<Network>() {
            record.role = NodeRole::Network;
            record.members = network.members().iter().map(|m| m.id()).collect();
        } else if let Some(function) = any.downcast_ref::<Function>() {
            record.role = NodeRole::Function;
            record.received = function.received();
            for link in node.upstream().into_iter().filter(|l| l.is_live()) {
                if let Some(input) = link.input {
                    record.inputs.insert(
                        input,
                        SourceRef {
                            source_id: link.source_id,
                            output_name: link.output,
                        },
                    );
                }
            }
        } else {
            record.sources = node
                .upstream()
                .into_iter()
                .filter(|l| l.is_live())
                .map(|l| SourceRef {
                    source_id: l.source_id,
                    output_name: l.output,
                })
                .collect();
        }
        record
    }

    /// Ids this record refers to.
    fn references(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sources
            .iter()
            .map(|s| s.source_id)
            .chain(self.inputs.values().map(|s| s.source_id))
            .chain(self.members.iter().copied())
    }
}

/// A captured network: the root network's id plus every reachable node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub root: NodeId,
    pub nodes: Vec<NodeRecord>,
}

impl NetworkSnapshot {
    /// Serializes to JSON. Fails if any output or input record holds a
    /// `Box` value.
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuilds the network, resolving kinds through `registry`.
    pub fn restore(&self, registry: &NodeRegistry) -> Result<Rc<Network>, CoreError> {
        // Pass 1: construct every node with its recorded id and state.
        let mut built: IndexMap<NodeId, Restored> = IndexMap::with_capacity(self.nodes.len());
        for record in &self.nodes {
            if built.contains_key(&record.id) {
                return Err(CoreError::InvalidSnapshot {
                    reason: format!("node {} recorded twice", record.id),
                });
            }
            let node = Restored::build(record, registry)?;
            built.insert(record.id, node);
        }

        // Pass 2: re-link edges and membership.
        for record in &self.nodes {
            if let Some(missing) = record.references().find(|id| !built.contains_key(id)) {
                return Err(CoreError::NodeNotFound { id: missing });
            }
            let lookup = |id: NodeId| built[&id].node();
            match &built[&record.id] {
                Restored::Cell(cell) => {
                    for source in &record.sources {
                        cell.restore_link(&*lookup(source.source_id), &source.output_name)?;
                    }
                }
                Restored::Function(function) => {
                    for (input, source) in &record.inputs {
                        function.restore_link(
                            input,
                            &*lookup(source.source_id),
                            &source.output_name,
                        )?;
                    }
                }
                Restored::Network(network) => {
                    network.add(record.members.iter().map(|id| lookup(*id)))?;
                }
            }
        }

        match built.get(&self.root) {
            Some(Restored::Network(root)) => Ok(root.clone()),
            Some(_) => Err(CoreError::InvalidSnapshot {
                reason: format!("root {} is not a network", self.root),
            }),
            None => Err(CoreError::NodeNotFound { id: self.root }),
        }
    }
}

enum Restored {
    Cell(Rc<Cell>),
    Function(Rc<Function>),
    Network(Rc<Network>),
}

impl Restored {
    fn build(record: &NodeRecord, registry: &NodeRegistry) -> Result<Self, CoreError> {
        let unknown = || CoreError::UnknownKind {
            kind: record.kind.clone(),
        };
        let restored = match record.role {
            NodeRole::Cell => {
                let join = registry.join(&record.kind).ok_or_else(unknown)?;
                Restored::Cell(Cell::with_id(record.id, join.clone()))
            }
            NodeRole::Function => {
                let spec = registry.function(&record.kind).ok_or_else(unknown)?;
                let function = spec.build_with_id(record.id);
                if let Some(input) = record.received.keys().find(|k| !function.declares(k)) {
                    return Err(CoreError::UnknownInput {
                        node: record.id,
                        input: input.clone(),
                    });
                }
                function.restore_state(record.received.clone(), LatticeValue::Null);
                Restored::Function(function)
            }
            NodeRole::Network if record.kind == NETWORK_KIND => {
                Restored::Network(Network::with_id(record.id))
            }
            NodeRole::Network => return Err(unknown()),
        };

        let node = restored.node();
        for (name, value) in &record.outputs {
            node.core().set_output(name, value.clone());
        }
        for (key, value) in &record.metadata {
            node.core().set_metadata(key.clone(), value.clone());
        }
        Ok(restored)
    }

    fn node(&self) -> NodeRef {
        match self {
            Restored::Cell(cell) => cell.clone(),
            Restored::Function(function) => function.clone(),
            Restored::Network(network) => network.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Network entry points
// ---------------------------------------------------------------------------

impl Network {
    /// Captures this network and everything reachable through membership.
    /// Edges from nodes outside that set are not recorded.
    pub fn snapshot(&self) -> NetworkSnapshot {
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(self.id());
        records.push(NodeRecord::capture(self));

        let mut pending = self.members();
        while let Some(node) = pending.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            if let Some(nested) = node.as_any().downcast_ref::<Network>() {
                pending.extend(nested.members());
            }
            records.push(NodeRecord::capture(&*node));
        }

        for record in &mut records {
            let before = record.sources.len() + record.inputs.len();
            record.sources.retain(|s| seen.contains(&s.source_id));
            record.inputs.retain(|_, s| seen.contains(&s.source_id));
            let dropped = before - record.sources.len() - record.inputs.len();
            if dropped > 0 {
                tracing::debug!(node = %record.id, dropped, "skipped edges from outside the snapshot");
            }
        }

        NetworkSnapshot {
            root: self.id(),
            nodes: records,
        }
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        self.snapshot().to_json()
    }

    pub fn from_json(json: &str, registry: &NodeRegistry) -> Result<Rc<Network>, CoreError> {
        NetworkSnapshot::from_json(json)?.restore(registry)
    }
}

// ---------------------------------------------------------------------------
// NodeRegistry
// ---------------------------------------------------------------------------

/// Kind name to constructor lookup used by restore.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    joins: IndexMap<String, Join>,
    functions: IndexMap<String, FunctionSpec>,
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every built-in join and function kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for join in Join::builtins() {
            registry.register_join(join);
        }
        for spec in library::builtins() {
            registry.register_function(spec);
        }
        registry
    }

    /// Registers a join under its name, replacing any previous entry.
    pub fn register_join(&mut self, join: Join) {
        self.joins.insert(join.name().to_string(), join);
    }

    /// Registers a function kind, replacing any previous entry.
    pub fn register_function(&mut self, spec: FunctionSpec) {
        self.functions.insert(spec.kind.clone(), spec);
    }

    pub fn join(&self, name: &str) -> Option<&Join> {
        self.joins.get(name)
    }

    pub fn function(&self, kind: &str) -> Option<&FunctionSpec> {
        self.functions.get(kind)
    }
}
