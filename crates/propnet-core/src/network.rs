//! Networks: strongly-owning containers of nodes.
//!
//! Graph edges are weak, so a node stays alive only while something holds a
//! strong reference to it. A [`Network`] is that something. Removing a node
//! from its network (and dropping any other handles) is enough to reclaim it;
//! edges pointing at it prune themselves on the next emit.
//!
//! Networks are nodes too, so they nest. Combining networks is union-only.
//! A network's default output is its member count, for diagnostics.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::function::Function;
use crate::id::NodeId;
use crate::node::{Node, NodeCore, NodeRef, UpstreamLink, WeakNodeRef, DEFAULT_OUTPUT};
use crate::value::LatticeValue;

/// Kind name of network nodes.
pub const NETWORK_KIND: &str = "network";

pub struct Network {
    core: NodeCore,
    members: RefCell<IndexMap<NodeId, NodeRef>>,
}

impl Network {
    pub fn new() -> Rc<Self> {
        Self::with_id(NodeId::new())
    }

    pub fn with_id(id: NodeId) -> Rc<Self> {
        let network = Rc::new_cyclic(|me: &Weak<Network>| {
            let this: WeakNodeRef = me.clone();
            Network {
                core: NodeCore::new(id, this),
                members: RefCell::new(IndexMap::new()),
            }
        });
        network.core.set_output(DEFAULT_OUTPUT, LatticeValue::Number(0.0));
        network
    }

    /// Takes strong ownership of `nodes`. Nodes already present are left
    /// untouched.
    pub fn add<I>(&self, nodes: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = NodeRef>,
    {
        let added = {
            let mut members = self.members.borrow_mut();
            let before = members.len();
            for node in nodes {
                if node.id() == self.id() {
                    continue;
                }
                members.entry(node.id()).or_insert(node);
            }
            members.len() - before
        };
        if added > 0 {
            tracing::debug!(network = %self.id(), added, "added members");
        }
        self.refresh_summary()
    }

    /// Adds a single concretely-typed node.
    pub fn add_node<N: Node>(&self, node: Rc<N>) -> Result<(), CoreError> {
        let node: NodeRef = node;
        self.add([node])
    }

    /// Drops strong ownership of a member, returning it if it was present.
    pub fn remove(&self, id: NodeId) -> Result<Option<NodeRef>, CoreError> {
        let removed = self.members.borrow_mut().shift_remove(&id);
        if removed.is_some() {
            tracing::debug!(network = %self.id(), node = %id, "removed member");
            self.refresh_summary()?;
        }
        Ok(removed)
    }

    /// Unions `other`'s members into this network. No edges are rewired and
    /// nothing is removed from either side.
    pub fn merge_network(&self, other: &Network) -> Result<(), CoreError> {
        self.add(other.members())
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef> {
        self.members.borrow().get(&id).cloned()
    }

    /// Looks a node up here and, failing that, in nested networks. Each
    /// network is searched at most once, so networks that contain each other
    /// are fine.
    pub fn find(&self, id: NodeId) -> Option<NodeRef> {
        self.find_in(id, &mut HashSet::new())
    }

    fn find_in(&self, id: NodeId, visited: &mut HashSet<NodeId>) -> Option<NodeRef> {
        if !visited.insert(self.id()) {
            return None;
        }
        if let Some(node) = self.get(id) {
            return Some(node);
        }
        self.members()
            .iter()
            .filter_map(|m| m.as_any().downcast_ref::<Network>())
            .find_map(|nested| nested.find_in(id, visited))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.borrow().contains_key(&id)
    }

    /// Direct members, in insertion order.
    pub fn members(&self) -> Vec<NodeRef> {
        self.members.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Re-evaluates every Function in this network and in nested networks.
    /// A network reached twice is swept once.
    pub fn recompute(&self) -> Result<(), CoreError> {
        self.recompute_in(&mut HashSet::new())
    }

    fn recompute_in(&self, visited: &mut HashSet<NodeId>) -> Result<(), CoreError> {
        if !visited.insert(self.id()) {
            return Ok(());
        }
        for member in self.members() {
            if let Some(function) = member.as_any().downcast_ref::<Function>() {
                function.recompute()?;
            } else if let Some(nested) = member.as_any().downcast_ref::<Network>() {
                nested.recompute_in(visited)?;
            }
        }
        Ok(())
    }

    fn refresh_summary(&self) -> Result<(), CoreError> {
        let count = LatticeValue::Number(self.len() as f64);
        if self.core.set_output(DEFAULT_OUTPUT, count) {
            self.core.emit(DEFAULT_OUTPUT)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("id", &self.id())
            .field("members", &self.len())
            .finish()
    }
}

impl Node for Network {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> &str {
        NETWORK_KIND
    }

    /// Networks carry no data of their own; inbound values are ignored.
    fn accept(
        &self,
        _value: LatticeValue,
        source: Option<NodeId>,
        _input: Option<&str>,
    ) -> Result<(), CoreError> {
        tracing::debug!(network = %self.id(), source = ?source, "network ignores inbound value");
        Ok(())
    }

    fn add_upstream(&self, _link: UpstreamLink) -> Result<(), CoreError> {
        Ok(())
    }

    fn remove_upstream(&self, _source: NodeId, _input: Option<&str>) {}

    fn upstream(&self) -> Vec<UpstreamLink> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
