//! Many-writer lattice cells.
//!
//! A [`Cell`] accepts values from any number of upstream nodes and keeps the
//! join of everything it has seen on its default output. It re-emits only
//! when the join actually changes, so a finite set of distinct inputs always
//! settles.
//!
//! Cells are grow-only: disconnecting a source never lowers the output.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::CoreError;
use crate::id::NodeId;
use crate::join::Join;
use crate::node::{self, Node, NodeCore, UpstreamLink, WeakNodeRef, DEFAULT_OUTPUT};
use crate::propagate;
use crate::value::LatticeValue;

pub struct Cell {
    core: NodeCore,
    join: Join,
    upstream: RefCell<Vec<UpstreamLink>>,
}

impl Cell {
    /// Creates a cell merging with `join`.
    pub fn new(join: Join) -> Rc<Self> {
        Self::with_id(NodeId::new(), join)
    }

    /// Creates a cell with a caller-chosen id (used by snapshot restore).
    pub fn with_id(id: NodeId, join: Join) -> Rc<Self> {
        Rc::new_cyclic(|me: &Weak<Cell>| {
            let this: WeakNodeRef = me.clone();
            Cell {
                core: NodeCore::new(id, this),
                join,
                upstream: RefCell::new(Vec::new()),
            }
        })
    }

    pub fn max() -> Rc<Self> {
        Self::new(Join::Max)
    }

    pub fn min() -> Rc<Self> {
        Self::new(Join::Min)
    }

    pub fn set_union() -> Rc<Self> {
        Self::new(Join::SetUnion)
    }

    pub fn set_intersection() -> Rc<Self> {
        Self::new(Join::SetIntersection)
    }

    pub fn or() -> Rc<Self> {
        Self::new(Join::Or)
    }

    pub fn and() -> Rc<Self> {
        Self::new(Join::And)
    }

    pub fn ordinal() -> Rc<Self> {
        Self::new(Join::Ordinal)
    }

    pub fn join(&self) -> &Join {
        &self.join
    }

    /// Current joined value.
    pub fn value(&self) -> LatticeValue {
        self.core.output(DEFAULT_OUTPUT)
    }

    /// Subscribes to `source.output` and immediately pulls its current value.
    pub fn connect_from(&self, source: &dyn Node, output: &str) -> Result<(), CoreError> {
        node::link(source, self, output, None)?;
        let current = source.get_output(output);
        propagate::deliver(self, current, Some(source.id()), None)
    }

    /// Removes the edge from `source` in both directions. The merged value is
    /// left as it is.
    pub fn disconnect_from(&self, source: &dyn Node) {
        self.remove_upstream(source.id(), None);
        source.remove_downstream(self.id(), None);
    }

    /// Re-links a restored edge without pulling the source's value.
    pub(crate) fn restore_link(&self, source: &dyn Node, output: &str) -> Result<(), CoreError> {
        node::link(source, self, output, None)
    }

    /// Writes a restored output without emitting.
    pub(crate) fn restore_value(&self, value: LatticeValue) {
        self.core.set_output(DEFAULT_OUTPUT, value);
    }
}

impl Node for Cell {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> &str {
        self.join.name()
    }

    fn accept(
        &self,
        value: LatticeValue,
        source: Option<NodeId>,
        _input: Option<&str>,
    ) -> Result<(), CoreError> {
        if value.is_null() {
            return Ok(());
        }

        let current = self.value();
        let merged = if current.is_null() {
            value
        } else {
            self.join.apply(&current, &value)
        };

        if !self.core.set_output(DEFAULT_OUTPUT, merged) {
            return Ok(());
        }

        let merged = self.value();
        if merged.is_contradiction() && !current.is_contradiction() {
            tracing::warn!(
                node = %self.id(),
                join = self.join.name(),
                source = ?source,
                %merged,
                "cell reached a contradiction"
            );
        }
        self.core.emit(DEFAULT_OUTPUT)
    }

    fn add_upstream(&self, link: UpstreamLink) -> Result<(), CoreError> {
        let mut upstream = self.upstream.borrow_mut();
        upstream.retain(UpstreamLink::is_live);
        let exists = upstream
            .iter()
            .any(|l| l.source_id == link.source_id && l.output == link.output);
        if !exists {
            upstream.push(link);
        }
        Ok(())
    }

    fn remove_upstream(&self, source: NodeId, _input: Option<&str>) {
        self.upstream.borrow_mut().retain(|l| l.source_id != source);
    }

    /// Live upstream links. Links to reclaimed sources are dropped here.
    fn upstream(&self) -> Vec<UpstreamLink> {
        let mut upstream = self.upstream.borrow_mut();
        upstream.retain(UpstreamLink::is_live);
        upstream.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    fn num(n: f64) -> LatticeValue {
        LatticeValue::Number(n)
    }

    fn emission_counter(cell: &Cell) -> (Rc<StdCell<usize>>, node::TapHandle) {
        let count = Rc::new(StdCell::new(0));
        let c = count.clone();
        let handle = cell.core().tap(move |_, _| c.set(c.get() + 1));
        (count, handle)
    }

    #[test]
    fn first_value_is_taken_directly() {
        let cell = Cell::set_intersection();
        let v = LatticeValue::set([num(1.0), num(2.0)]);
        cell.accept(v.clone(), None, None).unwrap();
        assert_eq!(cell.value(), v);
    }

    #[test]
    fn repeated_value_emits_once() {
        let cell = Cell::max();
        let (count, _tap) = emission_counter(&cell);
        cell.accept(num(4.0), None, None).unwrap();
        cell.accept(num(4.0), None, None).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn lower_value_does_not_emit() {
        let cell = Cell::max();
        let (count, _tap) = emission_counter(&cell);
        cell.accept(num(4.0), None, None).unwrap();
        cell.accept(num(2.0), None, None).unwrap();
        assert_eq!(cell.value(), num(4.0));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn null_is_ignored() {
        let cell = Cell::max();
        let (count, _tap) = emission_counter(&cell);
        cell.accept(LatticeValue::Null, None, None).unwrap();
        assert_eq!(count.get(), 0);
        assert_eq!(cell.value(), LatticeValue::Null);
    }

    #[test]
    fn connect_from_pulls_current_value() {
        let a = Cell::max();
        a.accept(num(7.0), None, None).unwrap();
        let b = Cell::max();
        b.connect_from(&*a, DEFAULT_OUTPUT).unwrap();
        assert_eq!(b.value(), num(7.0));
    }

    #[test]
    fn values_flow_downstream() {
        let a = Cell::max();
        let b = Cell::max();
        b.connect_from(&*a, DEFAULT_OUTPUT).unwrap();
        a.accept(num(3.0), None, None).unwrap();
        assert_eq!(b.value(), num(3.0));
    }

    #[test]
    fn disconnect_keeps_value_and_stops_flow() {
        let a = Cell::max();
        let b = Cell::max();
        b.connect_from(&*a, DEFAULT_OUTPUT).unwrap();
        a.accept(num(3.0), None, None).unwrap();

        b.disconnect_from(&*a);
        assert_eq!(a.core().downstream_len(), 0);
        assert!(b.upstream().is_empty());

        a.accept(num(10.0), None, None).unwrap();
        assert_eq!(b.value(), num(3.0));
    }

    #[test]
    fn disjoint_intersection_emits_contradiction() {
        let cell = Cell::set_intersection();
        let a = LatticeValue::set([num(1.0), num(2.0), num(3.0)]);
        let b = LatticeValue::set([num(4.0), num(5.0), num(6.0)]);
        cell.accept(a.clone(), None, None).unwrap();
        cell.accept(b.clone(), None, None).unwrap();

        let out = cell.value();
        let conflicts = out.conflicts().expect("contradiction");
        assert!(conflicts.contains(&a));
        assert!(conflicts.contains(&b));
    }

    #[test]
    fn kind_is_the_join_name() {
        assert_eq!(Cell::max().kind(), "max");
        assert_eq!(Cell::new(Join::custom("mine", |a, _| a.clone())).kind(), "mine");
    }

    #[test]
    fn links_to_dropped_sources_are_pruned() {
        let b = Cell::max();
        for _ in 0..3 {
            let a = Cell::max();
            b.connect_from(&*a, DEFAULT_OUTPUT).unwrap();
        }
        assert!(b.upstream().is_empty());

        let live = Cell::max();
        b.connect_from(&*live, DEFAULT_OUTPUT).unwrap();
        assert_eq!(b.upstream().len(), 1);
        assert_eq!(b.upstream()[0].source_id, live.id());
    }
}
