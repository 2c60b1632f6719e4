//! The lattice value model.
//!
//! [`LatticeValue`] is the immutable, tagged unit of data that flows along
//! every edge of a propagation network. It is a closed sum type: the variant
//! chosen at construction never changes, and compound variants hold other
//! `LatticeValue`s directly rather than wrapping a value inside a value.
//!
//! Values carry a total structural order (see the [`Ord`] impl) so that sets
//! can be kept sorted and deduplicated at construction time, and so that
//! "did the output change?" is a cheap structural comparison.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Dict key holding the ordinal of an ordinal-wrapped value.
pub const ORDINAL_KEY: &str = "ordinal";
/// Dict key holding the payload of an ordinal-wrapped value.
pub const ORDINAL_VALUE_KEY: &str = "value";
/// Largest ordinal that survives the round trip through an `f64` exactly.
/// Distinct ordinals above it may compare as a tie.
pub const MAX_EXACT_ORDINAL: u64 = 1 << 53;

// ---------------------------------------------------------------------------
// LatticeValue
// ---------------------------------------------------------------------------

/// An immutable value flowing through the network.
///
/// `Null` doubles as "no value yet": an unset output reads as `Null`, and
/// cells treat it as the bottom of every lattice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LatticeValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<LatticeValue>),
    Set(ValueSet),
    /// String-keyed mapping. Key order carries no meaning.
    Dict(BTreeMap<String, LatticeValue>),
    /// Opaque host object compared by identity. Never serializable.
    #[serde(skip)]
    Box(HostBox),
    /// The operands of a merge that had no consistent result.
    Contradiction(ValueSet),
}

/// The tag of a [`LatticeValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Set,
    Dict,
    Box,
    Contradiction,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Set => "set",
            ValueKind::Dict => "dict",
            ValueKind::Box => "box",
            ValueKind::Contradiction => "contradiction",
        };
        f.write_str(name)
    }
}

impl LatticeValue {
    /// Builds a number. `-0.0` is stored as `0.0`.
    pub fn number(n: f64) -> Self {
        LatticeValue::Number(canonical_zero(n))
    }

    /// Builds a set, deduplicating structurally equal members.
    pub fn set<I: IntoIterator<Item = LatticeValue>>(items: I) -> Self {
        LatticeValue::Set(items.into_iter().collect())
    }

    /// Builds a dict from key/value pairs. Later duplicates win.
    pub fn dict<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, LatticeValue)>,
    {
        LatticeValue::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wraps a host object so it can travel through the graph by identity.
    ///
    /// Fails with [`CoreError::NestedValue`] if `value` is itself a lattice
    /// value (or a value set): a value is never wrapped in a value.
    pub fn boxed<T: Any>(value: T) -> Result<Self, CoreError> {
        HostBox::new(value).map(LatticeValue::Box)
    }

    /// Builds the contradiction produced by merging `a` with `b`.
    ///
    /// Operands that are contradictions themselves are flattened, so a
    /// contradiction never contains another contradiction.
    pub fn contradiction(a: LatticeValue, b: LatticeValue) -> Self {
        let mut operands = Vec::new();
        for operand in [a, b] {
            match operand {
                LatticeValue::Contradiction(inner) => operands.extend(inner.0),
                other => operands.push(other),
            }
        }
        LatticeValue::Contradiction(operands.into_iter().collect())
    }

    /// Wraps `value` with a monotonically increasing ordinal, for use with the
    /// ordinal (last-write-wins) join.
    ///
    /// Ordinals are stored as numbers, so they are exact up to
    /// [`MAX_EXACT_ORDINAL`].
    pub fn ordinal(ordinal: u64, value: LatticeValue) -> Self {
        if ordinal > MAX_EXACT_ORDINAL {
            tracing::warn!(ordinal, "ordinal above 2^53 loses precision");
        }
        LatticeValue::dict([
            (ORDINAL_KEY, LatticeValue::Number(ordinal as f64)),
            (ORDINAL_VALUE_KEY, value),
        ])
    }

    /// Returns the tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            LatticeValue::Null => ValueKind::Null,
            LatticeValue::Bool(_) => ValueKind::Bool,
            LatticeValue::Number(_) => ValueKind::Number,
            LatticeValue::String(_) => ValueKind::String,
            LatticeValue::Array(_) => ValueKind::Array,
            LatticeValue::Set(_) => ValueKind::Set,
            LatticeValue::Dict(_) => ValueKind::Dict,
            LatticeValue::Box(_) => ValueKind::Box,
            LatticeValue::Contradiction(_) => ValueKind::Contradiction,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, LatticeValue::Null)
    }

    pub fn is_contradiction(&self) -> bool {
        matches!(self, LatticeValue::Contradiction(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LatticeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            LatticeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LatticeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&ValueSet> {
        match self {
            LatticeValue::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, LatticeValue>> {
        match self {
            LatticeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// The operands recorded in a contradiction.
    pub fn conflicts(&self) -> Option<&ValueSet> {
        match self {
            LatticeValue::Contradiction(s) => Some(s),
            _ => None,
        }
    }

    /// Unpacks an ordinal-wrapped value into `(ordinal, payload)`.
    pub fn as_ordinal(&self) -> Option<(f64, &LatticeValue)> {
        let dict = self.as_dict()?;
        if dict.len() != 2 {
            return None;
        }
        let ordinal = dict.get(ORDINAL_KEY)?.as_number()?;
        let value = dict.get(ORDINAL_VALUE_KEY)?;
        Some((ordinal, value))
    }

    /// Lossy conversion to plain JSON, for display and for the port-graph
    /// interpreter. Sets become arrays, boxes become `null`, and a
    /// contradiction becomes `{"contradiction": [...]}`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            LatticeValue::Null | LatticeValue::Box(_) => Json::Null,
            LatticeValue::Bool(b) => Json::Bool(*b),
            LatticeValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            LatticeValue::String(s) => Json::String(s.clone()),
            LatticeValue::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            LatticeValue::Set(set) => Json::Array(set.iter().map(Self::to_json).collect()),
            LatticeValue::Dict(map) => Json::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            LatticeValue::Contradiction(set) => {
                let operands = Json::Array(set.iter().map(Self::to_json).collect());
                Json::Object([("contradiction".to_string(), operands)].into_iter().collect())
            }
        }
    }

    fn rank(&self) -> u8 {
        self.kind() as u8
    }
}

impl Default for LatticeValue {
    fn default() -> Self {
        LatticeValue::Null
    }
}

// Structural equality and order. Numbers use `total_cmp` so the order is total
// (NaN equals itself), with `-0.0` and `0.0` treated as one value. Boxes order
// by address.

fn canonical_zero(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n
    }
}

impl Ord for LatticeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use LatticeValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Number(a), Number(b)) => canonical_zero(*a).total_cmp(&canonical_zero(*b)),
            (String(a), String(b)) => a.cmp(b),
            (Array(a), Array(b)) => a.cmp(b),
            (Set(a), Set(b)) => a.cmp(b),
            (Dict(a), Dict(b)) => a.cmp(b),
            (Box(a), Box(b)) => a.addr().cmp(&b.addr()),
            (Contradiction(a), Contradiction(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for LatticeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LatticeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LatticeValue {}

impl fmt::Display for LatticeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatticeValue::Null => f.write_str("null"),
            LatticeValue::Bool(b) => write!(f, "{b}"),
            LatticeValue::Number(n) => write!(f, "{n}"),
            LatticeValue::String(s) => write!(f, "{s:?}"),
            LatticeValue::Array(items) => {
                f.write_str("[")?;
                write_joined(f, items.iter())?;
                f.write_str("]")
            }
            LatticeValue::Set(set) => {
                f.write_str("#{")?;
                write_joined(f, set.iter())?;
                f.write_str("}")
            }
            LatticeValue::Dict(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
            LatticeValue::Box(b) => write!(f, "<box {:#x}>", b.addr()),
            LatticeValue::Contradiction(set) => {
                f.write_str("contradiction{")?;
                write_joined(f, set.iter())?;
                f.write_str("}")
            }
        }
    }
}

fn write_joined<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a LatticeValue>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

// Conversions from host scalars.

impl From<bool> for LatticeValue {
    fn from(b: bool) -> Self {
        LatticeValue::Bool(b)
    }
}

impl From<f64> for LatticeValue {
    fn from(n: f64) -> Self {
        LatticeValue::number(n)
    }
}

impl From<i64> for LatticeValue {
    fn from(n: i64) -> Self {
        LatticeValue::Number(n as f64)
    }
}

impl From<i32> for LatticeValue {
    fn from(n: i32) -> Self {
        LatticeValue::Number(n.into())
    }
}

impl From<&str> for LatticeValue {
    fn from(s: &str) -> Self {
        LatticeValue::String(s.to_string())
    }
}

impl From<String> for LatticeValue {
    fn from(s: String) -> Self {
        LatticeValue::String(s)
    }
}

impl From<Vec<LatticeValue>> for LatticeValue {
    fn from(items: Vec<LatticeValue>) -> Self {
        LatticeValue::Array(items)
    }
}

impl From<serde_json::Value> for LatticeValue {
    /// JSON arrays become `Array`, objects become `Dict`. Numbers that do not
    /// fit an `f64` become `Null`.
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => LatticeValue::Null,
            Json::Bool(b) => LatticeValue::Bool(b),
            Json::Number(n) => n.as_f64().map_or(LatticeValue::Null, LatticeValue::Number),
            Json::String(s) => LatticeValue::String(s),
            Json::Array(items) => {
                LatticeValue::Array(items.into_iter().map(LatticeValue::from).collect())
            }
            Json::Object(map) => LatticeValue::Dict(
                map.into_iter().map(|(k, v)| (k, LatticeValue::from(v))).collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ValueSet
// ---------------------------------------------------------------------------

/// A sorted, deduplicated collection of lattice values.
///
/// Membership is structural: two members that compare equal are the same
/// member. Deserialization re-normalizes, so a hand-edited snapshot with
/// duplicates still yields a proper set.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<LatticeValue>")]
pub struct ValueSet(Vec<LatticeValue>);

impl ValueSet {
    pub fn new() -> Self {
        ValueSet(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LatticeValue> {
        self.0.iter()
    }

    pub fn contains(&self, value: &LatticeValue) -> bool {
        self.0.binary_search(value).is_ok()
    }

    /// Members present in either set.
    pub fn union(&self, other: &ValueSet) -> ValueSet {
        self.0.iter().chain(other.0.iter()).cloned().collect()
    }

    /// Members present in both sets.
    pub fn intersection(&self, other: &ValueSet) -> ValueSet {
        ValueSet(
            self.0
                .iter()
                .filter(|v| other.contains(v))
                .cloned()
                .collect(),
        )
    }
}

impl From<Vec<LatticeValue>> for ValueSet {
    fn from(mut items: Vec<LatticeValue>) -> Self {
        items.sort();
        items.dedup();
        ValueSet(items)
    }
}

impl FromIterator<LatticeValue> for ValueSet {
    fn from_iter<I: IntoIterator<Item = LatticeValue>>(iter: I) -> Self {
        ValueSet::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a ValueSet {
    type Item = &'a LatticeValue;
    type IntoIter = std::slice::Iter<'a, LatticeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// HostBox
// ---------------------------------------------------------------------------

/// An opaque host object with identity semantics.
///
/// Two boxes are equal only if they share the same allocation; cloning a box
/// shares it.
#[derive(Clone)]
pub struct HostBox(Rc<dyn Any>);

impl HostBox {
    /// Boxes `value`. Lattice values and value sets are refused.
    pub fn new<T: Any>(value: T) -> Result<Self, CoreError> {
        let id = TypeId::of::<T>();
        if id == TypeId::of::<LatticeValue>() || id == TypeId::of::<ValueSet>() {
            return Err(CoreError::NestedValue);
        }
        Ok(HostBox(Rc::new(value)))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostBox) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for HostBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostBox({:#x})", self.addr())
    }
}
