//! Primitive functions and the registry the interpreter resolves them from.
//!
//! A primitive is a pure function lifted by one of two combinators:
//!
//! - [`Primitive::gadget`] reads every input port into a record keyed by port
//!   name and returns the outputs to write, also keyed by port name.
//! - [`Primitive::cell`] reads the single input port `value` and reduces it
//!   against the current value of output port `out` (or a seed while `out`
//!   is unset). It writes only when the result changes.
//!
//! Primitives never fail. A missing (`null`) input just means no output.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

/// Port values keyed by port name.
pub type PortValues = IndexMap<String, Value>;

/// Input port read by `cell` primitives.
pub const CELL_INPUT: &str = "value";
/// Output port written by `cell` primitives, and by the built-in gadgets.
pub const CELL_OUTPUT: &str = "out";

pub type GadgetFn = Arc<dyn Fn(&PortValues) -> PortValues + Send + Sync>;
pub type ReducerFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub enum Primitive {
    Gadget(GadgetFn),
    Cell { reducer: ReducerFn, seed: Value },
}

impl Primitive {
    pub fn gadget(f: impl Fn(&PortValues) -> PortValues + Send + Sync + 'static) -> Self {
        Primitive::Gadget(Arc::new(f))
    }

    /// `reducer(current, incoming)` must be ACI for the interpreter to
    /// settle.
    pub fn cell(
        reducer: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
        seed: Value,
    ) -> Self {
        Primitive::Cell {
            reducer: Arc::new(reducer),
            seed,
        }
    }

    /// Runs the primitive over the gadget's current port values and returns
    /// the output writes it asks for.
    pub fn evaluate(&self, inputs: &PortValues, outputs: &PortValues) -> PortValues {
        match self {
            Primitive::Gadget(f) => f(inputs),
            Primitive::Cell { reducer, seed } => {
                let incoming = match inputs.get(CELL_INPUT) {
                    Some(v) if !v.is_null() => v,
                    _ => return PortValues::new(),
                };
                let current = match outputs.get(CELL_OUTPUT) {
                    Some(v) if !v.is_null() => v,
                    _ => seed,
                };
                let next = reducer(current, incoming);
                let mut writes = PortValues::new();
                if !next.is_null() && outputs.get(CELL_OUTPUT) != Some(&next) {
                    writes.insert(CELL_OUTPUT.to_string(), next);
                }
                writes
            }
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Gadget(_) => f.write_str("Primitive::Gadget"),
            Primitive::Cell { seed, .. } => write!(f, "Primitive::Cell(seed = {seed})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name to primitive lookup. Adding a primitive needs no interpreter change.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveRegistry {
    primitives: IndexMap<String, Primitive>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in primitive.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("add", arithmetic(|a, b| Some(a + b)));
        registry.register("subtract", arithmetic(|a, b| Some(a - b)));
        registry.register("multiply", arithmetic(|a, b| Some(a * b)));
        registry.register(
            "divide",
            arithmetic(|a, b| if b == 0.0 { None } else { Some(a / b) }),
        );
        registry.register(
            "identity",
            Primitive::gadget(|inputs| match inputs.get("in") {
                Some(v) if !v.is_null() => single(v.clone()),
                _ => PortValues::new(),
            }),
        );
        registry.register(
            "concat",
            Primitive::gadget(|inputs| {
                match (
                    inputs.get("a").and_then(Value::as_str),
                    inputs.get("b").and_then(Value::as_str),
                ) {
                    (Some(a), Some(b)) => single(Value::String(format!("{a}{b}"))),
                    _ => PortValues::new(),
                }
            }),
        );
        registry.register(
            "max_cell",
            Primitive::cell(|c, v| pick_number(c, v, |a, b| b > a), Value::Null),
        );
        registry.register(
            "min_cell",
            Primitive::cell(|c, v| pick_number(c, v, |a, b| b < a), Value::Null),
        );
        registry.register(
            "or_cell",
            Primitive::cell(|c, v| logical(c, v, |a, b| a || b), Value::Bool(false)),
        );
        registry.register(
            "and_cell",
            Primitive::cell(|c, v| logical(c, v, |a, b| a && b), Value::Bool(true)),
        );
        registry.register("union_cell", Primitive::cell(union, Value::Array(Vec::new())));
        registry
    }

    /// Registers `primitive` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, primitive: Primitive) {
        self.primitives.insert(name.into(), primitive);
    }

    pub fn get(&self, name: &str) -> Option<&Primitive> {
        self.primitives.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.primitives.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Built-in helpers
// ---------------------------------------------------------------------------

/// Writes `value` to `out`.
fn single(value: Value) -> PortValues {
    let mut writes = PortValues::new();
    writes.insert(CELL_OUTPUT.to_string(), value);
    writes
}

/// Integral results come back as JSON integers, everything else as floats.
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn arithmetic(op: fn(f64, f64) -> Option<f64>) -> Primitive {
    Primitive::gadget(move |inputs| {
        let a = inputs.get("a").and_then(Value::as_f64);
        let b = inputs.get("b").and_then(Value::as_f64);
        match (a, b) {
            (Some(a), Some(b)) => op(a, b).map(number).map_or_else(PortValues::new, single),
            _ => PortValues::new(),
        }
    })
}

/// Keeps `incoming` over `current` when `prefer(current, incoming)` holds.
/// A non-number on either side keeps `current`.
fn pick_number(current: &Value, incoming: &Value, prefer: fn(f64, f64) -> bool) -> Value {
    match (current.as_f64(), incoming.as_f64()) {
        (Some(a), Some(b)) if prefer(a, b) => incoming.clone(),
        (None, Some(_)) if current.is_null() => incoming.clone(),
        _ => current.clone(),
    }
}

fn logical(current: &Value, incoming: &Value, op: fn(bool, bool) -> bool) -> Value {
    match (current.as_bool(), incoming.as_bool()) {
        (Some(a), Some(b)) => Value::Bool(op(a, b)),
        _ => current.clone(),
    }
}

/// Array union keeping first-seen order. A scalar counts as a one-element
/// array.
fn union(current: &Value, incoming: &Value) -> Value {
    let mut items = match current {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    let extra = match incoming {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    for item in extra {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Value::Array(items)
}
