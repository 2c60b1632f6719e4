//! Built-in function kinds.
//!
//! Binary arithmetic reads inputs `a` and `b`; unary functions read `a`.
//! Operands of the wrong kind withhold output, the same as a missing input.

use crate::function::{FunctionSpec, InputRecord};
use crate::value::LatticeValue;

fn numbers(inputs: &InputRecord) -> Option<(f64, f64)> {
    Some((inputs.get("a")?.as_number()?, inputs.get("b")?.as_number()?))
}

fn arithmetic(kind: &str, op: fn(f64, f64) -> Option<f64>) -> FunctionSpec {
    FunctionSpec::new(kind, ["a", "b"], move |inputs| {
        numbers(inputs)
            .and_then(|(a, b)| op(a, b))
            .map_or(LatticeValue::Null, LatticeValue::number)
    })
}

pub fn add() -> FunctionSpec {
    arithmetic("add", |a, b| Some(a + b))
}

pub fn subtract() -> FunctionSpec {
    arithmetic("subtract", |a, b| Some(a - b))
}

pub fn multiply() -> FunctionSpec {
    arithmetic("multiply", |a, b| Some(a * b))
}

/// Division; a zero divisor withholds output.
pub fn divide() -> FunctionSpec {
    arithmetic("divide", |a, b| if b == 0.0 { None } else { Some(a / b) })
}

pub fn negate() -> FunctionSpec {
    FunctionSpec::new("negate", ["a"], |inputs| {
        inputs
            .get("a")
            .and_then(LatticeValue::as_number)
            .map_or(LatticeValue::Null, |a| LatticeValue::number(-a))
    })
}

/// String concatenation of `a` then `b`.
pub fn concat() -> FunctionSpec {
    FunctionSpec::new("concat", ["a", "b"], |inputs| {
        match (
            inputs.get("a").and_then(LatticeValue::as_str),
            inputs.get("b").and_then(LatticeValue::as_str),
        ) {
            (Some(a), Some(b)) => LatticeValue::String(format!("{a}{b}")),
            _ => LatticeValue::Null,
        }
    })
}

/// Every built-in function kind.
pub fn builtins() -> Vec<FunctionSpec> {
    vec![add(), subtract(), multiply(), divide(), negate(), concat()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn arithmetic_kinds() {
        let cases = [(add(), 8.0), (subtract(), 2.0), (multiply(), 15.0)];
        for (spec, expected) in cases {
            let f = spec.build();
            f.accept(5.into(), None, Some("a")).unwrap();
            f.accept(3.into(), None, Some("b")).unwrap();
            assert_eq!(f.value(), LatticeValue::Number(expected), "{}", spec.kind);
        }
    }

    #[test]
    fn concat_joins_strings() {
        let f = concat().build();
        f.accept("prop".into(), None, Some("a")).unwrap();
        f.accept("net".into(), None, Some("b")).unwrap();
        assert_eq!(f.value(), LatticeValue::from("propnet"));
    }

    #[test]
    fn wrong_kind_withholds() {
        let f = add().build();
        f.accept("five".into(), None, Some("a")).unwrap();
        f.accept(3.into(), None, Some("b")).unwrap();
        assert_eq!(f.value(), LatticeValue::Null);
    }

    #[test]
    fn builtin_kinds_are_unique() {
        let kinds: Vec<String> = builtins().into_iter().map(|s| s.kind).collect();
        let mut deduped = kinds.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(kinds.len(), deduped.len());
    }
}
