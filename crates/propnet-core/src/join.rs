//! Join (least-upper-bound) operations for cells.
//!
//! Every join is expected to be associative, commutative and idempotent over
//! its domain. Operands outside the domain (a string fed to a max cell) are
//! incomparable and produce a `contradiction` carrying both operands.
//!
//! A contradiction stays a contradiction. A value joined into one is merged
//! with the first operand it is compatible with, or added as a new operand,
//! so `{1, "a"} ⊔ 2` is `{2, "a"}` whichever order the values arrived in.

use std::fmt;
use std::rc::Rc;

use crate::value::{LatticeValue, ValueSet};

/// Signature of a user-supplied join.
pub type JoinFn = Rc<dyn Fn(&LatticeValue, &LatticeValue) -> LatticeValue>;

/// A cell's merge operation.
#[derive(Clone)]
pub enum Join {
    /// Numeric maximum.
    Max,
    /// Numeric minimum.
    Min,
    /// Set union.
    SetUnion,
    /// Set intersection. Disjoint operands are a contradiction.
    SetIntersection,
    /// Boolean or.
    Or,
    /// Boolean and.
    And,
    /// Last write wins by ordinal. Operands are
    /// [`LatticeValue::ordinal`] wrappers; the higher ordinal wins and a tie
    /// keeps the current value.
    Ordinal,
    /// A named join supplied by the embedding application.
    Custom { name: String, f: JoinFn },
}

impl Join {
    /// Wraps a closure as a named join. The closure is only ever called with
    /// two non-null, non-contradiction operands.
    pub fn custom(
        name: impl Into<String>,
        f: impl Fn(&LatticeValue, &LatticeValue) -> LatticeValue + 'static,
    ) -> Self {
        Join::Custom {
            name: name.into(),
            f: Rc::new(f),
        }
    }

    /// The built-in joins, in registry order.
    pub fn builtins() -> Vec<Join> {
        vec![
            Join::Max,
            Join::Min,
            Join::SetUnion,
            Join::SetIntersection,
            Join::Or,
            Join::And,
            Join::Ordinal,
        ]
    }

    /// Looks up a built-in join by name.
    pub fn builtin(name: &str) -> Option<Join> {
        Join::builtins().into_iter().find(|j| j.name() == name)
    }

    /// Registry name of this join; also the kind of cells using it.
    pub fn name(&self) -> &str {
        match self {
            Join::Max => "max",
            Join::Min => "min",
            Join::SetUnion => "set_union",
            Join::SetIntersection => "set_intersection",
            Join::Or => "or",
            Join::And => "and",
            Join::Ordinal => "ordinal",
            Join::Custom { name, .. } => name,
        }
    }

    /// Joins `current` with `incoming`.
    ///
    /// `Null` is the bottom element of every join.
    pub fn apply(&self, current: &LatticeValue, incoming: &LatticeValue) -> LatticeValue {
        match (current, incoming) {
            (LatticeValue::Null, other) | (other, LatticeValue::Null) => other.clone(),
            (LatticeValue::Contradiction(a), LatticeValue::Contradiction(b)) => {
                let operands = b
                    .iter()
                    .fold(a.iter().cloned().collect::<Vec<_>>(), |ops, v| self.absorb(ops, v));
                conflict_of(operands)
            }
            (LatticeValue::Contradiction(a), other) | (other, LatticeValue::Contradiction(a)) => {
                conflict_of(self.absorb(a.iter().cloned().collect(), other))
            }
            _ => self.merge(current, incoming),
        }
    }

    /// Merges `value` into the first operand it joins with cleanly, or keeps
    /// it as an operand of its own.
    fn absorb(&self, mut operands: Vec<LatticeValue>, value: &LatticeValue) -> Vec<LatticeValue> {
        for op in operands.iter_mut() {
            let merged = self.merge(op, value);
            if !merged.is_contradiction() {
                *op = merged;
                return operands;
            }
        }
        operands.push(value.clone());
        operands
    }

    // Both operands are plain values: neither null nor a contradiction.
    fn merge(&self, current: &LatticeValue, incoming: &LatticeValue) -> LatticeValue {
        let conflict = || {
            if current == incoming {
                current.clone()
            } else {
                LatticeValue::contradiction(current.clone(), incoming.clone())
            }
        };

        match self {
            Join::Max => match (current.as_number(), incoming.as_number()) {
                (Some(a), Some(b)) => LatticeValue::number(if b > a { b } else { a }),
                _ => conflict(),
            },
            Join::Min => match (current.as_number(), incoming.as_number()) {
                (Some(a), Some(b)) => LatticeValue::number(if b < a { b } else { a }),
                _ => conflict(),
            },
            Join::SetUnion => match (current.as_set(), incoming.as_set()) {
                (Some(a), Some(b)) => LatticeValue::Set(a.union(b)),
                _ => conflict(),
            },
            Join::SetIntersection => match (current.as_set(), incoming.as_set()) {
                (Some(a), Some(b)) => {
                    let common = a.intersection(b);
                    if common.is_empty() && !(a.is_empty() && b.is_empty()) {
                        conflict()
                    } else {
                        LatticeValue::Set(common)
                    }
                }
                _ => conflict(),
            },
            Join::Or => match (current.as_bool(), incoming.as_bool()) {
                (Some(a), Some(b)) => LatticeValue::Bool(a || b),
                _ => conflict(),
            },
            Join::And => match (current.as_bool(), incoming.as_bool()) {
                (Some(a), Some(b)) => LatticeValue::Bool(a && b),
                _ => conflict(),
            },
            Join::Ordinal => match (current.as_ordinal(), incoming.as_ordinal()) {
                (Some((a, _)), Some((b, _))) => {
                    if b > a {
                        incoming.clone()
                    } else {
                        current.clone()
                    }
                }
                _ => conflict(),
            },
            Join::Custom { f, .. } => f(current, incoming),
        }
    }

    /// Folds `values` left to right, starting from `Null`.
    pub fn fold<'a>(&self, values: impl IntoIterator<Item = &'a LatticeValue>) -> LatticeValue {
        values
            .into_iter()
            .fold(LatticeValue::Null, |acc, v| self.apply(&acc, v))
    }
}

fn conflict_of(operands: Vec<LatticeValue>) -> LatticeValue {
    let set: ValueSet = operands.into_iter().collect();
    if set.len() == 1 {
        if let Some(only) = set.iter().next() {
            return only.clone();
        }
    }
    LatticeValue::Contradiction(set)
}

impl fmt::Debug for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Join({})", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> LatticeValue {
        LatticeValue::Number(n)
    }

    fn set(items: &[f64]) -> LatticeValue {
        LatticeValue::set(items.iter().map(|n| num(*n)))
    }

    #[test]
    fn max_and_min() {
        assert_eq!(Join::Max.apply(&num(3.0), &num(5.0)), num(5.0));
        assert_eq!(Join::Max.apply(&num(5.0), &num(3.0)), num(5.0));
        assert_eq!(Join::Min.apply(&num(3.0), &num(5.0)), num(3.0));
    }

    #[test]
    fn null_is_bottom() {
        for join in Join::builtins() {
            assert_eq!(join.apply(&LatticeValue::Null, &num(1.0)), num(1.0));
            assert_eq!(join.apply(&num(1.0), &LatticeValue::Null), num(1.0));
        }
    }

    #[test]
    fn set_union_accumulates() {
        assert_eq!(
            Join::SetUnion.apply(&set(&[1.0, 2.0]), &set(&[2.0, 3.0])),
            set(&[1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn set_intersection_narrows() {
        assert_eq!(
            Join::SetIntersection.apply(&set(&[1.0, 2.0, 3.0]), &set(&[2.0, 3.0, 4.0])),
            set(&[2.0, 3.0])
        );
    }

    #[test]
    fn disjoint_intersection_is_a_contradiction() {
        let a = set(&[1.0, 2.0, 3.0]);
        let b = set(&[4.0, 5.0, 6.0]);
        let result = Join::SetIntersection.apply(&a, &b);
        let conflicts = result.conflicts().expect("contradiction");
        assert!(conflicts.contains(&a));
        assert!(conflicts.contains(&b));
    }

    #[test]
    fn booleans() {
        let t = LatticeValue::Bool(true);
        let f = LatticeValue::Bool(false);
        assert_eq!(Join::Or.apply(&f, &t), t);
        assert_eq!(Join::And.apply(&t, &f), f);
    }

    #[test]
    fn ordinal_keeps_higher_and_ties_keep_current() {
        let old = LatticeValue::ordinal(1, "old".into());
        let new = LatticeValue::ordinal(2, "new".into());
        let rival = LatticeValue::ordinal(2, "rival".into());
        assert_eq!(Join::Ordinal.apply(&old, &new), new);
        assert_eq!(Join::Ordinal.apply(&new, &old), new);
        assert_eq!(Join::Ordinal.apply(&new, &rival), new);
    }

    #[test]
    fn wrong_kind_is_a_contradiction() {
        let result = Join::Max.apply(&num(1.0), &"one".into());
        assert!(result.is_contradiction());
    }

    #[test]
    fn wrong_kind_joined_with_itself_is_unchanged() {
        let word = LatticeValue::from("one");
        assert_eq!(Join::Max.apply(&word, &word), word);
    }

    #[test]
    fn contradiction_merges_values_into_matching_operands() {
        let c = LatticeValue::contradiction(num(1.0), "x".into());
        let expected = LatticeValue::contradiction(num(9.0), "x".into());
        assert_eq!(Join::Max.apply(&c, &num(9.0)), expected);
        assert_eq!(Join::Max.apply(&num(9.0), &c), expected);
        assert_eq!(Join::Max.apply(&c, &num(0.5)), c);
        assert_eq!(Join::Max.apply(&c, &c), c);

        let d = LatticeValue::contradiction(num(2.0), "y".into());
        let both = Join::Max.apply(&c, &d);
        assert_eq!(both.conflicts().unwrap().len(), 3);
        assert_eq!(both, Join::Max.apply(&d, &c));
    }

    #[test]
    fn contradiction_does_not_depend_on_arrival_order() {
        let forward = [num(2.0), num(1.0), "a".into()];
        let backward = [LatticeValue::from("a"), num(1.0), num(2.0)];
        let expected = LatticeValue::contradiction(num(2.0), "a".into());
        assert_eq!(Join::Max.fold(&forward), expected);
        assert_eq!(Join::Max.fold(&backward), expected);
        assert_eq!(
            Join::Min.fold(&forward),
            LatticeValue::contradiction(num(1.0), "a".into())
        );
    }

    #[test]
    fn signed_zero_does_not_depend_on_arrival_order() {
        for join in [Join::Max, Join::Min] {
            let a = join.fold(&[num(0.0), num(-0.0)]);
            let b = join.fold(&[num(-0.0), num(0.0)]);
            assert_eq!(a, b);
            let (LatticeValue::Number(x), LatticeValue::Number(y)) = (a, b) else {
                panic!("expected numbers");
            };
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn custom_join_is_named() {
        let longest = Join::custom("longest", |a, b| {
            let (a_len, b_len) = (a.to_string().len(), b.to_string().len());
            if b_len > a_len { b.clone() } else { a.clone() }
        });
        assert_eq!(longest.name(), "longest");
        assert_eq!(
            longest.apply(&"ab".into(), &"abc".into()),
            LatticeValue::from("abc")
        );
    }

    #[test]
    fn builtin_lookup_by_name() {
        for join in Join::builtins() {
            assert_eq!(Join::builtin(join.name()).unwrap().name(), join.name());
        }
        assert!(Join::builtin("median").is_none());
    }

    #[test]
    fn fold_from_bottom() {
        let values = [num(4.0), num(9.0), num(2.0)];
        assert_eq!(Join::Max.fold(&values), num(9.0));
        assert_eq!(Join::Min.fold(&values), num(2.0));
    }
}
