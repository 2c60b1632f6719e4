//! Law-check runner and random operand generation.
//!
//! Samples are checked exhaustively first (every value, pair and triple),
//! then `iterations` random rounds draw operands from the join's value
//! domain with a deterministic PRNG. Given the same `random_seed`, the same
//! operands are drawn and the same result is produced.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use propnet_core::{Cell, CoreError, Join, LatticeValue, Node};

use super::{both_contradictions, Law, LawCheckConfig, LawCheckResult, LawViolation, Verdict};

/// Where random operands for a join come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDomain {
    Numbers,
    Sets,
    Bools,
    /// Ordinal wrappers whose payload is a function of the ordinal, so equal
    /// ordinals always carry equal payloads.
    Ordinals,
    /// Only the caller's samples. Used for custom joins.
    Samples,
}

impl ValueDomain {
    pub fn for_join(join: &Join) -> Self {
        match join {
            Join::Max | Join::Min => ValueDomain::Numbers,
            Join::SetUnion | Join::SetIntersection => ValueDomain::Sets,
            Join::Or | Join::And => ValueDomain::Bools,
            Join::Ordinal => ValueDomain::Ordinals,
            Join::Custom { .. } => ValueDomain::Samples,
        }
    }
}

/// Draws one operand from `domain`.
///
/// Numbers mix in boundary values about 30% of the time.
pub fn generate_random_value(
    domain: ValueDomain,
    samples: &[LatticeValue],
    rng: &mut ChaCha8Rng,
) -> LatticeValue {
    match domain {
        ValueDomain::Numbers => {
            if rng.gen_ratio(3, 10) {
                let boundaries: &[f64] = &[0.0, 1.0, -1.0, 1e12, -1e12];
                LatticeValue::Number(boundaries[rng.gen_range(0..boundaries.len())])
            } else {
                LatticeValue::Number(f64::from(rng.gen_range(-1000i32..1000)))
            }
        }
        ValueDomain::Sets => {
            let len = rng.gen_range(0..5);
            LatticeValue::set((0..len).map(|_| LatticeValue::from(rng.gen_range(0i64..8))))
        }
        ValueDomain::Bools => LatticeValue::Bool(rng.gen_bool(0.5)),
        ValueDomain::Ordinals => {
            let n = rng.gen_range(0u64..20);
            LatticeValue::ordinal(n, LatticeValue::from(format!("v{n}")))
        }
        ValueDomain::Samples => samples
            .choose(rng)
            .cloned()
            .unwrap_or(LatticeValue::Null),
    }
}

/// Checks `join` against every law. Samples go first, then random rounds.
pub fn run_law_checks(join: &Join, config: LawCheckConfig) -> Result<LawCheckResult, CoreError> {
    let domain = ValueDomain::for_join(join);
    let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed);
    let mut tally = Tally::default();
    let samples = &config.samples;

    for a in samples {
        tally.record(idempotence(join, a));
        for b in samples {
            tally.record(commutativity(join, a, b));
            for c in samples {
                tally.record(associativity(join, a, b, c));
            }
        }
    }
    if samples.len() > 1 {
        tally.record(order_independence(join, samples, &mut rng)?);
    }

    for _ in 0..config.iterations {
        let a = generate_random_value(domain, samples, &mut rng);
        let b = generate_random_value(domain, samples, &mut rng);
        let c = generate_random_value(domain, samples, &mut rng);
        tally.record(idempotence(join, &a));
        tally.record(commutativity(join, &a, &b));
        tally.record(associativity(join, &a, &b, &c));

        let len = rng.gen_range(2..=config.max_sequence.max(2));
        let sequence: Vec<LatticeValue> = (0..len)
            .map(|_| generate_random_value(domain, samples, &mut rng))
            .collect();
        tally.record(order_independence(join, &sequence, &mut rng)?);
    }

    if !tally.violations.is_empty() {
        tracing::debug!(
            join = join.name(),
            violations = tally.violations.len(),
            contradiction_only = tally.violations.iter().all(|v| v.contradiction_only),
            "join broke its laws"
        );
    }

    Ok(LawCheckResult {
        join: join.name().to_string(),
        total_run: tally.total_run,
        passed: tally.passed,
        verdict: Verdict::of(&tally.violations),
        violations: tally.violations,
        random_seed: config.random_seed,
    })
}

#[derive(Default)]
struct Tally {
    total_run: u32,
    passed: u32,
    violations: Vec<LawViolation>,
}

impl Tally {
    fn record(&mut self, outcome: Option<LawViolation>) {
        self.total_run += 1;
        match outcome {
            None => self.passed += 1,
            Some(violation) => self.violations.push(violation),
        }
    }
}

fn compare(law: Law, operands: Vec<LatticeValue>, left: LatticeValue, right: LatticeValue) -> Option<LawViolation> {
    if left == right {
        None
    } else {
        Some(LawViolation {
            law,
            operands,
            contradiction_only: both_contradictions(&left, &right),
            left,
            right,
        })
    }
}

fn idempotence(join: &Join, a: &LatticeValue) -> Option<LawViolation> {
    compare(Law::Idempotence, vec![a.clone()], join.apply(a, a), a.clone())
}

fn commutativity(join: &Join, a: &LatticeValue, b: &LatticeValue) -> Option<LawViolation> {
    compare(
        Law::Commutativity,
        vec![a.clone(), b.clone()],
        join.apply(a, b),
        join.apply(b, a),
    )
}

fn associativity(
    join: &Join,
    a: &LatticeValue,
    b: &LatticeValue,
    c: &LatticeValue,
) -> Option<LawViolation> {
    compare(
        Law::Associativity,
        vec![a.clone(), b.clone(), c.clone()],
        join.apply(&join.apply(a, b), c),
        join.apply(a, &join.apply(b, c)),
    )
}

/// Feeds `sequence` into one fresh cell as given and into another shuffled.
fn order_independence(
    join: &Join,
    sequence: &[LatticeValue],
    rng: &mut ChaCha8Rng,
) -> Result<Option<LawViolation>, CoreError> {
    let mut shuffled = sequence.to_vec();
    shuffled.shuffle(rng);
    let left = settle(join, sequence)?;
    let right = settle(join, &shuffled)?;
    Ok(compare(Law::OrderIndependence, shuffled, left, right))
}

fn settle(join: &Join, values: &[LatticeValue]) -> Result<LatticeValue, CoreError> {
    let cell = Cell::new(join.clone());
    for value in values {
        cell.accept(value.clone(), None, None)?;
    }
    Ok(cell.value())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> LawCheckConfig {
        LawCheckConfig {
            iterations: 200,
            random_seed: seed,
            ..LawCheckConfig::default()
        }
    }

    #[test]
    fn builtin_joins_obey_the_laws() {
        for join in Join::builtins() {
            let result = run_law_checks(&join, config(7)).unwrap();
            assert_eq!(result.total_run, 200 * 4);
            if matches!(join, Join::SetIntersection) {
                assert_ne!(result.verdict, Verdict::Violated, "{:?}", result.violations.first());
            } else {
                assert!(
                    result.is_clean(),
                    "{} broke a law: {:?}",
                    join.name(),
                    result.violations.first()
                );
                assert_eq!(result.verdict, Verdict::Holds);
            }
        }
    }

    #[test]
    fn intersection_only_holds_up_to_contradiction() {
        let set = |items: &[i64]| LatticeValue::set(items.iter().map(|n| LatticeValue::from(*n)));
        let cfg = LawCheckConfig {
            samples: vec![set(&[1, 2]), set(&[2, 3]), set(&[3, 4])],
            iterations: 0,
            ..LawCheckConfig::default()
        };
        let result = run_law_checks(&Join::SetIntersection, cfg).unwrap();
        assert!(!result.is_clean());
        assert!(result.holds_up_to_contradiction());
        assert_eq!(result.verdict, Verdict::HoldsUpToContradiction);

        let broken = result
            .violations
            .iter()
            .find(|v| v.law == Law::Associativity)
            .expect("associativity counterexample");
        assert!(broken.contradiction_only);
        assert_ne!(broken.left, broken.right);
    }

    #[test]
    fn non_commutative_join_is_caught() {
        let first_wins = Join::custom("first_wins", |a, _| a.clone());
        let cfg = LawCheckConfig {
            samples: vec![1.into(), 2.into(), 3.into()],
            iterations: 0,
            ..LawCheckConfig::default()
        };
        let result = run_law_checks(&first_wins, cfg).unwrap();
        assert!(result
            .violations
            .iter()
            .any(|v| v.law == Law::Commutativity));
        assert!(result.passed < result.total_run);
    }

    #[test]
    fn non_idempotent_join_is_caught() {
        let sum = Join::custom("sum", |a, b| match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => LatticeValue::Number(x + y),
            _ => LatticeValue::contradiction(a.clone(), b.clone()),
        });
        let cfg = LawCheckConfig {
            samples: vec![1.into(), 2.into()],
            iterations: 0,
            ..LawCheckConfig::default()
        };
        let result = run_law_checks(&sum, cfg).unwrap();
        assert_eq!(result.verdict, Verdict::Violated);
        assert!(result.violations.iter().any(|v| v.law == Law::Idempotence));
        assert!(!result.violations.iter().any(|v| v.law == Law::Commutativity));
    }

    #[test]
    fn samples_run_before_random_rounds() {
        let cfg = LawCheckConfig {
            samples: vec![1.into(), 2.into()],
            iterations: 10,
            random_seed: 3,
            max_sequence: 4,
        };
        let result = run_law_checks(&Join::Max, cfg).unwrap();
        // 2 idempotence + 4 commutativity + 8 associativity + 1 order check,
        // then 4 checks per random round.
        assert_eq!(result.total_run, 2 + 4 + 8 + 1 + 10 * 4);
        assert!(result.is_clean());
    }

    #[test]
    fn same_seed_same_draws() {
        let mut a = ChaCha8Rng::seed_from_u64(11);
        let mut b = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..20 {
            assert_eq!(
                generate_random_value(ValueDomain::Sets, &[], &mut a),
                generate_random_value(ValueDomain::Sets, &[], &mut b)
            );
        }
    }

    #[test]
    fn samples_domain_without_samples_draws_null() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            generate_random_value(ValueDomain::Samples, &[], &mut rng),
            LatticeValue::Null
        );
    }
}
