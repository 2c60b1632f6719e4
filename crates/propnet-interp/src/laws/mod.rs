//! Join-law checking.
//!
//! A cell only settles if its join is associative, commutative and
//! idempotent. [`check::run_law_checks`] verifies those laws for any [`Join`]
//! over caller-supplied samples plus seeded random draws, and also feeds
//! random permutations of a value sequence into fresh cells to confirm the
//! final output does not depend on arrival order.
//!
//! Results are compared exactly. A counterexample whose two sides are both
//! contradictions, with different operands, is flagged `contradiction_only`:
//! the law holds up to contradiction there. Set intersection is such a join,
//! since `({1,2} ⊓ {2,3}) ⊓ {3,4}` and `{1,2} ⊓ ({2,3} ⊓ {3,4})` fail on
//! different operands.

pub mod check;

use propnet_core::{CoreError, Join, LatticeValue};
use serde::{Deserialize, Serialize};

pub use check::{generate_random_value, run_law_checks, ValueDomain};

/// The law a counterexample breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Law {
    /// `(a ⊔ b) ⊔ c == a ⊔ (b ⊔ c)`
    Associativity,
    /// `a ⊔ b == b ⊔ a`
    Commutativity,
    /// `a ⊔ a == a`
    Idempotence,
    /// A cell fed a sequence in two different orders ends at the same value.
    OrderIndependence,
}

/// Configuration for a law-check run.
#[derive(Debug, Clone)]
pub struct LawCheckConfig {
    /// Hand-picked operands. Every pair and triple is checked before any
    /// random draw.
    pub samples: Vec<LatticeValue>,
    /// Number of random rounds.
    pub iterations: u32,
    /// Seed for the random rounds.
    pub random_seed: u64,
    /// Longest sequence used for the order-independence check.
    pub max_sequence: usize,
}

impl Default for LawCheckConfig {
    fn default() -> Self {
        LawCheckConfig {
            samples: Vec::new(),
            iterations: 100,
            random_seed: 0,
            max_sequence: 8,
        }
    }
}

/// A single counterexample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawViolation {
    pub law: Law,
    pub operands: Vec<LatticeValue>,
    /// The two results that should have agreed.
    pub left: LatticeValue,
    pub right: LatticeValue,
    /// Both results are contradictions; only their operands differ.
    pub contradiction_only: bool,
}

/// Overall outcome of a law-check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every check agreed exactly.
    Holds,
    /// Every disagreement was between two contradictions.
    HoldsUpToContradiction,
    /// At least one check disagreed on a non-contradiction result.
    Violated,
}

impl Verdict {
    pub fn of(violations: &[LawViolation]) -> Self {
        if violations.is_empty() {
            Verdict::Holds
        } else if violations.iter().all(|v| v.contradiction_only) {
            Verdict::HoldsUpToContradiction
        } else {
            Verdict::Violated
        }
    }
}

/// Result of a law-check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawCheckResult {
    /// Name of the join under test.
    pub join: String,
    pub total_run: u32,
    pub passed: u32,
    pub violations: Vec<LawViolation>,
    pub verdict: Verdict,
    /// The seed used, for reproduction.
    pub random_seed: u64,
}

impl LawCheckResult {
    /// Every check agreed exactly.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn holds_up_to_contradiction(&self) -> bool {
        self.verdict != Verdict::Violated
    }
}

/// Both values are contradictions, whatever their operands.
pub fn both_contradictions(a: &LatticeValue, b: &LatticeValue) -> bool {
    a.is_contradiction() && b.is_contradiction()
}

/// Checks a built-in join looked up by name.
pub fn check_builtin(name: &str, config: LawCheckConfig) -> Result<LawCheckResult, CoreError> {
    let join = Join::builtin(name).ok_or_else(|| CoreError::UnknownKind {
        kind: name.to_string(),
    })?;
    run_law_checks(&join, config)
}
