// blis-trace/src/regret.rs
// ============================================================================
// Module: Counterfactual Regret
// Description: Per-decision regret computation and the Jain fairness index.
// Purpose: `spec.md` §4.7: for score-based routing, regret is structurally
//          zero; for score-less routing, fall back to `-effective_load` as
//          every candidate's score before taking `bestScore - chosenScore`.
// Dependencies: blis_core, blis_cluster
// ============================================================================

//! ## Overview
//! [`decision_regret`] mirrors the teacher's "narrow capability, named
//! factory" style by keeping the fallback-score decision local to this one
//! function rather than threading a `score_based` branch through every
//! caller. [`jain_fairness_index`] is the textbook
//! `(Σx)² / (n·Σx²)` formula over a per-instance count map, seeded with
//! every instance in the cluster (not just the ones that received traffic)
//! so a cold-start cascade onto one instance still reports fairness over
//! the full instance count (`spec.md` §8 scenario 1: "Jain fairness =
//! 0.25" for 4 instances, all traffic on one).

use std::collections::BTreeMap;

use blis_cluster::trace_sink::RoutingTraceRecord;
use blis_core::InstanceId;

/// One decision's regret inputs: the chosen instance's score and the best
/// score across every candidate (which may be the chosen one itself).
#[derive(Debug, Clone, Copy)]
pub struct DecisionRegret {
    /// Score assigned to the instance actually chosen.
    pub chosen_score: f64,
    /// Best score among every candidate instance at this decision.
    pub best_score: f64,
}

impl DecisionRegret {
    /// `bestScore - chosenScore` (`spec.md` §4.7). Exactly zero when the
    /// chosen instance was the argmax.
    #[must_use]
    pub fn regret(&self) -> f64 {
        self.best_score - self.chosen_score
    }
}

/// Computes one decision's regret, or `None` if the record carries no
/// candidate instances (an empty cluster, which never reaches a real run).
#[must_use]
pub fn decision_regret(record: &RoutingTraceRecord) -> Option<DecisionRegret> {
    if record.effective_loads.is_empty() {
        return None;
    }
    let score_of = |instance: InstanceId| -> f64 {
        if record.score_based {
            record.scores.get(&instance).copied().unwrap_or(f64::NEG_INFINITY)
        } else {
            -f64::from(record.effective_loads[&instance])
        }
    };
    let chosen_score = score_of(record.chosen);
    let best_score = record.effective_loads.keys().copied().map(score_of).fold(f64::NEG_INFINITY, f64::max);
    Some(DecisionRegret { chosen_score, best_score })
}

/// Jain fairness index of a per-instance target-count distribution,
/// `(Σx)² / (n·Σx²)`. `counts` must be seeded with every instance in the
/// cluster (zero for ones that never received traffic) so `n` is the true
/// instance count, not just the count of distinct keys observed.
#[must_use]
pub fn jain_fairness_index(counts: &BTreeMap<InstanceId, u64>) -> f64 {
    let n = counts.len();
    if n == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "request counts fit well within f64's exact integer range for realistic run sizes")]
    let (sum, sum_sq): (f64, f64) = counts.values().fold((0.0, 0.0), |(sum, sum_sq), &count| {
        let count = count as f64;
        (sum + count, sum_sq + count * count)
    });
    if sum_sq == 0.0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "instance counts fit well within f64's exact integer range for realistic cluster sizes")]
    let n = n as f64;
    (sum * sum) / (n * sum_sq)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use super::*;

    fn counts(values: &[(u32, u64)]) -> BTreeMap<InstanceId, u64> {
        values.iter().map(|&(id, count)| (InstanceId(id), count)).collect()
    }

    #[test]
    fn jain_fairness_of_a_full_cascade_onto_one_instance_is_a_quarter() {
        let distribution = counts(&[(0, 200), (1, 0), (2, 0), (3, 0)]);
        assert!((jain_fairness_index(&distribution) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn jain_fairness_of_a_perfectly_even_split_is_one() {
        let distribution = counts(&[(0, 50), (1, 50), (2, 50), (3, 50)]);
        assert!((jain_fairness_index(&distribution) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_based_regret_is_zero_when_chosen_is_the_argmax() {
        let mut scores = BTreeMap::new();
        scores.insert(InstanceId(0), 0.9);
        scores.insert(InstanceId(1), 0.2);
        let mut effective_loads = BTreeMap::new();
        effective_loads.insert(InstanceId(0), 3);
        effective_loads.insert(InstanceId(1), 1);
        let record = RoutingTraceRecord {
            timestamp: blis_core::Microseconds::ZERO,
            request_id: blis_core::RequestId(0),
            chosen: InstanceId(0),
            scores,
            score_based: true,
            effective_loads,
        };
        let regret = decision_regret(&record).expect("non-empty candidate set");
        assert!((regret.regret() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn score_less_regret_uses_negative_effective_load_as_fallback() {
        let mut effective_loads = BTreeMap::new();
        effective_loads.insert(InstanceId(0), 5);
        effective_loads.insert(InstanceId(1), 1);
        let record = RoutingTraceRecord {
            timestamp: blis_core::Microseconds::ZERO,
            request_id: blis_core::RequestId(0),
            chosen: InstanceId(0),
            scores: BTreeMap::new(),
            score_based: false,
            effective_loads,
        };
        let regret = decision_regret(&record).expect("non-empty candidate set");
        assert!((regret.regret() - 4.0).abs() < 1e-9);
    }
}
