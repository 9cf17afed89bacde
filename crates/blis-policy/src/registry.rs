// blis-policy/src/registry.rs
// ============================================================================
// Module: Policy Factories
// Description: Builds trait objects for the four policy kinds plus the
//              weighted-composite scorer catalogue.
// Purpose: `spec.md` §4.4/§9/§7: the four policy kinds are resolved through
//          Rust-enum-exhaustive factories, so "unknown kind" cannot reach
//          this layer as a runtime value — only the weighted-composite
//          scorer catalogue is stringly keyed by user configuration, and it
//          returns a typed error rather than aborting. True validation of
//          user-supplied names belongs to the configuration boundary
//          (`blis-config`), per the error-propagation table in `spec.md` §7.
// Dependencies: crate::{admission, composite, error, priority, routing,
//               scheduler, scorer}
// ============================================================================

use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;
use serde::Serialize;

use crate::admission::AdmissionPolicy;
use crate::admission::AlwaysAdmit;
use crate::admission::SloGated;
use crate::admission::TokenBucket;
use crate::composite::WeightedCompositeRouter;
use crate::error::PolicyError;
use crate::priority::AgeOnly;
use crate::priority::Constant;
use crate::priority::InvertedSlo;
use crate::priority::PriorityPolicy;
use crate::priority::SloBased;
use crate::routing::AlwaysBusiest;
use crate::routing::LeastLoaded;
use crate::routing::RoundRobin;
use crate::routing::RoutingPolicy;
use crate::scheduler::Fcfs;
use crate::scheduler::PriorityFcfs;
use crate::scheduler::ReversePriority;
use crate::scheduler::SchedulerPolicy;
use crate::scorer::CostBenefitScorer;
use crate::scorer::KvUtilizationScorer;
use crate::scorer::LoadBalanceScorer;
use crate::scorer::PrefixAffinityScorer;
use crate::scorer::QueueDelayEstimator;
use crate::scorer::Scorer;
use crate::scorer::SharedPrefixIndex;

// ============================================================================
// SECTION: Admission
// ============================================================================

/// Every admission policy kind this catalogue builds. Exhaustive: there is
/// no "unknown kind" value an `AdmissionKind` can hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdmissionKind {
    /// Admits every request unconditionally.
    AlwaysAdmit,
    /// Token-bucket admission with the given capacity and refill rate
    /// (tokens/second).
    TokenBucket {
        /// Bucket capacity in tokens.
        capacity: f64,
        /// Refill rate, tokens per second.
        refill_rate_per_sec: f64,
    },
    /// SLO-gated admission with a per-class queue-depth threshold map.
    SloGated {
        /// SLO-class key to maximum total queue depth before rejection.
        thresholds: HashMap<String, u32>,
    },
}

impl AdmissionKind {
    /// Builds the configured admission policy.
    #[must_use]
    pub fn build(self) -> Box<dyn AdmissionPolicy> {
        match self {
            Self::AlwaysAdmit => Box::new(AlwaysAdmit),
            Self::TokenBucket { capacity, refill_rate_per_sec } => Box::new(TokenBucket::new(capacity, refill_rate_per_sec)),
            Self::SloGated { thresholds } => Box::new(SloGated::new(thresholds)),
        }
    }
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Every scheduler policy kind this catalogue builds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// First-come, first-served.
    Fcfs,
    /// Shortest-job-first.
    Sjf,
    /// Priority descending, ties broken by arrival ascending.
    PriorityFcfs,
    /// Priority ascending: a pathological template.
    ReversePriority,
}

impl SchedulerKind {
    /// Builds the configured scheduler policy.
    #[must_use]
    pub fn build(self) -> Box<dyn SchedulerPolicy> {
        match self {
            Self::Fcfs => Box::new(Fcfs),
            Self::Sjf => Box::new(crate::scheduler::Sjf),
            Self::PriorityFcfs => Box::new(PriorityFcfs),
            Self::ReversePriority => Box::new(ReversePriority),
        }
    }
}

// ============================================================================
// SECTION: Priority
// ============================================================================

/// Every priority policy kind this catalogue builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriorityKind {
    /// Fixed priority for every request.
    Constant(f64),
    /// Pure age-based priority, ignoring SLO class (`spec.md` §9 open
    /// question: retained distinct from `SloClassTiered`).
    AgeOnly {
        /// Age coefficient.
        age_weight: f64,
    },
    /// SLO-class-tiered priority: base score per class plus age.
    SloClassTiered {
        /// Per-class base score.
        base: HashMap<String, f64>,
        /// Age coefficient.
        age_weight: f64,
    },
    /// Inverted age-based priority: a pathological template.
    InvertedSlo {
        /// Age coefficient, applied with a negative sign.
        age_weight: f64,
    },
}

impl PriorityKind {
    /// Builds the configured priority policy.
    #[must_use]
    pub fn build(self) -> Box<dyn PriorityPolicy> {
        match self {
            Self::Constant(value) => Box::new(Constant(value)),
            Self::AgeOnly { age_weight } => Box::new(AgeOnly { age_weight }),
            Self::SloClassTiered { base, age_weight } => Box::new(SloBased::new(base, age_weight)),
            Self::InvertedSlo { age_weight } => Box::new(InvertedSlo { age_weight }),
        }
    }
}

// ============================================================================
// SECTION: Scorer Catalogue
// ============================================================================

/// Shared construction inputs for scorers that need more than their name:
/// the prefix block size, the shared cache arena, and (for cost-benefit
/// only) a queue-delay estimator.
#[derive(Clone)]
pub struct ScorerCatalogContext {
    /// Prefix block size in tokens, shared by every prefix-consuming
    /// scorer so they hash identically.
    pub block_size: usize,
    /// Shared prefix-hit arena (`spec.md` §9 "cyclic relationship"
    /// resolution).
    pub prefix_index: SharedPrefixIndex,
    /// Estimated prefill time saved per matched block, for cost-benefit.
    pub block_latency_saving_us: f64,
    /// Backend-dependent queue-delay estimator, for cost-benefit.
    pub queue_delay_estimator: Option<Rc<dyn QueueDelayEstimator>>,
}

/// Resolves one configured scorer name into a boxed [`Scorer`]. This is the
/// one genuinely stringly-typed lookup in this crate (scorer names come
/// from user configuration); unrecognized names return
/// [`PolicyError::UnknownScorer`] rather than panicking.
///
/// # Errors
/// Returns [`PolicyError::UnknownScorer`] for an unrecognized `name`.
pub fn build_scorer(name: &str, ctx: &ScorerCatalogContext) -> Result<Box<dyn Scorer>, PolicyError> {
    match name {
        "prefix-affinity" => Ok(Box::new(PrefixAffinityScorer::new(ctx.block_size, Rc::clone(&ctx.prefix_index)))),
        "queue-depth" => Ok(Box::new(crate::scorer::QueueDepthScorer)),
        "kv-utilization" => Ok(Box::new(KvUtilizationScorer)),
        "load-balance" => Ok(Box::new(LoadBalanceScorer)),
        "cost-benefit" => {
            let estimator = ctx.queue_delay_estimator.clone().ok_or_else(|| PolicyError::UnknownScorer { name: name.to_owned() })?;
            Ok(Box::new(CostBenefitScorer::new(ctx.block_size, Rc::clone(&ctx.prefix_index), ctx.block_latency_saving_us, estimator)))
        }
        other => Err(PolicyError::UnknownScorer { name: other.to_owned() }),
    }
}

/// Builds every `(scorer, weight)` pair named in `specs` against one
/// shared [`ScorerCatalogContext`].
///
/// # Errors
/// Propagates [`PolicyError::UnknownScorer`] from [`build_scorer`].
pub fn build_scorers(specs: &[(String, f64)], ctx: &ScorerCatalogContext) -> Result<Vec<(Box<dyn Scorer>, f64)>, PolicyError> {
    specs.iter().map(|(name, weight)| build_scorer(name, ctx).map(|scorer| (scorer, *weight))).collect()
}

// ============================================================================
// SECTION: Routing
// ============================================================================

/// Every routing policy kind this catalogue builds. The weighted-composite
/// variant's scorers must already be constructed via [`build_scorers`];
/// this keeps the stringly-typed scorer lookup isolated to one place.
pub enum RoutingKind {
    /// Monotonic counter modulo the snapshot count.
    RoundRobin,
    /// Argmin of effective load.
    LeastLoaded,
    /// Weighted sum of normalized scorer outputs.
    WeightedComposite {
        /// Already-resolved `(scorer, weight)` pairs.
        scorers: Vec<(Box<dyn Scorer>, f64)>,
    },
    /// Argmax of effective load: a pathological template.
    AlwaysBusiest,
}

impl RoutingKind {
    /// Builds the configured routing policy.
    ///
    /// # Errors
    /// Propagates [`PolicyError::NoPositiveWeight`] or
    /// [`PolicyError::NegativeWeight`] from [`WeightedCompositeRouter::new`].
    pub fn build(self) -> Result<Box<dyn RoutingPolicy>, PolicyError> {
        match self {
            Self::RoundRobin => Ok(Box::new(RoundRobin::default())),
            Self::LeastLoaded => Ok(Box::new(LeastLoaded)),
            Self::WeightedComposite { scorers } => Ok(Box::new(WeightedCompositeRouter::new(scorers)?)),
            Self::AlwaysBusiest => Ok(Box::new(AlwaysBusiest)),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::scorer::PrefixCacheIndex;

    fn context() -> ScorerCatalogContext {
        ScorerCatalogContext {
            block_size: 16,
            prefix_index: Rc::new(RefCell::new(PrefixCacheIndex::new())),
            block_latency_saving_us: 100.0,
            queue_delay_estimator: None,
        }
    }

    #[test]
    fn unknown_scorer_name_is_an_error_not_a_panic() {
        let ctx = context();
        let result = build_scorer("not-a-real-scorer", &ctx);
        assert_eq!(result.err(), Some(PolicyError::UnknownScorer { name: "not-a-real-scorer".to_owned() }));
    }

    #[test]
    fn known_scorer_names_resolve() {
        let ctx = context();
        assert!(build_scorer("queue-depth", &ctx).is_ok());
        assert!(build_scorer("kv-utilization", &ctx).is_ok());
        assert!(build_scorer("load-balance", &ctx).is_ok());
        assert!(build_scorer("prefix-affinity", &ctx).is_ok());
    }

    #[test]
    fn cost_benefit_without_estimator_errors() {
        let ctx = context();
        assert!(build_scorer("cost-benefit", &ctx).is_err());
    }

    #[test]
    fn admission_kinds_build_without_panicking() {
        let _ = AdmissionKind::AlwaysAdmit.build();
        let _ = AdmissionKind::TokenBucket { capacity: 10.0, refill_rate_per_sec: 1.0 }.build();
        let _ = AdmissionKind::SloGated { thresholds: HashMap::new() }.build();
    }

    #[test]
    fn routing_kind_weighted_composite_rejects_bad_weights() {
        let ctx = context();
        let scorers = build_scorers(&[("queue-depth".to_owned(), 0.0)], &ctx).unwrap();
        let result = RoutingKind::WeightedComposite { scorers }.build();
        assert_eq!(result.err(), Some(PolicyError::NoPositiveWeight));
    }
}
