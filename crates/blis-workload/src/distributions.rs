// blis-workload/src/distributions.rs
// ============================================================================
// Module: Length & Arrival Distributions
// Description: The small distribution families a client spec selects from.
// Purpose: `spec.md` §4.5: arrival process {Poisson | Gamma(CV)}, length
//          distribution {constant | Gaussian | exponential | pareto-lognormal}.
// Dependencies: rand, rand_distr, serde
// ============================================================================

//! ## Overview
//! Every distribution is sampled through a caller-owned [`rand::RngCore`],
//! never its own RNG, so the determinism contract (one seeded stream per
//! client, per `blis-core::rng`) holds regardless of which distribution a
//! client picks. Length distributions clamp their draw to `[min, max]`
//! after sampling.

use rand::Rng;
use rand_distr::Distribution as _;
use rand_distr::Exp;
use rand_distr::Gamma;
use rand_distr::LogNormal;
use rand_distr::Normal;
use rand_distr::Pareto;
use serde::Deserialize;
use serde::Serialize;

/// The inter-arrival process a client's arrivals are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArrivalProcess {
    /// Memoryless arrivals at a fixed rate.
    Poisson,
    /// Renewal process with coefficient-of-variation `cv` (cv=1 recovers
    /// Poisson; cv>1 is burstier).
    Gamma {
        /// Coefficient of variation of the inter-arrival gap.
        cv: f64,
    },
}

impl ArrivalProcess {
    /// Samples one inter-arrival gap in microseconds for a Poisson process
    /// running at `rate_per_second`.
    fn sample_gap_us<R: Rng + ?Sized>(self, rate_per_second: f64, rng: &mut R) -> f64 {
        let rate_per_us = rate_per_second / 1_000_000.0;
        let mean_gap_us = 1.0 / rate_per_us.max(f64::EPSILON);
        match self {
            Self::Poisson => Exp::new(1.0 / mean_gap_us).map_or(mean_gap_us, |distribution| distribution.sample(rng)),
            Self::Gamma { cv } => {
                let cv = cv.max(1e-6);
                let shape = 1.0 / (cv * cv);
                let scale = mean_gap_us / shape;
                Gamma::new(shape, scale)
                    .map_or(mean_gap_us, |distribution| distribution.sample(rng))
            }
        }
    }

    /// Samples the next arrival timestamp (microseconds) after `previous`.
    #[must_use]
    pub fn next_arrival_us<R: Rng + ?Sized>(self, previous_us: f64, rate_per_second: f64, rng: &mut R) -> f64 {
        previous_us + self.sample_gap_us(rate_per_second, rng)
    }
}

/// The token-length distribution a client's input or output lengths are
/// drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LengthDistribution {
    /// Every draw returns `value`.
    Constant {
        /// The fixed length.
        value: u32,
    },
    /// Normal distribution clamped to `[min, max]`.
    Gaussian {
        /// Mean token length.
        mean: f64,
        /// Standard deviation.
        std: f64,
        /// Lower clamp bound.
        min: u32,
        /// Upper clamp bound.
        max: u32,
    },
    /// Exponential distribution clamped to `[min, max]`.
    Exponential {
        /// Mean token length.
        mean: f64,
        /// Lower clamp bound.
        min: u32,
        /// Upper clamp bound.
        max: u32,
    },
    /// Pareto-lognormal mixture: a heavy Pareto tail grafted onto a
    /// lognormal body, clamped to `[min, max]`. Models the short-body,
    /// long-tail shape real prompt/response length corpora exhibit.
    ParetoLogNormal {
        /// Lognormal body mean (in log-space).
        body_mean: f64,
        /// Lognormal body standard deviation (in log-space).
        body_std: f64,
        /// Pareto shape parameter for the tail.
        tail_shape: f64,
        /// Fraction of draws taken from the tail rather than the body.
        tail_fraction: f64,
        /// Lower clamp bound.
        min: u32,
        /// Upper clamp bound.
        max: u32,
    },
}

impl LengthDistribution {
    /// Samples one token length, clamped to this distribution's bounds.
    #[must_use]
    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> u32 {
        let (raw, min, max) = match self {
            Self::Constant { value } => return value,
            Self::Gaussian { mean, std, min, max } => {
                let raw = Normal::new(mean, std.max(f64::EPSILON)).map_or(mean, |distribution| distribution.sample(rng));
                (raw, min, max)
            }
            Self::Exponential { mean, min, max } => {
                let raw = Exp::new(1.0 / mean.max(f64::EPSILON)).map_or(mean, |distribution| distribution.sample(rng));
                (raw, min, max)
            }
            Self::ParetoLogNormal { body_mean, body_std, tail_shape, tail_fraction, min, max } => {
                let raw = if rng.gen::<f64>() < tail_fraction {
                    Pareto::new(f64::from(min).max(1.0), tail_shape.max(1.01))
                        .map_or(f64::from(min), |distribution| distribution.sample(rng))
                } else {
                    LogNormal::new(body_mean, body_std.max(f64::EPSILON))
                        .map_or(body_mean.exp(), |distribution| distribution.sample(rng))
                };
                (raw, min, max)
            }
        };
        clamp_to_range(raw, min, max)
    }
}

/// Clamps a floating-point draw into `[min, max]`, rounding down and
/// guarding against negative or non-finite draws.
#[allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    reason = "draw is clamped non-negative and bounded by max before truncation"
)]
fn clamp_to_range(raw: f64, min: u32, max: u32) -> u32 {
    if !raw.is_finite() || raw <= 0.0 {
        return min;
    }
    let rounded = raw as u32;
    rounded.clamp(min, max)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn constant_distribution_never_varies() {
        let mut rng = StdRng::seed_from_u64(1);
        let distribution = LengthDistribution::Constant { value: 128 };
        for _ in 0..10 {
            assert_eq!(distribution.sample(&mut rng), 128);
        }
    }

    #[test]
    fn gaussian_respects_clamp_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        let distribution = LengthDistribution::Gaussian { mean: 100.0, std: 1000.0, min: 10, max: 50 };
        for _ in 0..50 {
            let sample = distribution.sample(&mut rng);
            assert!((10..=50).contains(&sample));
        }
    }

    #[test]
    fn poisson_arrivals_are_monotonically_increasing() {
        let mut rng = StdRng::seed_from_u64(3);
        let process = ArrivalProcess::Poisson;
        let mut timestamp = 0.0;
        for _ in 0..20 {
            let next = process.next_arrival_us(timestamp, 100.0, &mut rng);
            assert!(next > timestamp);
            timestamp = next;
        }
    }
}
