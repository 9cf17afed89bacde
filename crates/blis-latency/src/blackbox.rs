// blis-latency/src/blackbox.rs
// ============================================================================
// Module: Blackbox Latency Backend
// Description: Linear-coefficient implementation of `LatencyBackend`.
// Purpose: The default backend named in `spec.md` §4.6: two linear models,
//          one for step duration and one for queueing overhead.
// Dependencies: crate::{coefficients, error, step, traits}
// ============================================================================

//! ## Overview
//! `step = beta0 + beta1 * cache_miss_tokens + beta2 * decode_tokens`.
//! `queueing_overhead = alpha0 + alpha1 * input_len + alpha2_const`.
//! Both are evaluated in floating point and rounded down to whole
//! microseconds; negative coefficient products are clamped to zero so a
//! misconfigured table cannot produce a negative duration.

use crate::coefficients::BlackboxCoefficients;
use crate::coefficients::CoefficientKey;
use crate::coefficients::CoefficientTable;
use crate::error::BackendError;
use crate::step::StepConfig;
use crate::traits::LatencyBackend;
use crate::traits::Microseconds;
use crate::traits::QueueingContext;

/// Linear blackbox backend: one coefficient table, one fixed key.
///
/// # Invariants
/// - `step_time` and `queueing_overhead` never return a negative quantity
///   (enforced by clamping each linear term at zero before summing).
#[derive(Debug, Clone)]
pub struct BlackboxBackend {
    key: CoefficientKey,
    table: CoefficientTable<BlackboxCoefficients>,
}

impl BlackboxBackend {
    /// Builds a backend bound to one `(model, hardware, tp)` key against a
    /// coefficient table supplied by the caller.
    #[must_use]
    pub const fn new(key: CoefficientKey, table: CoefficientTable<BlackboxCoefficients>) -> Self {
        Self { key, table }
    }

    /// Returns the coefficients for this backend's bound key.
    fn coefficients(&self) -> Result<&BlackboxCoefficients, BackendError> {
        self.table.get(&self.key).ok_or_else(|| BackendError::MissingCoefficients {
            model: self.key.model.clone(),
            hardware: self.key.hardware.clone(),
            tp: self.key.tp,
        })
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "batch token counts fit well within f64's exact integer range"
)]
#[allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    reason = "terms are clamped non-negative before truncation to whole microseconds"
)]
impl LatencyBackend for BlackboxBackend {
    fn step_time(&self, step_config: &StepConfig) -> Result<Microseconds, BackendError> {
        if step_config.prefill_requests.is_empty() && step_config.decode_requests.is_empty() {
            return Err(BackendError::EmptyStep);
        }
        let coefficients = self.coefficients()?;
        let cache_miss_term = coefficients.beta1 * f64::from(step_config.cache_miss_tokens);
        let decode_term = coefficients.beta2 * f64::from(step_config.decode_count());
        let total = (coefficients.beta0 + cache_miss_term + decode_term).max(0.0);
        Ok(total as Microseconds)
    }

    fn queueing_overhead(
        &self,
        context: QueueingContext,
        _now: Microseconds,
    ) -> Result<Microseconds, BackendError> {
        let coefficients = self.coefficients()?;
        let input_term = coefficients.alpha1 * f64::from(context.input_len);
        let total = (coefficients.alpha0 + input_term + coefficients.alpha2_const).max(0.0);
        Ok(total as Microseconds)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]
mod tests {
    use super::*;
    use crate::step::DecodeRequest;
    use crate::step::PrefillRequest;

    fn fixture_backend() -> BlackboxBackend {
        let key = CoefficientKey { model: "demo-7b".to_owned(), hardware: "a100".to_owned(), tp: 1 };
        let mut table = CoefficientTable::new();
        table.insert(
            key.clone(),
            BlackboxCoefficients {
                beta0: 500.0,
                beta1: 10.0,
                beta2: 25.0,
                alpha0: 100.0,
                alpha1: 0.5,
                alpha2_const: 50.0,
            },
        );
        BlackboxBackend::new(key, table)
    }

    #[test]
    fn step_time_is_linear_in_cache_miss_and_decode_tokens() {
        let backend = fixture_backend();
        let config = StepConfig {
            prefill_requests: vec![PrefillRequest { prompt_tokens: 100, cache_miss_tokens: 40 }],
            decode_requests: vec![DecodeRequest { kv_length: 10 }, DecodeRequest { kv_length: 20 }],
            total_batch_tokens: 102,
            cache_miss_tokens: 40,
            kv_lengths: vec![10, 20],
        };
        let duration = backend.step_time(&config).expect("coefficients present");
        assert_eq!(duration, 500 + 10 * 40 + 25 * 2);
    }

    #[test]
    fn step_time_rejects_empty_step() {
        let backend = fixture_backend();
        let empty = StepConfig::default();
        assert!(matches!(backend.step_time(&empty), Err(BackendError::EmptyStep)));
    }

    #[test]
    fn queueing_overhead_is_linear_in_input_len() {
        let backend = fixture_backend();
        let overhead = backend
            .queueing_overhead(QueueingContext { input_len: 200 }, 0)
            .expect("coefficients present");
        assert_eq!(overhead, 250);
        let overhead_longer = backend
            .queueing_overhead(QueueingContext { input_len: 1000 }, 0)
            .expect("coefficients present");
        assert!(overhead_longer > overhead);
    }

    #[test]
    fn missing_key_is_reported() {
        let table: CoefficientTable<BlackboxCoefficients> = CoefficientTable::new();
        let backend = BlackboxBackend::new(
            CoefficientKey { model: "absent".to_owned(), hardware: "none".to_owned(), tp: 1 },
            table,
        );
        let config = StepConfig {
            decode_requests: vec![DecodeRequest { kv_length: 1 }],
            ..StepConfig::default()
        };
        assert!(matches!(backend.step_time(&config), Err(BackendError::MissingCoefficients { .. })));
    }

    #[test]
    fn identical_inputs_yield_identical_output() {
        let backend = fixture_backend();
        let config = StepConfig {
            prefill_requests: vec![PrefillRequest { prompt_tokens: 50, cache_miss_tokens: 12 }],
            decode_requests: vec![DecodeRequest { kv_length: 5 }],
            total_batch_tokens: 51,
            cache_miss_tokens: 12,
            kv_lengths: vec![5],
        };
        let first = backend.step_time(&config).expect("coefficients present");
        let second = backend.step_time(&config).expect("coefficients present");
        assert_eq!(first, second);
    }
}
