// blis-latency/src/roofline.rs
// ============================================================================
// Module: Roofline Latency Backend
// Description: Analytical compute-bound vs. memory-bound step pricing.
// Purpose: The second backend named in `spec.md` §4.6: take the max of a
//          compute-bound and a memory-bound estimate, add per-layer CPU
//          dispatch overhead, and optionally bucket prefill lengths to
//          power-of-2 MFU grid points.
// Dependencies: crate::{coefficients, error, step, traits}
// ============================================================================

//! ## Overview
//! For one step, the compute-bound time is `2 * param_count * tokens /
//! (peak_flops_per_us * mfu)` (the standard two-FLOPs-per-parameter-per-token
//! estimate) and the memory-bound time is
//! `param_count * bytes_per_param / peak_bandwidth_bytes_per_us` for the
//! weight read plus a per-token KV-read term for decode participants. The
//! step duration is the max of the two, plus `num_layers / tp` fixed CPU
//! dispatch overhead. Queueing overhead is the memory-bandwidth-bound time
//! to stream the model weights plus this request's own input bytes, since a
//! queued request's delay is dominated by the weight-read cost every step
//! ahead of it pays.

use crate::coefficients::CoefficientKey;
use crate::coefficients::CoefficientTable;
use crate::coefficients::RooflineCoefficients;
use crate::error::BackendError;
use crate::step::StepConfig;
use crate::traits::LatencyBackend;
use crate::traits::Microseconds;
use crate::traits::QueueingContext;

/// Rounds `tokens` up to the nearest power of two, for MFU grid bucketing.
/// Zero and one both map to one.
fn bucket_to_power_of_two(tokens: u32) -> u32 {
    tokens.max(1).next_power_of_two()
}

/// Analytical roofline backend bound to one `(model, hardware, tp)` key.
///
/// # Invariants
/// - `step_time` and `queueing_overhead` never return a negative quantity.
/// - With `bucket_prefill` enabled, two steps whose prefill token counts
///   round to the same power of two price identically.
#[derive(Debug, Clone)]
pub struct RooflineBackend {
    key: CoefficientKey,
    table: CoefficientTable<RooflineCoefficients>,
    bucket_prefill: bool,
}

impl RooflineBackend {
    /// Builds a backend bound to one `(model, hardware, tp)` key. When
    /// `bucket_prefill` is set, prefill token counts are rounded up to the
    /// nearest power of two before pricing, matching hardware kernels that
    /// only ship tuned variants for power-of-2 sequence lengths.
    #[must_use]
    pub const fn new(
        key: CoefficientKey,
        table: CoefficientTable<RooflineCoefficients>,
        bucket_prefill: bool,
    ) -> Self {
        Self { key, table, bucket_prefill }
    }

    fn coefficients(&self) -> Result<&RooflineCoefficients, BackendError> {
        self.table.get(&self.key).ok_or_else(|| BackendError::MissingCoefficients {
            model: self.key.model.clone(),
            hardware: self.key.hardware.clone(),
            tp: self.key.tp,
        })
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "token and layer counts fit well within f64's exact integer range"
)]
#[allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    reason = "analytical estimates are clamped non-negative before truncation to whole microseconds"
)]
impl LatencyBackend for RooflineBackend {
    fn step_time(&self, step_config: &StepConfig) -> Result<Microseconds, BackendError> {
        if step_config.prefill_requests.is_empty() && step_config.decode_requests.is_empty() {
            return Err(BackendError::EmptyStep);
        }
        let coefficients = self.coefficients()?;

        let prefill_tokens: u32 = step_config.prefill_requests.iter().map(|request| request.prompt_tokens).sum();
        let priced_prefill_tokens =
            if self.bucket_prefill { bucket_to_power_of_two(prefill_tokens) } else { prefill_tokens };
        let decode_tokens = step_config.decode_count();
        let total_tokens = priced_prefill_tokens + decode_tokens;

        let compute_bound = (2.0 * coefficients.param_count * f64::from(total_tokens))
            / (coefficients.peak_flops_per_us * coefficients.mfu.max(f64::EPSILON));

        let weight_bytes = coefficients.param_count * coefficients.bytes_per_param;
        let kv_read_bytes: f64 =
            step_config.kv_lengths.iter().map(|length| f64::from(*length) * coefficients.bytes_per_param).sum();
        let memory_bound = (weight_bytes + kv_read_bytes) / coefficients.peak_bandwidth_bytes_per_us;

        let tp = self.key.tp.max(1);
        let cpu_overhead =
            coefficients.per_layer_cpu_overhead_us * f64::from(coefficients.num_layers) / f64::from(tp);

        let total = (compute_bound.max(memory_bound) + cpu_overhead).max(0.0);
        Ok(total as Microseconds)
    }

    fn queueing_overhead(
        &self,
        context: QueueingContext,
        _now: Microseconds,
    ) -> Result<Microseconds, BackendError> {
        let coefficients = self.coefficients()?;
        let input_len =
            if self.bucket_prefill { bucket_to_power_of_two(context.input_len) } else { context.input_len };
        let weight_bytes = coefficients.param_count * coefficients.bytes_per_param;
        let input_bytes = coefficients.bytes_per_param * f64::from(input_len);
        let total = ((weight_bytes + input_bytes) / coefficients.peak_bandwidth_bytes_per_us).max(0.0);
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

    fn fixture_coefficients() -> RooflineCoefficients {
        RooflineCoefficients {
            peak_flops_per_us: 1_000_000.0,
            peak_bandwidth_bytes_per_us: 2_000_000.0,
            param_count: 7_000_000_000.0,
            bytes_per_param: 2.0,
            num_layers: 32,
            per_layer_cpu_overhead_us: 0.1,
            mfu: 0.4,
        }
    }

    fn fixture_backend(bucket_prefill: bool) -> RooflineBackend {
        let key = CoefficientKey { model: "demo-7b".to_owned(), hardware: "h100".to_owned(), tp: 2 };
        let mut table = CoefficientTable::new();
        table.insert(key.clone(), fixture_coefficients());
        RooflineBackend::new(key, table, bucket_prefill)
    }

    #[test]
    fn step_time_takes_the_max_of_compute_and_memory_bound() {
        let backend = fixture_backend(false);
        let config = StepConfig {
            prefill_requests: vec![PrefillRequest { prompt_tokens: 2048, cache_miss_tokens: 2048 }],
            decode_requests: vec![],
            total_batch_tokens: 2048,
            cache_miss_tokens: 2048,
            kv_lengths: vec![],
        };
        let duration = backend.step_time(&config).expect("coefficients present");
        assert!(duration > 0);
    }

    #[test]
    fn bucketing_makes_nearby_prefill_lengths_price_identically() {
        let backend = fixture_backend(true);
        let smaller = StepConfig {
            prefill_requests: vec![PrefillRequest { prompt_tokens: 130, cache_miss_tokens: 130 }],
            decode_requests: vec![],
            total_batch_tokens: 130,
            cache_miss_tokens: 130,
            kv_lengths: vec![],
        };
        let larger = StepConfig {
            prefill_requests: vec![PrefillRequest { prompt_tokens: 256, cache_miss_tokens: 256 }],
            decode_requests: vec![],
            total_batch_tokens: 256,
            cache_miss_tokens: 256,
            kv_lengths: vec![],
        };
        let smaller_duration = backend.step_time(&smaller).expect("coefficients present");
        let larger_duration = backend.step_time(&larger).expect("coefficients present");
        assert_eq!(smaller_duration, larger_duration);
    }

    #[test]
    fn decode_participants_add_kv_read_bandwidth_cost() {
        let backend = fixture_backend(false);
        let without_decode = StepConfig {
            prefill_requests: vec![PrefillRequest { prompt_tokens: 64, cache_miss_tokens: 64 }],
            decode_requests: vec![],
            total_batch_tokens: 64,
            cache_miss_tokens: 64,
            kv_lengths: vec![],
        };
        let with_decode = StepConfig {
            prefill_requests: vec![PrefillRequest { prompt_tokens: 64, cache_miss_tokens: 64 }],
            decode_requests: vec![DecodeRequest { kv_length: 100_000 }],
            total_batch_tokens: 65,
            cache_miss_tokens: 64,
            kv_lengths: vec![100_000],
        };
        let base = backend.step_time(&without_decode).expect("coefficients present");
        let with_kv = backend.step_time(&with_decode).expect("coefficients present");
        assert!(with_kv >= base);
    }

    #[test]
    fn missing_key_is_reported() {
        let table: CoefficientTable<RooflineCoefficients> = CoefficientTable::new();
        let backend = RooflineBackend::new(
            CoefficientKey { model: "absent".to_owned(), hardware: "none".to_owned(), tp: 1 },
            table,
            false,
        );
        let config = StepConfig {
            decode_requests: vec![DecodeRequest { kv_length: 1 }],
            ..StepConfig::default()
        };
        assert!(matches!(backend.step_time(&config), Err(BackendError::MissingCoefficients { .. })));
    }
}
