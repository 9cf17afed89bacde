// blis-latency/src/coefficients.rs
// ============================================================================
// Module: Coefficient Table
// Description: Keyed lookup from (model, hardware, tp) to per-backend
//              coefficient rows.
// Purpose: Keep backends pure functions of their constructor arguments;
//          the actual per-model benchmark data is deliberately out of
//          scope (spec.md §1) and supplied by the caller.
// Dependencies: serde, std::collections::HashMap
// ============================================================================

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Identifies one row in a [`CoefficientTable`]: a model name, a hardware
/// name, and a tensor-parallel degree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoefficientKey {
    /// Model identifier, e.g. `"llama-3-70b"`.
    pub model: String,
    /// Hardware identifier, e.g. `"h100-sxm"`.
    pub hardware: String,
    /// Tensor-parallel degree.
    pub tp: u32,
}

/// Linear coefficients for the blackbox backend's step and queueing models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackboxCoefficients {
    /// Fixed per-step overhead, in microseconds.
    pub beta0: f64,
    /// Per-cache-miss-token coefficient, in microseconds/token.
    pub beta1: f64,
    /// Per-decode-token coefficient, in microseconds/token.
    pub beta2: f64,
    /// Fixed queueing overhead, in microseconds.
    pub alpha0: f64,
    /// Per-input-token queueing coefficient, in microseconds/token.
    pub alpha1: f64,
    /// Constant queueing term folded in alongside `alpha1 * input_len`.
    pub alpha2_const: f64,
}

/// Analytical parameters for the roofline backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RooflineCoefficients {
    /// Peak compute throughput, in FLOPs/microsecond.
    pub peak_flops_per_us: f64,
    /// Peak memory bandwidth, in bytes/microsecond.
    pub peak_bandwidth_bytes_per_us: f64,
    /// Model parameter count, used to derive FLOPs and byte traffic per
    /// token.
    pub param_count: f64,
    /// Bytes per parameter at the configured precision (e.g. 2.0 for
    /// bf16).
    pub bytes_per_param: f64,
    /// Number of transformer layers, used to scale fixed per-layer CPU
    /// dispatch overhead.
    pub num_layers: u32,
    /// Fixed per-layer CPU dispatch overhead, in microseconds, at `tp = 1`.
    pub per_layer_cpu_overhead_us: f64,
    /// Achieved fraction of peak FLOPs (model FLOPs utilization), applied
    /// to the compute-bound estimate.
    pub mfu: f64,
}

/// A keyed table of per-`(model, hardware, tp)` coefficient rows, generic
/// over the coefficient row type so it serves both backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoefficientTable<T> {
    /// Backing storage, keyed by `(model, hardware, tp)`.
    rows: HashMap<CoefficientKey, T>,
}

impl<T> CoefficientTable<T> {
    /// Builds an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { rows: HashMap::new() }
    }

    /// Inserts or replaces the row for `key`.
    pub fn insert(&mut self, key: CoefficientKey, row: T) {
        self.rows.insert(key, row);
    }

    /// Looks up the row for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &CoefficientKey) -> Option<&T> {
        self.rows.get(key)
    }

    /// Number of rows in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
