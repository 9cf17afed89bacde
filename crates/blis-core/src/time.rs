// blis-core/src/time.rs
// ============================================================================
// Module: Simulated Time
// Description: Microsecond-resolution simulated clock value.
// Purpose: Give the event queue and every duration computation a single,
//          non-wall-clock unit of time.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! All simulated time is counted in microseconds since the start of the run.
//! `Microseconds` never reads the OS clock; every value is either `0` (the
//! start of the run) or derived by adding a duration computed by a pure
//! function (a latency backend, an arrival process) to an existing value.

use std::fmt;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Sub;

use serde::Deserialize;
use serde::Serialize;

/// A point in simulated time, in microseconds since the run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Microseconds(pub u64);

impl Microseconds {
    /// The origin of simulated time.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from a raw microsecond count.
    #[must_use]
    pub const fn new(micros: u64) -> Self {
        Self(micros)
    }

    /// Returns the raw microsecond count.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns this value as milliseconds (for the results contract, which
    /// reports latency in milliseconds while configuration stays in
    /// microseconds).
    #[must_use]
    pub fn as_millis_f64(self) -> f64 {
        // Precision loss below a nanosecond is immaterial at simulation
        // scale; this conversion is only ever used for reporting, never fed
        // back into scheduling decisions.
        #[allow(clippy::cast_precision_loss, reason = "reporting-only conversion")]
        let micros = self.0 as f64;
        micros / 1000.0
    }

    /// Saturating addition of a duration in microseconds.
    #[must_use]
    pub const fn saturating_add(self, delta: u64) -> Self {
        Self(self.0.saturating_add(delta))
    }
}

impl fmt::Display for Microseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl Add<u64> for Microseconds {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for Microseconds {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for Microseconds {
    type Output = u64;

    /// Returns the elapsed microseconds between two timestamps, saturating
    /// at zero if `self` precedes `rhs`. Clock monotonicity (INV-5)
    /// guarantees `self >= rhs` for timestamps drawn from the event queue
    /// in pop order.
    fn sub(self, rhs: Self) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}
