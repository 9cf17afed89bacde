// blis-workload/src/lib.rs
// ============================================================================
// Module: BLIS Workload Stream Library
// Description: Public API surface for the workload-spec DSL and generator.
// Purpose: `spec.md` §4.5: produce a finite ordered sequence of
//          `ClusterArrival` events with deterministic request contents.
// Dependencies: crate::{spec, distributions, content, generator, error}
// ============================================================================

//! ## Overview
//! A [`spec::WorkloadSpec`] describes a client roster declaratively;
//! [`generator::WorkloadGenerator`] turns it into request arrivals, seeded
//! entirely from one master seed so reruns are byte-identical
//! (`spec.md` §4.5 determinism contract).

pub mod content;
pub mod distributions;
pub mod error;
pub mod generator;
pub mod spec;

pub use content::fnv1a;
pub use distributions::ArrivalProcess;
pub use distributions::LengthDistribution;
pub use error::WorkloadError;
pub use generator::GeneratedArrival;
pub use generator::WorkloadGenerator;
pub use spec::ClientSpec;
pub use spec::ContextGrowth;
pub use spec::MultiTurnSpec;
pub use spec::PrefixGroupSpec;
pub use spec::WorkloadSpec;
