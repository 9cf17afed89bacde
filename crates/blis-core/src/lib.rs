// blis-core/src/lib.rs
// ============================================================================
// Module: BLIS Core Library
// Description: Public API surface for the BLIS simulation core.
// Purpose: Expose shared domain types, the event queue, RNG partitioning,
//          and the prefix block hasher used by every other BLIS crate.
// Dependencies: crate::{ids, time, request, instance, snapshot, event,
//               hashing, rng, error}
// ============================================================================

//! ## Overview
//! `blis-core` defines the data model shared across the BLIS workspace: the
//! request lifecycle, per-instance state, router snapshots, the global event
//! queue, the prefix block hasher, and the deterministic RNG partitioning
//! scheme. It has no dependency on any policy, cache, or backend crate —
//! those consume `blis-core` types through their own trait boundaries.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod event;
pub mod hashing;
pub mod ids;
pub mod instance;
pub mod request;
pub mod rng;
pub mod snapshot;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::InvariantViolation;
pub use event::Event;
pub use event::EventKind;
pub use event::EventQueue;
pub use event::PriorityTier;
pub use event::SeqId;
pub use hashing::BlockHash;
pub use hashing::PrefixHasher;
pub use ids::ClientId;
pub use ids::InstanceId;
pub use ids::PrefixGroupId;
pub use ids::RequestId;
pub use ids::SessionId;
pub use ids::SloClass;
pub use ids::TenantId;
pub use instance::InstanceMetrics;
pub use instance::InstanceState;
pub use request::Request;
pub use request::RequestState;
pub use rng::RngPartition;
pub use rng::RngStreams;
pub use snapshot::RouterSnapshot;
pub use time::Microseconds;
