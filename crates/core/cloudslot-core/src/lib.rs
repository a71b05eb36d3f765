//! Cloudslot Core - Slot-based scheduling simulation
//!
//! Replays job arrivals through a datacenter whose machines take a fixed
//! number of slots to provision, and tallies what a scheduling policy earns
//! against what its machines cost.
//!
//! Key types:
//! - Simulation (per-slot admission, allocation, processing, expiration)
//! - Policy trait and the built-in policies (NRAP, PQ, PPPQ)
//! - ResourceManager (pending/ready machine pool)
//! - ExpirationManager and PointedSet (the indices the policies build on)
//! - Accounting (cost and revenue ledger)

pub mod accounting;
pub mod buffer;
pub mod error;
pub mod expiration;
pub mod model;
pub mod pointed;
pub mod policies;
pub mod resources;
pub mod simulation;

pub use accounting::Accounting;
pub use buffer::Buffer;
pub use error::{Result, SimError};
pub use expiration::ExpirationManager;
pub use model::{JobId, JobState, JobTemplate, ModelParameters, Slot, trim_float, validate_time_slots};
pub use pointed::PointedSet;
pub use policies::{
    NaiveAdmission, PessimisticPreemptiveQueue, Policy, PolicySpec, PppqParameterSource,
    PppqParameters, RankKey, RankedQueue, SlotContext,
};
pub use resources::ResourceManager;
pub use simulation::{SlotSummary, Simulation};
