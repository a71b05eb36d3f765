//! Scheduling policies
//!
//! Implements the policies to compare:
//! - NaiveAdmission (`NRAP`): admit everything profitable, run in arrival order
//! - RankedQueue (`PQ(..)`): one ordered queue with a configurable rank key
//! - PessimisticPreemptiveQueue (`PPPQ(..)`): protected hot queue guarded by a
//!   preemption threshold and a pessimistic slack check
//!
//! A policy is instantiated once per run. It owns only job ids; the job
//! states live in the simulation's [`Buffer`].

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::model::{JobId, JobState, JobTemplate, ModelParameters, Slot, trim_float};

mod naive;
mod pessimistic;
mod ranked;

pub use naive::NaiveAdmission;
pub use pessimistic::{PessimisticPreemptiveQueue, PppqParameterSource, PppqParameters};
pub use ranked::{RankKey, RankedQueue};

/// What a policy may observe about the simulation besides the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotContext {
    pub current_slot: Slot,
    pub machines_ready: usize,
}

/// Per-run policy instance
pub trait Policy {
    /// Decide which arriving jobs enter the buffer
    fn handle_arrival(&mut self, ctx: &SlotContext, arriving: Vec<JobState>, buffer: &mut Buffer);

    /// Jobs to run this slot, at most `ctx.machines_ready` of them
    fn select_for_processing(&mut self, ctx: &SlotContext, buffer: &Buffer) -> Vec<JobId>;

    /// Called after the selected jobs have been processed, before completed
    /// jobs leave the buffer
    fn handle_processing_finished(&mut self, ctx: &SlotContext, buffer: &Buffer);

    /// Machines the policy wants allocated before processing
    fn predict_processing_capacity(&self, ctx: &SlotContext, buffer: &Buffer) -> usize;

    /// Jobs removed from the buffer by the simulation (completed or expired)
    fn handle_buffer_leave(&mut self, ctx: &SlotContext, leaving: &[JobState]);
}

/// Value per slot of running the job on an already paid-for machine
pub fn hot_unit_value(job: &JobTemplate, params: &ModelParameters) -> f64 {
    job.value / job.initial_processing_time as f64 - params.maintenance_cost
}

/// Value per slot of running the job on a freshly allocated machine
pub fn cold_unit_value(job: &JobTemplate, params: &ModelParameters) -> f64 {
    (job.value - params.allocation_cost) / job.initial_processing_time as f64
        - params.maintenance_cost
}

/// Whether a job could possibly be worth running
pub fn is_admissible(job: &JobTemplate, params: &ModelParameters) -> bool {
    hot_unit_value(job, params) > 0.0
}

/// Totally ordered float key, smaller is better
#[derive(Debug, Clone, Copy)]
pub struct Priority(pub f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Queue entry: priority first, job id breaks ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ranked {
    pub priority: Priority,
    pub id: JobId,
}

impl Ranked {
    pub fn new(priority: f64, id: JobId) -> Self {
        Ranked {
            priority: Priority(priority),
            id,
        }
    }
}

/// The closed set of policies, with their configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicySpec {
    NaiveAdmission,
    RankedQueue(RankKey),
    PessimisticPreemptive {
        source: PppqParameterSource,
        work_conservative: bool,
    },
}

impl PolicySpec {
    /// Create a fresh instance for one run.
    ///
    /// `pppq` holds the resolved factors; only the pessimistic policy reads it.
    pub fn instantiate(&self, params: &ModelParameters, pppq: PppqParameters) -> Box<dyn Policy> {
        match self {
            PolicySpec::NaiveAdmission => Box::new(NaiveAdmission::new(*params)),
            PolicySpec::RankedQueue(key) => Box::new(RankedQueue::new(*params, *key)),
            PolicySpec::PessimisticPreemptive {
                work_conservative, ..
            } => Box::new(PessimisticPreemptiveQueue::new(
                *params,
                pppq,
                *work_conservative,
            )),
        }
    }

    /// Parameters fixed at configuration time, if any
    pub fn fixed_parameters(&self) -> PppqParameters {
        match self {
            PolicySpec::PessimisticPreemptive {
                source: PppqParameterSource::Fixed(fixed),
                ..
            } => *fixed,
            _ => PppqParameters::default(),
        }
    }
}

impl fmt::Display for PolicySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySpec::NaiveAdmission => write!(f, "NRAP"),
            PolicySpec::RankedQueue(key) => write!(f, "PQ({})", key),
            PolicySpec::PessimisticPreemptive {
                source,
                work_conservative,
            } => {
                let suffix = if *work_conservative { ":wc" } else { "" };
                match source {
                    PppqParameterSource::Fixed(fixed) => write!(
                        f,
                        "PPPQ({}:{}{})",
                        trim_float(fixed.pessimistic_factor),
                        trim_float(fixed.preemption_factor),
                        suffix
                    ),
                    PppqParameterSource::Cushion(cushion) => {
                        write!(f, "PPPQ({}{})", trim_float(*cushion), suffix)
                    }
                    PppqParameterSource::InputOptimal => write!(f, "PPPQ(opt{})", suffix),
                    PppqParameterSource::Controlled => write!(f, "PPPQ(var{})", suffix),
                }
            }
        }
    }
}
