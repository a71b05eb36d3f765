//! Core types for the simulation engine

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Stable job identifier
pub type JobId = u64;

/// Discrete time, measured in slots
pub type Slot = i64;

/// An immutable job as it arrives from the input
///
/// Identity and equality are by `id` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplate {
    pub id: JobId,
    pub release_time: Slot,
    /// Relative to `release_time`
    pub deadline: Slot,
    pub value: f64,
    pub initial_processing_time: Slot,
}

impl JobTemplate {
    pub fn new(
        id: JobId,
        release_time: Slot,
        deadline: Slot,
        value: f64,
        initial_processing_time: Slot,
    ) -> Self {
        JobTemplate {
            id,
            release_time,
            deadline,
            value,
            initial_processing_time,
        }
    }

    /// Absolute slot by which the job must have completed
    pub fn absolute_deadline(&self) -> Slot {
        self.release_time + self.deadline
    }

    /// Ratio of the deadline to the processing time
    pub fn deadline_cushion(&self) -> f64 {
        self.deadline as f64 / self.initial_processing_time as f64
    }

    /// Check the input-boundary preconditions
    pub fn validate(&self) -> Result<()> {
        if self.initial_processing_time <= 0 {
            return Err(SimError::job(self.id, "processing time must be positive"));
        }
        if self.deadline < 0 {
            return Err(SimError::job(self.id, "deadline must be non-negative"));
        }
        if self.release_time < 0 {
            return Err(SimError::job(self.id, "release time must be non-negative"));
        }
        if !(self.value >= 0.0) {
            return Err(SimError::job(self.id, "value must be non-negative"));
        }
        Ok(())
    }
}

impl PartialEq for JobTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JobTemplate {}

impl Hash for JobTemplate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Validate a whole input: every job well formed, released in the slot it
/// arrives in, ids unique
pub fn validate_time_slots(slots: &[Vec<JobTemplate>]) -> Result<()> {
    let mut seen = HashSet::new();
    for (slot, jobs) in slots.iter().enumerate() {
        for job in jobs {
            job.validate()?;
            if job.release_time != slot as Slot {
                return Err(SimError::ReleaseMismatch {
                    id: job.id,
                    release_time: job.release_time,
                    slot: slot as Slot,
                });
            }
            if !seen.insert(job.id) {
                return Err(SimError::DuplicateJob(job.id));
            }
        }
    }
    Ok(())
}

/// Per-run mutable state of a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub template: JobTemplate,
    remaining_processing_time: Slot,
}

impl JobState {
    pub fn new(template: JobTemplate) -> Self {
        let remaining_processing_time = template.initial_processing_time;
        JobState {
            template,
            remaining_processing_time,
        }
    }

    pub fn id(&self) -> JobId {
        self.template.id
    }

    pub fn remaining_processing_time(&self) -> Slot {
        self.remaining_processing_time
    }

    /// Slots left until the absolute deadline, as seen from `current_slot`
    pub fn remaining_deadline(&self, current_slot: Slot) -> Slot {
        self.template.absolute_deadline() - current_slot
    }

    pub fn is_completed(&self) -> bool {
        self.remaining_processing_time == 0
    }

    /// Run the job for one slot
    pub(crate) fn process(&mut self) {
        assert!(
            self.remaining_processing_time > 0,
            "job {} processed after completion",
            self.template.id
        );
        self.remaining_processing_time -= 1;
    }
}

/// Datacenter cost model, fixed for a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Slots a requested machine spends pending
    pub vm_allocation_delay: u32,
    pub max_machines: usize,
    pub allocation_cost: f64,
    /// Cost of one ready machine for one slot
    pub maintenance_cost: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        ModelParameters {
            vm_allocation_delay: 0,
            max_machines: 0,
            allocation_cost: 0.0,
            maintenance_cost: 0.0,
        }
    }
}

impl ModelParameters {
    pub fn new(
        vm_allocation_delay: u32,
        max_machines: usize,
        allocation_cost: f64,
        maintenance_cost: f64,
    ) -> Self {
        ModelParameters {
            vm_allocation_delay,
            max_machines,
            allocation_cost,
            maintenance_cost,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.allocation_cost >= 0.0) || !self.allocation_cost.is_finite() {
            return Err(SimError::parameters(format!(
                "allocation cost must be a non-negative number, got {}",
                self.allocation_cost
            )));
        }
        if !(self.maintenance_cost >= 0.0) || !self.maintenance_cost.is_finite() {
            return Err(SimError::parameters(format!(
                "maintenance cost must be a non-negative number, got {}",
                self.maintenance_cost
            )));
        }
        Ok(())
    }

    /// Provisioning delay as a slot offset
    pub fn allocation_delay(&self) -> Slot {
        Slot::from(self.vm_allocation_delay)
    }

    /// Re-express the model for slots `scale` times longer
    pub fn rescale_time_slot(&self, scale: f64) -> Self {
        ModelParameters {
            vm_allocation_delay: (f64::from(self.vm_allocation_delay) / scale) as u32,
            maintenance_cost: self.maintenance_cost * scale,
            ..*self
        }
    }
}

impl fmt::Display for ModelParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(f={}dT,B={},a={},m={}/dT)",
            self.vm_allocation_delay,
            self.max_machines,
            trim_float(self.allocation_cost),
            trim_float(self.maintenance_cost)
        )
    }
}

/// Format with at most three decimals and no trailing zeros
pub fn trim_float(value: f64) -> String {
    let formatted = format!("{:.3}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
