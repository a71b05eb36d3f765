//! Pessimistic preemptive priority queue
//!
//! Admitted jobs are spread over three structures:
//! - the hot queue, ordered by hot unit value, pointing at rank
//!   `max_machines - 1` (the worst job that would still run on a full pool)
//! - the candidate pool, ordered by cold unit value, holding jobs not yet
//!   promoted
//! - with work conservation, a supplementary queue of every admitted job not
//!   in the hot queue, used to fill idle machines
//!
//! A candidate is promoted when it beats the pointed job's cold unit value by
//! the preemption factor and its deadline leaves pessimistic slack for the
//! provisioning delay. A deadline index drops jobs that can no longer start in
//! time.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::buffer::Buffer;
use crate::expiration::ExpirationManager;
use crate::model::{JobId, JobState, JobTemplate, ModelParameters, Slot};
use crate::pointed::PointedSet;

use super::{Policy, Ranked, SlotContext, cold_unit_value, hot_unit_value, is_admissible};

/// Resolved tuning of the policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PppqParameters {
    /// Extra processing-time multiple a deadline must leave free
    pub pessimistic_factor: f64,
    /// How much better than the pointed job a candidate must be
    pub preemption_factor: f64,
}

impl PppqParameters {
    pub fn new(pessimistic_factor: f64, preemption_factor: f64) -> Self {
        PppqParameters {
            pessimistic_factor,
            preemption_factor,
        }
    }
}

impl Default for PppqParameters {
    fn default() -> Self {
        PppqParameters::new(0.0, 1.0)
    }
}

/// Where a run's [`PppqParameters`] come from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PppqParameterSource {
    /// Given directly
    Fixed(PppqParameters),
    /// Table entry nearest to a target deadline cushion
    Cushion(f64),
    /// Table entry for the tightest scheduling class of the input
    InputOptimal,
    /// Table entry for the cushion chosen by the evaluation point
    Controlled,
}

pub struct PessimisticPreemptiveQueue {
    params: ModelParameters,
    tuning: PppqParameters,
    hot: PointedSet<Ranked>,
    candidates: PointedSet<Ranked>,
    supplementary: Option<PointedSet<Ranked>>,
    expiration: ExpirationManager<JobId>,
}

impl PessimisticPreemptiveQueue {
    pub fn new(params: ModelParameters, tuning: PppqParameters, work_conservative: bool) -> Self {
        // With no machines at all the tracked rank is unreachable
        let hot_rank = params.max_machines.checked_sub(1).unwrap_or(usize::MAX);
        PessimisticPreemptiveQueue {
            params,
            tuning,
            hot: PointedSet::new(hot_rank),
            candidates: PointedSet::new(usize::MAX),
            supplementary: work_conservative.then(|| PointedSet::new(usize::MAX)),
            expiration: ExpirationManager::new(),
        }
    }

    pub fn tuning(&self) -> PppqParameters {
        self.tuning
    }

    pub fn is_work_conservative(&self) -> bool {
        self.supplementary.is_some()
    }

    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }

    pub fn candidates_len(&self) -> usize {
        self.candidates.len()
    }

    pub fn supplementary_len(&self) -> usize {
        self.supplementary.as_ref().map_or(0, PointedSet::len)
    }

    fn hot_entry(&self, job: &JobTemplate) -> Ranked {
        Ranked::new(-hot_unit_value(job, &self.params), job.id)
    }

    fn cold_entry(&self, job: &JobTemplate) -> Ranked {
        Ranked::new(-cold_unit_value(job, &self.params), job.id)
    }

    /// Latest slot processing can start in and still meet the deadline,
    /// allowing for the provisioning delay
    fn expiration_time(job: &JobState, allocation_delay: Slot) -> Slot {
        job.template.absolute_deadline() - job.remaining_processing_time() - allocation_delay
    }

    fn passes_preemption(&self, candidate: &JobTemplate, buffer: &Buffer) -> bool {
        let Some(pointed_job) = self.hot.pointed().and_then(|entry| buffer.get(entry.id)) else {
            return true;
        };
        let candidate_value = cold_unit_value(candidate, &self.params);
        candidate_value >= 0.0
            && candidate_value
                >= self.tuning.preemption_factor
                    * cold_unit_value(&pointed_job.template, &self.params)
    }

    fn passes_pessimism(&self, candidate: &JobTemplate, current_slot: Slot) -> bool {
        candidate.absolute_deadline() as f64
            >= (1.0 + self.tuning.pessimistic_factor) * candidate.initial_processing_time as f64
                + self.params.allocation_delay() as f64
                + current_slot as f64
    }

    /// Remove a job from every structure
    fn forget(&mut self, job: &JobTemplate) {
        let hot = self.hot_entry(job);
        let cold = self.cold_entry(job);
        if !self.hot.remove(&hot) {
            if let Some(supplementary) = self.supplementary.as_mut() {
                supplementary.remove(&hot);
            }
            self.candidates.remove(&cold);
        }
    }
}

impl Policy for PessimisticPreemptiveQueue {
    fn handle_arrival(&mut self, ctx: &SlotContext, arriving: Vec<JobState>, buffer: &mut Buffer) {
        let delay = self.params.allocation_delay();
        for job in arriving {
            if !is_admissible(&job.template, &self.params) || buffer.contains(job.id()) {
                continue;
            }
            let hot = self.hot_entry(&job.template);
            let cold = self.cold_entry(&job.template);
            let expires_at = Self::expiration_time(&job, delay);

            buffer.admit(job);
            self.candidates.insert(cold);
            if let Some(supplementary) = self.supplementary.as_mut() {
                supplementary.insert(hot);
            }
            self.expiration.add(hot.id, expires_at);
        }

        for id in self.expiration.poll_expired() {
            if let Some(job) = buffer.remove(id) {
                trace!(slot = ctx.current_slot, job = id, "Dropping job that can no longer start in time");
                self.forget(&job.template);
            }
        }

        while let Some(&best) = self.candidates.first() {
            let Some(candidate) = buffer.get(best.id).map(|job| job.template.clone()) else {
                self.candidates.remove(&best);
                continue;
            };
            if !self.passes_preemption(&candidate, buffer) {
                break;
            }
            self.candidates.remove(&best);
            if self.passes_pessimism(&candidate, ctx.current_slot) {
                let hot = self.hot_entry(&candidate);
                self.hot.insert(hot);
                if let Some(supplementary) = self.supplementary.as_mut() {
                    supplementary.remove(&hot);
                }
            }
        }
    }

    fn select_for_processing(&mut self, ctx: &SlotContext, _buffer: &Buffer) -> Vec<JobId> {
        let mut selected: Vec<JobId> = self
            .hot
            .iter()
            .take(ctx.machines_ready)
            .map(|entry| entry.id)
            .collect();
        if let Some(supplementary) = &self.supplementary {
            let spare = ctx.machines_ready - selected.len();
            selected.extend(supplementary.iter().take(spare).map(|entry| entry.id));
        }
        selected
    }

    fn handle_processing_finished(&mut self, _ctx: &SlotContext, buffer: &Buffer) {
        let delay = self.params.allocation_delay();
        self.expiration
            .tick(|id| buffer.get(*id).map(|job| Self::expiration_time(job, delay)));
    }

    fn predict_processing_capacity(&self, _ctx: &SlotContext, _buffer: &Buffer) -> usize {
        let max_machines = self.params.max_machines;
        let protected = self.hot.len().min(max_machines);
        match &self.supplementary {
            Some(supplementary) if protected < max_machines => {
                (protected + supplementary.len()).min(max_machines)
            }
            _ => protected,
        }
    }

    fn handle_buffer_leave(&mut self, _ctx: &SlotContext, leaving: &[JobState]) {
        for job in leaving {
            self.forget(&job.template);
        }
    }
}
