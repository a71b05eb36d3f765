//! Slot-by-slot simulation driver
//!
//! Each slot runs four phases in a fixed order:
//! 1. Admission: arrivals are recorded, indexed by deadline and offered to the policy
//! 2. Allocation: the pool is resized to the policy's predicted capacity
//! 3. Processing: ready machines are charged, the selected jobs run one slot
//! 4. Expiration: jobs that can no longer finish leave the buffer

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::accounting::Accounting;
use crate::buffer::Buffer;
use crate::error::Result;
use crate::expiration::ExpirationManager;
use crate::model::{JobId, JobState, JobTemplate, ModelParameters, Slot};
use crate::policies::{Policy, PolicySpec, PppqParameters, SlotContext};
use crate::resources::ResourceManager;

/// What happened during one slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot: Slot,
    pub arrived: usize,
    pub admitted: usize,
    pub selected: usize,
    pub completed: usize,
    /// Jobs that left the buffer unfinished, including those the policy dropped
    pub expired: usize,
    /// Ready machines during processing
    pub machines_ready: usize,
    pub machines_pending: usize,
}

/// One run of one policy over one input
pub struct Simulation {
    params: ModelParameters,
    policy_name: String,
    policy: Box<dyn Policy>,
    buffer: Buffer,
    resources: ResourceManager,
    accounting: Accounting,
    expiration: ExpirationManager<JobId>,
    current_slot: Slot,
}

impl Simulation {
    /// Create a simulation around an already built policy
    pub fn new(
        params: ModelParameters,
        policy_name: impl Into<String>,
        policy: Box<dyn Policy>,
    ) -> Self {
        Simulation {
            params,
            policy_name: policy_name.into(),
            policy,
            buffer: Buffer::new(),
            resources: ResourceManager::new(params.max_machines, params.vm_allocation_delay),
            accounting: Accounting::new(params),
            expiration: ExpirationManager::new(),
            current_slot: 0,
        }
    }

    /// Validate the parameters and instantiate a fresh policy
    pub fn with_policy(
        params: ModelParameters,
        spec: &PolicySpec,
        pppq: PppqParameters,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Simulation::new(
            params,
            spec.to_string(),
            spec.instantiate(&params, pppq),
        ))
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    pub fn current_slot(&self) -> Slot {
        self.current_slot
    }

    pub fn accounting(&self) -> &Accounting {
        &self.accounting
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    fn context(&self) -> SlotContext {
        SlotContext {
            current_slot: self.current_slot,
            machines_ready: self.resources.num_machines_ready(),
        }
    }

    /// Latest slot a job can sit idle in and still finish on time
    fn expiration_time(job: &JobState) -> Slot {
        job.template.absolute_deadline() - job.remaining_processing_time()
    }

    /// Run every slot of the input, then drain the buffer
    pub fn process_time_slots<I>(&mut self, slots: I)
    where
        I: IntoIterator<Item = Vec<JobTemplate>>,
    {
        for arrivals in slots {
            self.run_slot(arrivals);
        }
        self.finish_processing(None);
        info!(
            policy = %self.policy_name,
            slots = self.current_slot,
            completed = self.accounting.num_jobs_completed(),
            objective = self.accounting.objective(),
            bound = self.accounting.optimal_upper_bound(),
            "Simulation finished"
        );
    }

    /// Run empty slots until the buffer is empty or `max_slots` ran out.
    ///
    /// Returns whether the buffer emptied.
    pub fn finish_processing(&mut self, max_slots: Option<usize>) -> bool {
        let mut remaining = max_slots;
        while !self.buffer.is_empty() {
            if let Some(left) = remaining.as_mut() {
                if *left == 0 {
                    return false;
                }
                *left -= 1;
            }
            self.run_slot(Vec::new());
        }
        true
    }

    /// Advance the simulation by one slot with the given arrivals
    pub fn run_slot(&mut self, arrivals: Vec<JobTemplate>) -> SlotSummary {
        let mut summary = SlotSummary {
            slot: self.current_slot,
            arrived: arrivals.len(),
            ..SlotSummary::default()
        };

        let (admitted, dropped) = self.admit(arrivals);
        summary.admitted = admitted;
        self.allocate();
        summary.machines_ready = self.resources.num_machines_ready();

        let (selected, completed) = self.process();
        summary.selected = selected;
        summary.completed = completed;

        summary.expired = dropped + self.expire();
        summary.machines_pending = self.resources.num_machines_pending();

        debug!(
            slot = summary.slot,
            arrived = summary.arrived,
            admitted = summary.admitted,
            selected = summary.selected,
            completed = summary.completed,
            expired = summary.expired,
            ready = summary.machines_ready,
            pending = summary.machines_pending,
            "Slot processed"
        );

        self.current_slot += 1;
        summary
    }

    /// Returns how many arrivals were admitted and how many buffered jobs the
    /// policy dropped meanwhile
    fn admit(&mut self, arrivals: Vec<JobTemplate>) -> (usize, usize) {
        let arriving: Vec<JobState> = arrivals.into_iter().map(JobState::new).collect();
        let ids: Vec<JobId> = arriving.iter().map(JobState::id).collect();

        self.accounting.note_arrived(&arriving);
        for job in &arriving {
            self.expiration.add(job.id(), Self::expiration_time(job));
        }

        let ctx = self.context();
        let buffered = self.buffer.len();
        self.policy.handle_arrival(&ctx, arriving, &mut self.buffer);
        let admitted = ids.into_iter().filter(|id| self.buffer.contains(*id)).count();
        let dropped = (buffered + admitted).saturating_sub(self.buffer.len());
        (admitted, dropped)
    }

    fn allocate(&mut self) {
        let ctx = self.context();
        let target = self.policy.predict_processing_capacity(&ctx, &self.buffer);
        let delta = self.resources.request_capacity(target);
        if delta > 0 {
            self.accounting.charge_allocation(delta as usize);
        }
    }

    /// Returns how many jobs ran and how many of them completed
    fn process(&mut self) -> (usize, usize) {
        let ctx = self.context();
        self.accounting.charge_maintenance(ctx.machines_ready);

        let selected = self.policy.select_for_processing(&ctx, &self.buffer);
        assert!(
            selected.len() <= ctx.machines_ready,
            "policy {} selected {} jobs with {} machines ready",
            self.policy_name,
            selected.len(),
            ctx.machines_ready
        );
        let mut seen = HashSet::with_capacity(selected.len());
        for &id in &selected {
            assert!(seen.insert(id), "policy {} selected job {} twice", self.policy_name, id);
            let job = self.buffer.get_mut(id).unwrap_or_else(|| {
                panic!(
                    "policy {} selected job {} outside the buffer",
                    self.policy_name, id
                )
            });
            job.process();
        }

        self.policy.handle_processing_finished(&ctx, &self.buffer);

        let finished: Vec<JobId> = selected
            .iter()
            .copied()
            .filter(|id| self.buffer.get(*id).is_some_and(JobState::is_completed))
            .collect();
        let completed: Vec<JobState> = finished
            .into_iter()
            .filter_map(|id| self.buffer.remove(id))
            .collect();
        self.accounting.account_for_completed(&completed);
        if !completed.is_empty() {
            self.policy.handle_buffer_leave(&ctx, &completed);
        }

        self.resources.tick();
        (selected.len(), completed.len())
    }

    fn expire(&mut self) -> usize {
        let buffer = &self.buffer;
        self.expiration.tick(|id| buffer.get(*id).map(Self::expiration_time));

        let expired: Vec<JobState> = self
            .expiration
            .poll_expired()
            .into_iter()
            .filter_map(|id| self.buffer.remove(id))
            .collect();
        if !expired.is_empty() {
            let ctx = self.context();
            self.policy.handle_buffer_leave(&ctx, &expired);
        }
        expired.len()
    }
}
