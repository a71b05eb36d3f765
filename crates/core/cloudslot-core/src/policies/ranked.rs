use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::model::{JobId, JobState, ModelParameters, Slot};

use super::{Policy, Priority, Ranked, SlotContext, is_admissible};

/// Rank key of a [`RankedQueue`]
///
/// Keys may read mutable job state. A job's key is taken when it enters the
/// queue and refreshed each time it comes back from processing. Keys that
/// read the clock are recomputed for every queued job before each selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankKey {
    /// `v/w`: value per remaining work, highest first
    ValuePerRemainingWork,
    /// `v/d`: value per remaining deadline, highest first
    ValuePerRemainingDeadline,
    /// `v/wi`: value per initial work, highest first
    ValuePerInitialWork,
    /// `-d`: earliest deadline first
    RemainingDeadline,
    /// `v`: highest value first
    Value,
    /// `-w`: shortest remaining work first
    RemainingWork,
}

impl RankKey {
    pub const ALL: [RankKey; 6] = [
        RankKey::ValuePerRemainingWork,
        RankKey::ValuePerRemainingDeadline,
        RankKey::ValuePerInitialWork,
        RankKey::RemainingDeadline,
        RankKey::Value,
        RankKey::RemainingWork,
    ];

    /// Short code used in policy names
    pub fn code(&self) -> &'static str {
        match self {
            RankKey::ValuePerRemainingWork => "v/w",
            RankKey::ValuePerRemainingDeadline => "v/d",
            RankKey::ValuePerInitialWork => "v/wi",
            RankKey::RemainingDeadline => "-d",
            RankKey::Value => "v",
            RankKey::RemainingWork => "-w",
        }
    }

    pub fn from_code(code: &str) -> Option<RankKey> {
        RankKey::ALL.into_iter().find(|key| key.code() == code)
    }

    /// Whether the key of an idle job changes from one slot to the next
    pub fn depends_on_time(&self) -> bool {
        matches!(self, RankKey::ValuePerRemainingDeadline)
    }

    /// Smaller is better
    ///
    /// `-d` ranks by absolute deadline, which orders jobs the same way as the
    /// remaining deadline at any slot.
    pub fn priority(&self, job: &JobState, current_slot: Slot) -> f64 {
        let value = job.template.value;
        match self {
            RankKey::ValuePerRemainingWork => -(value / job.remaining_processing_time() as f64),
            RankKey::ValuePerRemainingDeadline => {
                -(value / (job.remaining_deadline(current_slot) + 1) as f64)
            }
            RankKey::ValuePerInitialWork => {
                -(value / job.template.initial_processing_time as f64)
            }
            RankKey::RemainingDeadline => job.template.absolute_deadline() as f64,
            RankKey::Value => -value,
            RankKey::RemainingWork => job.remaining_processing_time() as f64,
        }
    }
}

impl fmt::Display for RankKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Single ordered queue of the jobs not currently running
///
/// Each slot the best `machines_ready` jobs are taken out to run and put back
/// afterwards with a refreshed key.
pub struct RankedQueue {
    params: ModelParameters,
    key: RankKey,
    queue: BTreeSet<Ranked>,
    priorities: HashMap<JobId, Priority>,
    scheduled: Vec<JobId>,
}

impl RankedQueue {
    pub fn new(params: ModelParameters, key: RankKey) -> Self {
        RankedQueue {
            params,
            key,
            queue: BTreeSet::new(),
            priorities: HashMap::new(),
            scheduled: Vec::new(),
        }
    }

    fn enqueue(&mut self, job: &JobState, current_slot: Slot) {
        let entry = Ranked::new(self.key.priority(job, current_slot), job.id());
        if let Some(previous) = self.priorities.insert(entry.id, entry.priority) {
            self.queue.remove(&Ranked {
                priority: previous,
                id: entry.id,
            });
        }
        self.queue.insert(entry);
    }

    /// Re-key every queued job at `current_slot`
    fn refresh_keys(&mut self, buffer: &Buffer, current_slot: Slot) {
        let queued: Vec<JobId> = std::mem::take(&mut self.priorities).into_keys().collect();
        self.queue.clear();
        for id in queued {
            if let Some(job) = buffer.get(id) {
                self.enqueue(job, current_slot);
            }
        }
    }

    fn dequeue(&mut self, id: JobId) {
        if let Some(priority) = self.priorities.remove(&id) {
            self.queue.remove(&Ranked { priority, id });
        }
    }
}

impl Policy for RankedQueue {
    fn handle_arrival(&mut self, ctx: &SlotContext, arriving: Vec<JobState>, buffer: &mut Buffer) {
        for job in arriving {
            if !is_admissible(&job.template, &self.params) || buffer.contains(job.id()) {
                continue;
            }
            self.enqueue(&job, ctx.current_slot);
            buffer.admit(job);
        }
    }

    fn select_for_processing(&mut self, ctx: &SlotContext, buffer: &Buffer) -> Vec<JobId> {
        if self.key.depends_on_time() {
            self.refresh_keys(buffer, ctx.current_slot);
        }
        while self.scheduled.len() < ctx.machines_ready {
            let Some(entry) = self.queue.pop_first() else {
                break;
            };
            self.priorities.remove(&entry.id);
            self.scheduled.push(entry.id);
        }
        self.scheduled.clone()
    }

    fn handle_processing_finished(&mut self, ctx: &SlotContext, buffer: &Buffer) {
        for id in std::mem::take(&mut self.scheduled) {
            if let Some(job) = buffer.get(id) {
                self.enqueue(job, ctx.current_slot);
            }
        }
    }

    fn predict_processing_capacity(&self, _ctx: &SlotContext, buffer: &Buffer) -> usize {
        buffer.len().min(self.params.max_machines)
    }

    fn handle_buffer_leave(&mut self, _ctx: &SlotContext, leaving: &[JobState]) {
        for job in leaving {
            self.dequeue(job.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobTemplate;

    fn job(id: JobId, value: f64, processing: Slot, deadline: Slot) -> JobState {
        JobState::new(JobTemplate::new(id, 0, deadline, value, processing))
    }

    fn ctx(machines_ready: usize) -> SlotContext {
        SlotContext {
            current_slot: 0,
            machines_ready,
        }
    }

    #[test]
    fn test_rank_key_codes_round_trip() {
        for key in RankKey::ALL {
            assert_eq!(RankKey::from_code(key.code()), Some(key));
        }
        assert_eq!(RankKey::from_code("x"), None);
    }

    #[test]
    fn test_rank_key_priorities() {
        let mut state = job(1, 12.0, 3, 8);
        state.process();

        assert_eq!(RankKey::ValuePerRemainingWork.priority(&state, 0), -6.0);
        assert_eq!(RankKey::ValuePerInitialWork.priority(&state, 0), -4.0);
        assert_eq!(RankKey::ValuePerRemainingDeadline.priority(&state, 3), -2.0);
        assert_eq!(RankKey::RemainingDeadline.priority(&state, 3), 8.0);
        assert_eq!(RankKey::RemainingDeadline.priority(&state, 6), 8.0);
        assert_eq!(RankKey::Value.priority(&state, 0), -12.0);
        assert_eq!(RankKey::RemainingWork.priority(&state, 0), 2.0);
    }

    #[test]
    fn test_selects_best_jobs_by_key() {
        let params = ModelParameters::new(0, 4, 0.0, 0.0);
        let mut policy = RankedQueue::new(params, RankKey::Value);
        let mut buffer = Buffer::new();

        policy.handle_arrival(
            &ctx(2),
            vec![job(1, 3.0, 1, 5), job(2, 9.0, 1, 5), job(3, 6.0, 1, 5)],
            &mut buffer,
        );

        assert_eq!(policy.select_for_processing(&ctx(2), &buffer), vec![2, 3]);
        assert_eq!(policy.queue.len(), 1);
    }

    #[test]
    fn test_unfinished_jobs_return_to_queue_with_new_key() {
        let params = ModelParameters::new(0, 4, 0.0, 0.0);
        let mut policy = RankedQueue::new(params, RankKey::RemainingWork);
        let mut buffer = Buffer::new();

        policy.handle_arrival(&ctx(1), vec![job(1, 1.0, 3, 9), job(2, 1.0, 2, 9)], &mut buffer);

        let selected = policy.select_for_processing(&ctx(1), &buffer);
        assert_eq!(selected, vec![2]);
        buffer.get_mut(2).unwrap().process();
        policy.handle_processing_finished(&ctx(1), &buffer);

        assert_eq!(policy.queue.len(), 2);
        assert_eq!(policy.priorities[&2], Priority(1.0));
        assert_eq!(policy.select_for_processing(&ctx(1), &buffer), vec![2]);
    }

    #[test]
    fn test_time_dependent_keys_are_refreshed_before_selection() {
        let params = ModelParameters::new(0, 4, 0.0, 0.0);
        let mut policy = RankedQueue::new(params, RankKey::ValuePerRemainingDeadline);
        let mut buffer = Buffer::new();

        // At slot 0: 10/13 for job 1 against 10/21 for job 2
        policy.handle_arrival(&ctx(0), vec![job(1, 10.0, 1, 12)], &mut buffer);
        let late = JobState::new(JobTemplate::new(2, 10, 10, 10.0, 1));
        let at_ten = SlotContext {
            current_slot: 10,
            machines_ready: 1,
        };
        policy.handle_arrival(&at_ten, vec![late], &mut buffer);

        // At slot 10: 10/3 for job 1 against 10/11 for job 2
        assert_eq!(policy.select_for_processing(&at_ten, &buffer), vec![1]);
        assert_eq!(policy.queue.len(), 1);
        assert_eq!(policy.priorities[&2], Priority(-10.0 / 11.0));
    }

    #[test]
    fn test_leaving_jobs_are_purged() {
        let params = ModelParameters::new(0, 4, 0.0, 0.0);
        let mut policy = RankedQueue::new(params, RankKey::Value);
        let mut buffer = Buffer::new();

        policy.handle_arrival(&ctx(0), vec![job(1, 3.0, 1, 5), job(2, 9.0, 1, 5)], &mut buffer);
        let leaving = buffer.remove(2).unwrap();
        policy.handle_buffer_leave(&ctx(0), &[leaving]);

        assert_eq!(policy.queue.len(), 1);
        assert!(!policy.priorities.contains_key(&2));
        assert_eq!(policy.select_for_processing(&ctx(3), &buffer), vec![1]);
    }

    #[test]
    fn test_rejects_unprofitable_jobs() {
        let params = ModelParameters::new(0, 4, 0.0, 5.0);
        let mut policy = RankedQueue::new(params, RankKey::Value);
        let mut buffer = Buffer::new();

        policy.handle_arrival(&ctx(0), vec![job(1, 4.0, 1, 5), job(2, 12.0, 2, 5)], &mut buffer);

        assert_eq!(buffer.ids().collect::<Vec<_>>(), vec![2]);
        assert_eq!(policy.queue.len(), 1);
    }
}
