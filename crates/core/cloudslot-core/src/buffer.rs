//! Job arena for admitted jobs
//!
//! The buffer owns every live `JobState`. Policies keep only `JobId`s in their
//! own indices and look the state up here, so a job is mutated in exactly one
//! place. Iteration follows admission order.

use std::collections::{BTreeMap, HashMap};

use crate::model::{JobId, JobState};

#[derive(Debug)]
struct Entry {
    seq: u64,
    job: JobState,
}

/// Admitted, not yet completed or expired jobs
#[derive(Debug, Default)]
pub struct Buffer {
    jobs: HashMap<JobId, Entry>,
    order: BTreeMap<u64, JobId>,
    next_seq: u64,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a job. Returns `false` if a job with the same id is present.
    pub fn admit(&mut self, job: JobState) -> bool {
        let id = job.id();
        if self.jobs.contains_key(&id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id);
        self.jobs.insert(id, Entry { seq, job });
        true
    }

    /// Remove a job, handing its final state back
    pub fn remove(&mut self, id: JobId) -> Option<JobState> {
        let entry = self.jobs.remove(&id)?;
        self.order.remove(&entry.seq);
        Some(entry.job)
    }

    pub fn get(&self, id: JobId) -> Option<&JobState> {
        self.jobs.get(&id).map(|entry| &entry.job)
    }

    pub(crate) fn get_mut(&mut self, id: JobId) -> Option<&mut JobState> {
        self.jobs.get_mut(&id).map(|entry| &mut entry.job)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job ids in admission order
    pub fn ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.order.values().copied()
    }

    /// Jobs in admission order
    pub fn iter(&self) -> impl Iterator<Item = &JobState> + '_ {
        self.order.values().map(move |id| &self.jobs[id].job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobTemplate;

    fn job(id: JobId) -> JobState {
        JobState::new(JobTemplate::new(id, 0, 10, 5.0, 2))
    }

    #[test]
    fn test_admission_order_is_preserved() {
        let mut buffer = Buffer::new();
        for id in [5, 1, 9, 3] {
            assert!(buffer.admit(job(id)));
        }

        assert_eq!(buffer.ids().collect::<Vec<_>>(), vec![5, 1, 9, 3]);

        buffer.remove(1);
        buffer.admit(job(1));
        assert_eq!(buffer.ids().collect::<Vec<_>>(), vec![5, 9, 3, 1]);
        assert_eq!(
            buffer.iter().map(JobState::id).collect::<Vec<_>>(),
            vec![5, 9, 3, 1]
        );
    }

    #[test]
    fn test_duplicate_admission_is_rejected() {
        let mut buffer = Buffer::new();
        assert!(buffer.admit(job(1)));
        assert!(!buffer.admit(job(1)));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_remove_returns_mutated_state() {
        let mut buffer = Buffer::new();
        buffer.admit(job(1));
        buffer.get_mut(1).unwrap().process();

        let removed = buffer.remove(1).unwrap();
        assert_eq!(removed.remaining_processing_time(), 1);
        assert!(buffer.is_empty());
        assert!(!buffer.contains(1));
        assert!(buffer.remove(1).is_none());
    }
}
