use crate::buffer::Buffer;
use crate::model::{JobId, JobState, ModelParameters};

use super::{Policy, SlotContext, is_admissible};

/// Admit every profitable job and run the buffer in admission order
pub struct NaiveAdmission {
    params: ModelParameters,
}

impl NaiveAdmission {
    pub fn new(params: ModelParameters) -> Self {
        NaiveAdmission { params }
    }
}

impl Policy for NaiveAdmission {
    fn handle_arrival(&mut self, _ctx: &SlotContext, arriving: Vec<JobState>, buffer: &mut Buffer) {
        for job in arriving {
            if is_admissible(&job.template, &self.params) {
                buffer.admit(job);
            }
        }
    }

    fn select_for_processing(&mut self, ctx: &SlotContext, buffer: &Buffer) -> Vec<JobId> {
        buffer.ids().take(ctx.machines_ready).collect()
    }

    fn handle_processing_finished(&mut self, _ctx: &SlotContext, _buffer: &Buffer) {}

    fn predict_processing_capacity(&self, _ctx: &SlotContext, buffer: &Buffer) -> usize {
        buffer.len().min(self.params.max_machines)
    }

    fn handle_buffer_leave(&mut self, _ctx: &SlotContext, _leaving: &[JobState]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobTemplate;

    fn job(id: JobId, value: f64) -> JobState {
        JobState::new(JobTemplate::new(id, 0, 10, value, 2))
    }

    #[test]
    fn test_admits_only_profitable_jobs() {
        let params = ModelParameters::new(0, 4, 0.0, 1.0);
        let mut policy = NaiveAdmission::new(params);
        let mut buffer = Buffer::new();
        let ctx = SlotContext {
            current_slot: 0,
            machines_ready: 0,
        };

        policy.handle_arrival(&ctx, vec![job(1, 10.0), job(2, 2.0), job(3, 1.0)], &mut buffer);

        assert_eq!(buffer.ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_selects_in_admission_order() {
        let params = ModelParameters::new(0, 2, 0.0, 0.0);
        let mut policy = NaiveAdmission::new(params);
        let mut buffer = Buffer::new();
        let ctx = SlotContext {
            current_slot: 0,
            machines_ready: 2,
        };

        policy.handle_arrival(&ctx, vec![job(7, 1.0), job(3, 9.0), job(5, 5.0)], &mut buffer);

        assert_eq!(policy.predict_processing_capacity(&ctx, &buffer), 2);
        assert_eq!(policy.select_for_processing(&ctx, &buffer), vec![7, 3]);
    }
}
