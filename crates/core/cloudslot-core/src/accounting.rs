//! Running cost and revenue ledger
//!
//! Every counter only grows. Charges are final once issued.

use serde::{Deserialize, Serialize};

use crate::model::{JobState, ModelParameters};
use crate::policies::hot_unit_value;

/// Cost/revenue ledger of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accounting {
    parameters: ModelParameters,
    num_allocations: u64,
    total_maintenance_slots: u64,
    num_jobs_completed: u64,
    total_value_completed: f64,
    optimal_upper_bound: f64,
}

impl Accounting {
    pub fn new(parameters: ModelParameters) -> Self {
        Accounting {
            parameters,
            num_allocations: 0,
            total_maintenance_slots: 0,
            num_jobs_completed: 0,
            total_value_completed: 0.0,
            optimal_upper_bound: 0.0,
        }
    }

    pub fn num_allocations(&self) -> u64 {
        self.num_allocations
    }

    pub fn total_maintenance_slots(&self) -> u64 {
        self.total_maintenance_slots
    }

    pub fn num_jobs_completed(&self) -> u64 {
        self.num_jobs_completed
    }

    pub fn total_value_completed(&self) -> f64 {
        self.total_value_completed
    }

    pub fn optimal_upper_bound(&self) -> f64 {
        self.optimal_upper_bound
    }

    pub fn cost(&self) -> f64 {
        self.num_allocations as f64 * self.parameters.allocation_cost
            + self.total_maintenance_slots as f64 * self.parameters.maintenance_cost
    }

    pub fn revenue(&self) -> f64 {
        self.total_value_completed
    }

    pub fn objective(&self) -> f64 {
        self.revenue() - self.cost()
    }

    /// Objective relative to the a-priori upper bound
    ///
    /// NaN when nothing worth running has arrived.
    pub fn objective_percentage(&self) -> f64 {
        self.objective() / self.optimal_upper_bound
    }

    pub fn charge_allocation(&mut self, machines: usize) {
        self.num_allocations += machines as u64;
    }

    pub fn charge_maintenance(&mut self, machines: usize) {
        self.total_maintenance_slots += machines as u64;
    }

    /// Grow the upper bound by what the arriving jobs could earn if each ran
    /// immediately on an already paid-for machine
    pub fn note_arrived(&mut self, arrived: &[JobState]) {
        self.optimal_upper_bound += arrived
            .iter()
            .map(|job| {
                hot_unit_value(&job.template, &self.parameters)
                    * job.template.initial_processing_time as f64
            })
            .filter(|bound| *bound > 0.0)
            .sum::<f64>();
    }

    pub fn account_for_completed(&mut self, completed: &[JobState]) {
        self.total_value_completed += completed.iter().map(|job| job.template.value).sum::<f64>();
        self.num_jobs_completed += completed.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobTemplate;

    fn job(id: u64, value: f64, processing: i64) -> JobState {
        JobState::new(JobTemplate::new(id, 0, 10, value, processing))
    }

    #[test]
    fn test_cost_and_objective() {
        let mut accounting = Accounting::new(ModelParameters::new(0, 4, 2.0, 0.5));
        accounting.charge_allocation(3);
        accounting.charge_maintenance(4);
        accounting.charge_maintenance(2);
        accounting.account_for_completed(&[job(1, 10.0, 1), job(2, 5.0, 3)]);

        assert_eq!(accounting.num_allocations(), 3);
        assert_eq!(accounting.total_maintenance_slots(), 6);
        assert_eq!(accounting.num_jobs_completed(), 2);
        assert_eq!(accounting.cost(), 9.0);
        assert_eq!(accounting.revenue(), 15.0);
        assert_eq!(accounting.objective(), 6.0);
    }

    #[test]
    fn test_upper_bound_skips_unprofitable_jobs() {
        // maintenance 1.0: job 1 hot value 5 - 1 = 4 per slot over 2 slots,
        // job 2 hot value 0.5 - 1 < 0 contributes nothing
        let mut accounting = Accounting::new(ModelParameters::new(0, 4, 0.0, 1.0));
        accounting.note_arrived(&[job(1, 10.0, 2), job(2, 1.0, 2)]);

        assert_eq!(accounting.optimal_upper_bound(), 8.0);
    }

    #[test]
    fn test_objective_percentage() {
        let mut accounting = Accounting::new(ModelParameters::default());
        accounting.note_arrived(&[job(1, 10.0, 2), job(2, 10.0, 5)]);
        accounting.account_for_completed(&[job(1, 10.0, 2)]);

        assert_eq!(accounting.objective_percentage(), 0.5);
    }

    #[test]
    fn test_objective_identity_holds_under_many_charges() {
        let mut accounting = Accounting::new(ModelParameters::new(0, 4, 0.3, 0.07));
        for i in 0..1000 {
            accounting.charge_allocation(i % 3);
            accounting.charge_maintenance(i % 5);
            if i % 7 == 0 {
                accounting.account_for_completed(&[job(i as u64, 1.1, 1)]);
            }
            let identity = accounting.revenue() - accounting.cost();
            assert!((accounting.objective() - identity).abs() <= 1e-9);
        }
    }
}
