//! Descriptive statistics of a generated input

use std::fmt;

use cloudslot_core::ModelParameters;
use cloudslot_core::policies::{cold_unit_value, hot_unit_value};
use serde::{Deserialize, Serialize};

use crate::input::{Input, ONE_SECOND};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub sd: f64,
    /// Upper median, `sorted[n / 2]`
    pub median: f64,
}

impl SequenceStats {
    /// `None` for an empty sequence
    pub fn of<I: IntoIterator<Item = f64>>(values: I) -> Option<SequenceStats> {
        let mut sorted: Vec<f64> = values.into_iter().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / n;
        Some(SequenceStats {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            sd: variance.sqrt(),
            median: sorted[sorted.len() / 2],
        })
    }
}

impl fmt::Display for SequenceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={:.3} max={:.3} mean={:.3} sd={:.3} median={:.3}",
            self.min, self.max, self.mean, self.sd, self.median
        )
    }
}

/// Summary of an input under a cost model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputStats {
    pub parameters: String,
    pub num_jobs: usize,
    pub duration_minutes: f64,
    pub num_time_slots: usize,
    pub values: Option<SequenceStats>,
    /// Over non-empty slots only
    pub jobs_per_time_slot: Option<SequenceStats>,
    pub processing_minutes: Option<SequenceStats>,
    pub deadline_cushions: Option<SequenceStats>,
    pub hot_unit_values: Option<SequenceStats>,
    pub cold_unit_values: Option<SequenceStats>,
}

impl InputStats {
    pub fn compute(input: &Input, model: &ModelParameters) -> InputStats {
        let minutes_per_slot = input.parameters.time_slot_duration as f64 / (ONE_SECOND * 60) as f64;

        InputStats {
            parameters: input.parameters.to_string(),
            num_jobs: input.num_jobs(),
            duration_minutes: input.time_slots.len() as f64 * minutes_per_slot,
            num_time_slots: input.time_slots.len(),
            values: SequenceStats::of(input.jobs().map(|job| job.value)),
            jobs_per_time_slot: SequenceStats::of(
                input
                    .time_slots
                    .iter()
                    .filter(|slot| !slot.is_empty())
                    .map(|slot| slot.len() as f64),
            ),
            processing_minutes: SequenceStats::of(
                input
                    .jobs()
                    .map(|job| job.initial_processing_time as f64 * minutes_per_slot),
            ),
            deadline_cushions: SequenceStats::of(input.jobs().map(|job| job.deadline_cushion())),
            hot_unit_values: SequenceStats::of(input.jobs().map(|job| hot_unit_value(job, model))),
            cold_unit_values: SequenceStats::of(input.jobs().map(|job| cold_unit_value(job, model))),
        }
    }
}

fn write_stats(f: &mut fmt::Formatter<'_>, label: &str, stats: &Option<SequenceStats>) -> fmt::Result {
    match stats {
        Some(stats) => writeln!(f, "{}: {}", label, stats),
        None => writeln!(f, "{}: n/a", label),
    }
}

impl fmt::Display for InputStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parameters: {}", self.parameters)?;
        writeln!(f, "Total number of jobs: {}", self.num_jobs)?;
        writeln!(f, "Duration: {:.3} minutes", self.duration_minutes)?;
        writeln!(f, "Number of time slots: {}", self.num_time_slots)?;
        write_stats(f, "Values", &self.values)?;
        write_stats(f, "Jobs per time slot", &self.jobs_per_time_slot)?;
        write_stats(f, "Processing times (minutes)", &self.processing_minutes)?;
        write_stats(f, "Deadline cushions", &self.deadline_cushions)?;
        write_stats(f, "Hot unit values", &self.hot_unit_values)?;
        write_stats(f, "Cold unit values", &self.cold_unit_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputParameters;
    use cloudslot_core::JobTemplate;

    #[test]
    fn test_sequence_stats() {
        let stats = SequenceStats::of([4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 3.0);
        assert!((stats.sd - 1.25f64.sqrt()).abs() < 1e-12);

        assert_eq!(SequenceStats::of(Vec::new()), None);
    }

    #[test]
    fn test_input_stats() {
        let input = Input {
            parameters: InputParameters {
                time_slot_duration: 30 * ONE_SECOND,
                ..InputParameters::default()
            },
            time_slots: vec![
                vec![JobTemplate::new(0, 0, 4, 6.0, 2), JobTemplate::new(1, 0, 2, 2.0, 1)],
                vec![],
                vec![JobTemplate::new(2, 2, 8, 4.0, 4)],
            ],
        };
        let model = ModelParameters::new(0, 2, 1.0, 0.5);

        let stats = InputStats::compute(&input, &model);
        assert_eq!(stats.num_jobs, 3);
        assert_eq!(stats.num_time_slots, 3);
        assert_eq!(stats.duration_minutes, 1.5);

        let per_slot = stats.jobs_per_time_slot.unwrap();
        assert_eq!(per_slot.mean, 1.5);
        assert_eq!(stats.processing_minutes.unwrap().max, 2.0);
        assert_eq!(stats.deadline_cushions.unwrap().min, 2.0);
        // hot: 3 - 0.5, 2 - 0.5, 1 - 0.5
        assert_eq!(stats.hot_unit_values.unwrap().max, 2.5);
        // cold: 2.5 - 0.5, 1 - 0.5, 0.75 - 0.5
        assert_eq!(stats.cold_unit_values.unwrap().min, 0.25);

        let report = stats.to_string();
        assert!(report.contains("Total number of jobs: 3"));
        assert!(report.contains("Number of time slots: 3"));
    }
}
