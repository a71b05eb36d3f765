//! Turning task summaries into slotted simulation input
//!
//! Summaries are bucketed into slots of `time_slot_duration` microseconds
//! starting at the earliest submission. Processing time comes from the
//! observed run time, value from the task priority and the deadline from a
//! per-scheduling-class cushion.

use std::fmt;

use cloudslot_core::{JobTemplate, Slot, trim_float};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::trace::TaskEventsSummary;

/// Microseconds per second, the trace's time unit
pub const ONE_SECOND: i64 = 1_000_000;

/// How summaries are converted into jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParameters {
    /// Slot length in microseconds
    pub time_slot_duration: i64,
    pub processing_scale: f64,
    pub value_scale: f64,
    /// Deadline cushion of each scheduling class
    pub scheduling_class_cushions: Vec<f64>,
    pub scheduling_class_cushions_scale: f64,
    /// Draw each cushion uniformly from `[c, 2c)` instead of using `c`
    pub scheduling_cushions_randomized: bool,
    /// Exponential values `base^priority` instead of linear `priority + 1`
    pub value_exp_base: Option<f64>,
}

impl Default for InputParameters {
    fn default() -> Self {
        InputParameters {
            time_slot_duration: ONE_SECOND,
            processing_scale: 1.0,
            value_scale: 1.0,
            scheduling_class_cushions: vec![1.0, 2.0, 4.0, 10.0],
            scheduling_class_cushions_scale: 1.0,
            scheduling_cushions_randomized: false,
            value_exp_base: None,
        }
    }
}

impl InputParameters {
    pub fn validate(&self) -> Result<()> {
        if self.time_slot_duration <= 0 {
            return Err(EngineError::config(format!(
                "time slot duration must be positive, got {}us",
                self.time_slot_duration
            )));
        }
        if self.scheduling_class_cushions.iter().any(|cushion| !(*cushion >= 0.0)) {
            return Err(EngineError::config("deadline cushions must be non-negative"));
        }
        Ok(())
    }

    /// Cushion of a scheduling class after scaling
    pub fn effective_cushion(&self, scheduling_class: usize) -> Result<f64> {
        self.scheduling_class_cushions
            .get(scheduling_class)
            .map(|cushion| cushion * self.scheduling_class_cushions_scale)
            .ok_or_else(|| {
                EngineError::config(format!(
                    "no deadline cushion for scheduling class {} ({} configured)",
                    scheduling_class,
                    self.scheduling_class_cushions.len()
                ))
            })
    }

    /// Smallest effective cushion over all scheduling classes
    pub fn min_effective_cushion(&self) -> Option<f64> {
        self.scheduling_class_cushions
            .iter()
            .map(|cushion| cushion * self.scheduling_class_cushions_scale)
            .reduce(f64::min)
    }

    /// Whole slots needed to cover `seconds`
    pub fn seconds_to_slots(&self, seconds: f64) -> u32 {
        (seconds * ONE_SECOND as f64 / self.time_slot_duration as f64).ceil() as u32
    }

    /// Convert a per-second rate into a per-slot rate
    pub fn per_second_to_per_slot(&self, value: f64) -> f64 {
        value / ONE_SECOND as f64 * self.time_slot_duration as f64
    }

    /// Seed derived from every parameter.
    ///
    /// Hashed with 64-bit FNV-1a over little-endian words, so a sweep
    /// reproduces across platforms and toolchains.
    pub fn seed(&self) -> u64 {
        let mut words = vec![
            self.time_slot_duration as u64,
            self.processing_scale.to_bits(),
            self.value_scale.to_bits(),
            self.scheduling_class_cushions.len() as u64,
        ];
        words.extend(self.scheduling_class_cushions.iter().map(|cushion| cushion.to_bits()));
        words.push(self.scheduling_class_cushions_scale.to_bits());
        words.push(u64::from(self.scheduling_cushions_randomized));
        match self.value_exp_base {
            Some(exp_base) => words.extend([1, exp_base.to_bits()]),
            None => words.push(0),
        }
        fnv1a(&words)
    }

    fn value(&self, priority: i32) -> f64 {
        let base = match self.value_exp_base {
            Some(exp_base) => exp_base.powi(priority),
            None => f64::from(priority) + 1.0,
        };
        self.value_scale * base
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(words: &[u64]) -> u64 {
    words
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .fold(FNV_OFFSET_BASIS, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

impl fmt::Display for InputParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(dT={}s,vscale={},wscale={}",
            trim_float(self.time_slot_duration as f64 / ONE_SECOND as f64),
            trim_float(self.value_scale),
            trim_float(self.processing_scale)
        )?;
        if let Some(exp_base) = self.value_exp_base {
            write!(f, ",vexp={}", trim_float(exp_base))?;
        }
        let cushions: Vec<String> = self
            .scheduling_class_cushions
            .iter()
            .map(|cushion| trim_float(*cushion))
            .collect();
        write!(
            f,
            ",cs=[{}],css={})",
            cushions.join(","),
            trim_float(self.scheduling_class_cushions_scale)
        )
    }
}

/// A generated input: one list of arriving jobs per slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub parameters: InputParameters,
    pub time_slots: Vec<Vec<JobTemplate>>,
}

impl Input {
    pub fn num_jobs(&self) -> usize {
        self.time_slots.iter().map(Vec::len).sum()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobTemplate> + '_ {
        self.time_slots.iter().flatten()
    }
}

/// Generate slotted jobs from task summaries.
///
/// Slots without submissions are kept as empty slots. Tasks that would round
/// to zero processing time, or lack a run time, are skipped.
pub fn generate_input<R: Rng + ?Sized>(
    summaries: &[TaskEventsSummary],
    parameters: &InputParameters,
    rng: &mut R,
) -> Result<Input> {
    parameters.validate()?;

    let mut ordered: Vec<&TaskEventsSummary> = summaries.iter().collect();
    ordered.sort_by_key(|summary| summary.first_submission_time);

    let mut time_slots: Vec<Vec<JobTemplate>> = Vec::new();
    let Some(first) = ordered.first() else {
        return Ok(Input {
            parameters: parameters.clone(),
            time_slots,
        });
    };

    let slot_duration = parameters.time_slot_duration;
    let mut slot_start = first.first_submission_time;
    let mut current: Vec<JobTemplate> = Vec::new();
    let mut next_id = 0;

    for summary in ordered {
        while summary.first_submission_time >= slot_start + slot_duration {
            time_slots.push(std::mem::take(&mut current));
            slot_start += slot_duration;
        }

        let Some(run_time) = summary.run_time() else {
            continue;
        };
        let processing_time =
            (run_time as f64 * parameters.processing_scale / slot_duration as f64).ceil() as Slot;
        if processing_time <= 0 {
            continue;
        }

        let lower = parameters.effective_cushion(summary.scheduling_class)?;
        let cushion = if parameters.scheduling_cushions_randomized && lower > 0.0 {
            Uniform::new(lower, 2.0 * lower).sample(rng)
        } else {
            lower
        };

        current.push(JobTemplate::new(
            next_id,
            time_slots.len() as Slot,
            (processing_time as f64 * (1.0 + cushion)).ceil() as Slot,
            parameters.value(summary.priority),
            processing_time,
        ));
        next_id += 1;
    }
    if !current.is_empty() {
        time_slots.push(current);
    }

    Ok(Input {
        parameters: parameters.clone(),
        time_slots,
    })
}
