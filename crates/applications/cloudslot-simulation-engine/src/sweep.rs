//! Evaluation sweeps
//!
//! A sweep varies one parameter over a range and evaluates every policy at
//! every point. Each (point, policy) pair is an independent job:
//! - inputs are regenerated per repetition from an RNG seeded by the point
//! - every repetition runs a fresh simulation
//! - repetitions are aggregated by mean or median
//!
//! Jobs run on blocking worker threads, at most `num_workers` at a time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cloudslot_core::{Accounting, ModelParameters, PolicySpec, PppqParameters, Simulation};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::input::{Input, InputParameters, ONE_SECOND, generate_input};
use crate::params_table::{ParameterTable, resolve_parameters};
use crate::trace::TaskEventsSummary;

/// Parameter varied along a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variable {
    ValueScale,
    AllocationCost,
    /// Per second
    MaintenanceCost,
    NumMachines,
    /// Seconds
    TimeSlotDuration,
    DeadlineScale,
    /// Seconds
    VmAllocationTime,
    /// Cushion handed to `PPPQ(var)`
    PppqCushion,
}

impl Variable {
    pub const ALL: [Variable; 8] = [
        Variable::ValueScale,
        Variable::AllocationCost,
        Variable::MaintenanceCost,
        Variable::NumMachines,
        Variable::TimeSlotDuration,
        Variable::DeadlineScale,
        Variable::VmAllocationTime,
        Variable::PppqCushion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variable::ValueScale => "value-scale",
            Variable::AllocationCost => "allocation-cost",
            Variable::MaintenanceCost => "maintenance-cost",
            Variable::NumMachines => "num-machines",
            Variable::TimeSlotDuration => "time-slot-duration",
            Variable::DeadlineScale => "deadline-scale",
            Variable::VmAllocationTime => "vm-allocation-time",
            Variable::PppqCushion => "pppq-c",
        }
    }

    /// Apply `x` on top of the base configuration
    pub fn point(
        &self,
        x: f64,
        input: &InputParameters,
        model: &ModelParameters,
    ) -> Result<EvaluationPoint> {
        let mut point = EvaluationPoint {
            input: input.clone(),
            model: *model,
            value: x,
            pppq_cushion: None,
        };
        match self {
            Variable::ValueScale => point.input.value_scale = x,
            Variable::AllocationCost => point.model.allocation_cost = x,
            Variable::MaintenanceCost => point.model.maintenance_cost = input.per_second_to_per_slot(x),
            Variable::NumMachines => point.model.max_machines = x as usize,
            Variable::TimeSlotDuration => {
                let duration = (x * ONE_SECOND as f64) as i64;
                if duration <= 0 {
                    return Err(EngineError::config(format!(
                        "time slot duration must be at least one microsecond, got {}s",
                        x
                    )));
                }
                point.input.time_slot_duration = duration;
                point.model = model.rescale_time_slot(duration as f64 / input.time_slot_duration as f64);
            }
            Variable::DeadlineScale => point.input.scheduling_class_cushions_scale = x,
            Variable::VmAllocationTime => point.model.vm_allocation_delay = input.seconds_to_slots(x),
            Variable::PppqCushion => point.pppq_cushion = Some(x),
        }
        Ok(point)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variable {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Variable::ALL
            .into_iter()
            .find(|variable| variable.name() == s)
            .ok_or_else(|| EngineError::UnknownVariable {
                name: s.to_string(),
                available: Variable::ALL.map(|variable| variable.name()).join(", "),
            })
    }
}

/// Value read off the final ledger of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Objective,
    ObjectivePercentage,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Objective, Metric::ObjectivePercentage];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Objective => "objective",
            Metric::ObjectivePercentage => "objective-percentage",
        }
    }

    pub fn evaluate(&self, accounting: &Accounting) -> f64 {
        match self {
            Metric::Objective => accounting.objective(),
            Metric::ObjectivePercentage => accounting.objective_percentage(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == s)
            .ok_or_else(|| EngineError::UnknownMetric {
                name: s.to_string(),
                available: Metric::ALL.map(|metric| metric.name()).join(", "),
            })
    }
}

/// `start:end:segments[:exp]`, yielding `segments + 1` points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub start: f64,
    pub end: f64,
    pub segments: usize,
    pub exponential: bool,
}

impl Range {
    pub fn new(start: f64, end: f64, segments: usize, exponential: bool) -> Result<Self> {
        let range = Range {
            start,
            end,
            segments,
            exponential,
        };
        if !(start <= end) {
            return Err(EngineError::range(range.to_string(), "start must not be greater than end"));
        }
        if segments == 0 {
            return Err(EngineError::range(
                range.to_string(),
                "number of segments must be greater than zero",
            ));
        }
        if exponential && start <= 0.0 {
            return Err(EngineError::range(range.to_string(), "exponential range must start above zero"));
        }
        Ok(range)
    }

    pub fn points(&self) -> Vec<f64> {
        let segments = self.segments as f64;
        (0..=self.segments)
            .map(|i| {
                let i = i as f64;
                if self.exponential {
                    self.start * (self.end / self.start).powf(1.0 / segments).powf(i)
                } else {
                    self.start + i * (self.end - self.start) / segments
                }
            })
            .collect()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            cloudslot_core::trim_float(self.start),
            cloudslot_core::trim_float(self.end),
            self.segments
        )?;
        if self.exponential {
            write!(f, ":exp")?;
        }
        Ok(())
    }
}

impl FromStr for Range {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let exponential = match parts.len() {
            3 => false,
            4 if parts[3] == "exp" => true,
            _ => return Err(EngineError::range(s, "expected start:end:segments[:exp]")),
        };
        let start = parts[0]
            .parse()
            .map_err(|_| EngineError::range(s, format!("invalid start '{}'", parts[0])))?;
        let end = parts[1]
            .parse()
            .map_err(|_| EngineError::range(s, format!("invalid end '{}'", parts[1])))?;
        let segments = parts[2]
            .parse()
            .map_err(|_| EngineError::range(s, format!("invalid number of segments '{}'", parts[2])))?;
        Range::new(start, end, segments, exponential)
    }
}

/// How repetitions of one evaluation are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Aggregation {
    #[default]
    Mean,
    /// Upper median, `sorted[n / 2]`
    Median,
}

impl Aggregation {
    pub fn apply(&self, mut values: Vec<f64>) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Median => {
                values.sort_by(f64::total_cmp);
                values[values.len() / 2]
            }
        }
    }
}

impl FromStr for Aggregation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            _ => Err(EngineError::config(format!(
                "unknown run strategy '{}' (expected mean or median)",
                s
            ))),
        }
    }
}

/// One configuration on the sweep's x axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPoint {
    pub input: InputParameters,
    pub model: ModelParameters,
    /// Value of the swept variable
    pub value: f64,
    /// Cushion for `PPPQ(var)`, set by the `pppq-c` variable
    pub pppq_cushion: Option<f64>,
}

impl fmt::Display for EvaluationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input={}, model={}", self.input, self.model)?;
        if let Some(cushion) = self.pppq_cushion {
            write!(f, ", pppq c={}", cloudslot_core::trim_float(cushion))?;
        }
        write!(f, ", where var = {}", cloudslot_core::trim_float(self.value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub variable: Variable,
    pub metric: Metric,
    pub range: Range,
    pub runs_per_input: usize,
    pub num_workers: usize,
    pub aggregation: Aggregation,
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        if self.runs_per_input == 0 {
            return Err(EngineError::config("runs per input must be at least 1"));
        }
        if self.num_workers == 0 {
            return Err(EngineError::config("number of workers must be at least 1"));
        }
        Ok(())
    }
}

/// Aggregated metric for every (point, policy) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResults {
    pub points: Vec<EvaluationPoint>,
    pub policies: Vec<PolicySpec>,
    /// Indexed by point, then policy
    pub values: Vec<Vec<f64>>,
}

impl SweepResults {
    pub fn value(&self, point: usize, policy: usize) -> f64 {
        self.values[point][policy]
    }
}

/// Run one policy over one input and return the final ledger
pub fn simulate(
    input: &Input,
    model: ModelParameters,
    spec: &PolicySpec,
    pppq: PppqParameters,
) -> Result<Accounting> {
    let mut simulation = Simulation::with_policy(model, spec, pppq)?;
    simulation.process_time_slots(input.time_slots.iter().cloned());
    Ok(simulation.accounting().clone())
}

/// Evaluate one policy at one point over `runs` regenerated inputs
pub fn evaluate(
    summaries: &[TaskEventsSummary],
    point: &EvaluationPoint,
    spec: &PolicySpec,
    table: Option<&ParameterTable>,
    metric: Metric,
    runs: usize,
    aggregation: Aggregation,
) -> Result<f64> {
    let pppq = resolve_parameters(spec, table, &point.input, point.pppq_cushion)?;
    let mut rng = StdRng::seed_from_u64(point.input.seed());

    let mut values = Vec::with_capacity(runs);
    for run in 0..runs {
        let input = generate_input(summaries, &point.input, &mut rng)?;
        let accounting = simulate(&input, point.model, spec, pppq)?;
        let value = metric.evaluate(&accounting);
        debug!(policy = %spec, run, value, "Repetition finished");
        values.push(value);
    }
    Ok(aggregation.apply(values))
}

/// Evaluate every policy at every point of the sweep
pub async fn run_sweep(
    summaries: Arc<Vec<TaskEventsSummary>>,
    base_input: &InputParameters,
    base_model: &ModelParameters,
    policies: &[PolicySpec],
    table: Option<Arc<ParameterTable>>,
    config: &SweepConfig,
) -> Result<SweepResults> {
    config.validate()?;
    let points = config
        .range
        .points()
        .into_iter()
        .map(|x| config.variable.point(x, base_input, base_model))
        .collect::<Result<Vec<EvaluationPoint>>>()?;

    let semaphore = Arc::new(Semaphore::new(config.num_workers));
    let mut handles = Vec::with_capacity(points.len() * policies.len());

    for (point_index, point) in points.iter().enumerate() {
        for (policy_index, spec) in policies.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|err| EngineError::Worker(err.to_string()))?;
            info!(policy = %spec, point = %point, "Processing");

            let summaries = Arc::clone(&summaries);
            let table = table.clone();
            let point = point.clone();
            let spec = spec.clone();
            let (metric, runs, aggregation) = (config.metric, config.runs_per_input, config.aggregation);

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                evaluate(&summaries, &point, &spec, table.as_deref(), metric, runs, aggregation)
            });
            handles.push((point_index, policy_index, handle));
        }
    }

    let mut values = vec![vec![f64::NAN; policies.len()]; points.len()];
    for (point_index, policy_index, handle) in handles {
        let value = handle
            .await
            .map_err(|err| EngineError::Worker(err.to_string()))??;
        values[point_index][policy_index] = value;
    }

    Ok(SweepResults {
        points,
        policies: policies.to_vec(),
        values,
    })
}
