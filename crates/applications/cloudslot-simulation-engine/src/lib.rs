//! Cloudslot Simulation Engine
//!
//! Turns cluster traces into slotted job inputs and evaluates the scheduling
//! policies of `cloudslot-core` over them:
//! - `trace`: task event parsing and per-task summaries
//! - `input`: job generation from summaries
//! - `sweep`: parallel evaluation of policies over a parameter range
//! - `render`: table and TSV output of sweep results

pub mod error;
pub mod formats;
pub mod input;
pub mod params_table;
pub mod render;
pub mod stats;
pub mod sweep;
pub mod trace;

pub use error::{EngineError, Result};
pub use formats::{AVAILABLE_POLICIES, parse_policies, parse_policy};
pub use input::{Input, InputParameters, ONE_SECOND, generate_input};
pub use params_table::{ParameterTable, resolve_parameters};
pub use sweep::{Aggregation, Metric, Range, SweepConfig, SweepResults, Variable, run_sweep, simulate};
pub use trace::{TaskEvent, TaskEventsSummary};
