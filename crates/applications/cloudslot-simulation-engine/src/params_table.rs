//! Precomputed PPPQ parameters by deadline cushion
//!
//! The table is a TSV file with one row per cushion:
//! `cushion  competitiveness  preemption_factor  pessimistic_factor`.

use std::fs;
use std::path::Path;

use cloudslot_core::{PolicySpec, PppqParameterSource, PppqParameters};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::input::InputParameters;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub cushion: f64,
    pub competitiveness: f64,
    pub preemption_factor: f64,
    pub pessimistic_factor: f64,
}

impl ParameterEntry {
    pub fn parameters(&self) -> PppqParameters {
        PppqParameters::new(self.pessimistic_factor, self.preemption_factor)
    }
}

/// Entries sorted by cushion
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTable {
    entries: Vec<ParameterEntry>,
}

impl ParameterTable {
    pub fn new(mut entries: Vec<ParameterEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(EngineError::param_table("table has no entries"));
        }
        if entries.iter().any(|entry| !entry.cushion.is_finite()) {
            return Err(EngineError::param_table("cushions must be finite"));
        }
        entries.sort_by(|a, b| a.cushion.total_cmp(&b.cushion));
        Ok(ParameterTable { entries })
    }

    /// Parse TSV rows, skipping blank lines
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let values = line
                .split('\t')
                .map(|field| field.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<f64>, _>>()
                .map_err(|err| EngineError::param_table(format!("line {}: {}", index + 1, err)))?;
            let &[cushion, competitiveness, preemption_factor, pessimistic_factor] = values.as_slice() else {
                return Err(EngineError::param_table(format!(
                    "line {}: expected 4 columns, found {}",
                    index + 1,
                    values.len()
                )));
            };
            entries.push(ParameterEntry {
                cushion,
                competitiveness,
                preemption_factor,
                pessimistic_factor,
            });
        }
        ParameterTable::new(entries)
    }

    pub fn load(path: &Path) -> Result<Self> {
        ParameterTable::parse(&fs::read_to_string(path)?)
    }

    pub fn entries(&self) -> &[ParameterEntry] {
        &self.entries
    }

    /// Entry whose cushion is closest to `cushion`; ties go to the lower entry
    pub fn nearest(&self, cushion: f64) -> &ParameterEntry {
        let upper = self.entries.partition_point(|entry| entry.cushion < cushion);
        if upper == 0 {
            return &self.entries[0];
        }
        let below = &self.entries[upper - 1];
        match self.entries.get(upper) {
            Some(above) if (above.cushion - cushion).abs() < (cushion - below.cushion).abs() => above,
            _ => below,
        }
    }
}

/// Resolve the PPPQ parameters one run of `spec` uses.
///
/// `controlled_cushion` is the cushion chosen by the evaluation point, if
/// any; without one a controlled policy falls back to the defaults.
pub fn resolve_parameters(
    spec: &PolicySpec,
    table: Option<&ParameterTable>,
    input: &InputParameters,
    controlled_cushion: Option<f64>,
) -> Result<PppqParameters> {
    let PolicySpec::PessimisticPreemptive { source, .. } = spec else {
        return Ok(PppqParameters::default());
    };
    let cushion = match source {
        PppqParameterSource::Fixed(parameters) => return Ok(*parameters),
        PppqParameterSource::Cushion(cushion) => *cushion,
        PppqParameterSource::InputOptimal => {
            let tightest = input
                .min_effective_cushion()
                .ok_or_else(|| EngineError::config("no deadline cushions configured"))?;
            1.0 + tightest
        }
        PppqParameterSource::Controlled => match controlled_cushion {
            Some(cushion) => cushion,
            None => return Ok(PppqParameters::default()),
        },
    };
    let table = table.ok_or_else(|| {
        EngineError::param_table(format!("{} needs a parameter table (--param-table)", spec))
    })?;
    Ok(table.nearest(cushion).parameters())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "4\t0.3\t1.5\t0.25\n1\t0.1\t2\t0.5\n\n10\t0.6\t1.1\t0.05\n";

    fn pppq(source: PppqParameterSource) -> PolicySpec {
        PolicySpec::PessimisticPreemptive {
            source,
            work_conservative: false,
        }
    }

    #[test]
    fn test_parse_sorts_entries() {
        let table = ParameterTable::parse(TABLE).unwrap();
        let cushions: Vec<f64> = table.entries().iter().map(|entry| entry.cushion).collect();
        assert_eq!(cushions, vec![1.0, 4.0, 10.0]);
        assert_eq!(table.entries()[0].parameters(), PppqParameters::new(0.5, 2.0));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ParameterTable::parse("").is_err());
        assert!(ParameterTable::parse("1\t2\t3\n").is_err());
        assert!(ParameterTable::parse("1\tx\t3\t4\n").is_err());
    }

    #[test]
    fn test_nearest_entry() {
        let table = ParameterTable::parse(TABLE).unwrap();
        assert_eq!(table.nearest(0.0).cushion, 1.0);
        assert_eq!(table.nearest(2.0).cushion, 1.0);
        // Equidistant: lower entry wins
        assert_eq!(table.nearest(2.5).cushion, 1.0);
        assert_eq!(table.nearest(3.0).cushion, 4.0);
        assert_eq!(table.nearest(4.0).cushion, 4.0);
        assert_eq!(table.nearest(8.0).cushion, 10.0);
        assert_eq!(table.nearest(1000.0).cushion, 10.0);
    }

    #[test]
    fn test_resolve_sources() {
        let table = ParameterTable::parse(TABLE).unwrap();
        let input = InputParameters::default();

        let fixed = pppq(PppqParameterSource::Fixed(PppqParameters::new(0.1, 3.0)));
        assert_eq!(
            resolve_parameters(&fixed, None, &input, None).unwrap(),
            PppqParameters::new(0.1, 3.0)
        );

        let cushion = pppq(PppqParameterSource::Cushion(9.0));
        assert_eq!(
            resolve_parameters(&cushion, Some(&table), &input, None).unwrap(),
            PppqParameters::new(0.05, 1.1)
        );
        assert!(resolve_parameters(&cushion, None, &input, None).is_err());

        // Tightest class cushion is 1, looked up at 1 + 1
        let optimal = pppq(PppqParameterSource::InputOptimal);
        assert_eq!(
            resolve_parameters(&optimal, Some(&table), &input, None).unwrap(),
            PppqParameters::new(0.5, 2.0)
        );

        let controlled = pppq(PppqParameterSource::Controlled);
        assert_eq!(
            resolve_parameters(&controlled, Some(&table), &input, None).unwrap(),
            PppqParameters::default()
        );
        assert_eq!(
            resolve_parameters(&controlled, Some(&table), &input, Some(5.0)).unwrap(),
            PppqParameters::new(0.25, 1.5)
        );

        assert_eq!(
            resolve_parameters(&PolicySpec::NaiveAdmission, None, &input, None).unwrap(),
            PppqParameters::default()
        );
    }
}
