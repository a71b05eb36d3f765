//! Text renderings of sweep results

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::sweep::SweepResults;

/// Header plus rows of already formatted cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn format_value(value: f64) -> String {
    format!("{:.3}", value)
}

/// Lay the results out as a table.
///
/// With `policies_in_header` each row is one point of the sweep and each
/// column one policy; otherwise rows are policies and columns are points.
pub fn build_table(results: &SweepResults, policies_in_header: bool) -> Table {
    if policies_in_header {
        let header = std::iter::once("Variable".to_string())
            .chain(results.policies.iter().map(|policy| policy.to_string()))
            .collect();
        let rows = results
            .points
            .iter()
            .zip(&results.values)
            .map(|(point, values)| {
                std::iter::once(format_value(point.value))
                    .chain(values.iter().map(|value| format_value(*value)))
                    .collect()
            })
            .collect();
        Table { header, rows }
    } else {
        let header = std::iter::once("Policy".to_string())
            .chain(results.points.iter().map(|point| format_value(point.value)))
            .collect();
        let rows = results
            .policies
            .iter()
            .enumerate()
            .map(|(policy_index, policy)| {
                std::iter::once(policy.to_string())
                    .chain(
                        results
                            .values
                            .iter()
                            .map(|values| format_value(values[policy_index])),
                    )
                    .collect()
            })
            .collect();
        Table { header, rows }
    }
}

/// Right-aligned columns framed by dash lines
pub fn render_table(table: &Table, margin: usize) -> String {
    let num_columns = std::iter::once(&table.header)
        .chain(&table.rows)
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let mut widths = vec![0; num_columns];
    for row in std::iter::once(&table.header).chain(&table.rows) {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule = "-".repeat(widths.iter().sum::<usize>() + 2 * margin * num_columns);
    let render_row = |row: &Vec<String>| -> String {
        row.iter()
            .zip(&widths)
            .map(|(cell, width)| {
                format!(
                    "{}{}{}",
                    " ".repeat(margin + width - cell.chars().count()),
                    cell,
                    " ".repeat(margin)
                )
            })
            .collect()
    };

    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&render_row(&table.header));
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');
    for row in &table.rows {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

/// Tab separated, header first
pub fn render_tsv(table: &Table) -> String {
    std::iter::once(&table.header)
        .chain(&table.rows)
        .map(|row| format!("{}\n", row.join("\t")))
        .collect()
}

pub fn write_tsv(path: &Path, table: &Table) -> Result<()> {
    fs::write(path, render_tsv(table))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputParameters;
    use crate::sweep::Variable;
    use cloudslot_core::{ModelParameters, PolicySpec, RankKey};

    fn results() -> SweepResults {
        let input = InputParameters::default();
        let model = ModelParameters::default();
        SweepResults {
            points: [1.0, 2.5]
                .iter()
                .map(|x| Variable::AllocationCost.point(*x, &input, &model).unwrap())
                .collect(),
            policies: vec![PolicySpec::NaiveAdmission, PolicySpec::RankedQueue(RankKey::Value)],
            values: vec![vec![10.0, 12.25], vec![-3.0, 0.1234]],
        }
    }

    #[test]
    fn test_build_table_orientations() {
        let by_point = build_table(&results(), true);
        assert_eq!(by_point.header, vec!["Variable", "NRAP", "PQ(v)"]);
        assert_eq!(by_point.rows[1], vec!["2.500", "-3.000", "0.123"]);

        let by_policy = build_table(&results(), false);
        assert_eq!(by_policy.header, vec!["Policy", "1.000", "2.500"]);
        assert_eq!(by_policy.rows[1], vec!["PQ(v)", "12.250", "0.123"]);
    }

    #[test]
    fn test_render_table() {
        let table = Table {
            header: vec!["Policy".to_string(), "1".to_string()],
            rows: vec![vec!["NRAP".to_string(), "10.000".to_string()]],
        };
        let rendered = render_table(&table, 2);
        let lines: Vec<&str> = rendered.lines().collect();

        // widths 6 and 6, two columns with a margin of 2 on each side
        let rule = "-".repeat(20);
        assert_eq!(lines, vec![
            rule.as_str(),
            "  Policy         1  ",
            rule.as_str(),
            "    NRAP    10.000  ",
            rule.as_str(),
        ]);
    }

    #[test]
    fn test_render_tsv() {
        let table = build_table(&results(), true);
        assert_eq!(
            render_tsv(&table),
            "Variable\tNRAP\tPQ(v)\n1.000\t10.000\t12.250\n2.500\t-3.000\t0.123\n"
        );
    }
}
