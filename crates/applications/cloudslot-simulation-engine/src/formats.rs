//! Policy names
//!
//! Known formats:
//! - `NRAP`
//! - `PQ(key)` with key one of `v/w`, `v/wi`, `-d`, `v`, `-w`, `v/d`
//! - `PPPQ(b:y[:wc])` fixed pessimistic and preemption factors
//! - `PPPQ(c[:wc])` factors looked up for deadline cushion `c`
//! - `PPPQ(opt[:wc])` factors for the tightest cushion of the input
//! - `PPPQ(var[:wc])` factors for the cushion chosen by the sweep

use cloudslot_core::{PolicySpec, PppqParameterSource, PppqParameters, RankKey};

use crate::error::{EngineError, Result};

/// Human readable list of the accepted formats
pub const AVAILABLE_POLICIES: &str =
    "NRAP, PQ([v/w|v/wi|-d|v|-w|v/d]), PPPQ({b:y,c,opt,var}[:wc])";

fn unknown(name: &str) -> EngineError {
    EngineError::UnknownPolicy {
        name: name.to_string(),
        available: AVAILABLE_POLICIES.to_string(),
    }
}

/// Non-negative decimal made of digits and dots only
fn parse_factor(raw: &str) -> Option<f64> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    raw.parse().ok()
}

fn parse_pppq(args: &str) -> Option<PolicySpec> {
    let (args, work_conservative) = match args.strip_suffix(":wc") {
        Some(rest) => (rest, true),
        None => (args, false),
    };
    let source = match args.split(':').collect::<Vec<_>>().as_slice() {
        ["opt"] => PppqParameterSource::InputOptimal,
        ["var"] => PppqParameterSource::Controlled,
        [cushion] => PppqParameterSource::Cushion(parse_factor(cushion)?),
        [pessimistic, preemption] => PppqParameterSource::Fixed(PppqParameters::new(
            parse_factor(pessimistic)?,
            parse_factor(preemption)?,
        )),
        _ => return None,
    };
    Some(PolicySpec::PessimisticPreemptive {
        source,
        work_conservative,
    })
}

/// Parse a policy name into its configuration
pub fn parse_policy(name: &str) -> Result<PolicySpec> {
    let name = name.trim();
    if name == "NRAP" {
        return Ok(PolicySpec::NaiveAdmission);
    }
    let parsed = if let Some(args) = name.strip_prefix("PQ(").and_then(|rest| rest.strip_suffix(')')) {
        RankKey::from_code(args).map(PolicySpec::RankedQueue)
    } else if let Some(args) = name.strip_prefix("PPPQ(").and_then(|rest| rest.strip_suffix(')')) {
        parse_pppq(args)
    } else {
        None
    };
    parsed.ok_or_else(|| unknown(name))
}

/// Parse a list of names, failing on the first unknown one
pub fn parse_policies<S: AsRef<str>>(names: &[S]) -> Result<Vec<PolicySpec>> {
    names.iter().map(|name| parse_policy(name.as_ref())).collect()
}
