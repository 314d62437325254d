//! Unwanted-structure classification of dimers.
//!
//! A dimer is unwanted only when it is stable enough, melts high enough and
//! is long enough, all at once. Any one of these alone is common in ordinary
//! primers and is reported without being flagged.

use serde::{Deserialize, Serialize};

use crate::dimer::{DimerFinderResult, DimerSettings, Direction, find_best_dimer};
use crate::error::Result;
use crate::thermo::{ParameterSet, melting_temperature};

/// Thresholds a dimer must cross, all together, to be unwanted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnwantedThresholds {
    /// Dimers with Gibbs free energy at or below this (kcal/mol)
    pub min_gibbs: f64,
    /// Dimers melting at or above this (Celsius)
    pub max_tm: f64,
    /// Dimers at least this many bases long
    pub max_length: usize,
}

impl Default for UnwantedThresholds {
    fn default() -> Self {
        Self {
            min_gibbs: -7.0,
            max_tm: 20.0,
            max_length: 4,
        }
    }
}

/// Verdict for one dimer plus the text shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub unwanted: bool,
    /// Empty only when there was no dimer to report
    pub report: String,
}

/// Classify a finder result against the thresholds.
///
/// The report is filled for every non-empty dimer, flagged or not.
pub fn classify(
    result: &DimerFinderResult,
    min_gibbs: f64,
    max_tm: f64,
    max_length: usize,
    params: &ParameterSet,
) -> Result<Classification> {
    if result.is_empty() {
        return Ok(Classification::default());
    }

    let tm = melting_temperature(&result.dimer, params)?;
    let length = crate::sequence::normalize(&result.dimer)?.len();
    let energy_unwanted = result.delta_g <= min_gibbs;
    let tm_unwanted = tm >= max_tm;
    let length_unwanted = length >= max_length;
    let unwanted = energy_unwanted && tm_unwanted && length_unwanted;

    log::trace!(
        "dimer {}: dG {:.2} <= {} is {}, Tm {:.2} >= {} is {}, length {} >= {} is {}",
        result.dimer,
        result.delta_g,
        min_gibbs,
        energy_unwanted,
        tm,
        max_tm,
        tm_unwanted,
        length,
        max_length,
        length_unwanted
    );

    let mut report = result.full_report().to_string();
    report.push_str(&format!("Melting temperature: {:.2} C\n", tm));

    Ok(Classification { unwanted, report })
}

fn classify_with(
    header: &str,
    result: &DimerFinderResult,
    thresholds: &UnwantedThresholds,
    params: &ParameterSet,
) -> Result<Classification> {
    let mut classification = classify(
        result,
        thresholds.min_gibbs,
        thresholds.max_tm,
        thresholds.max_length,
        params,
    )?;
    if !classification.report.is_empty() {
        classification.report.insert_str(0, header);
    }
    if classification.unwanted {
        log::debug!("unwanted structure found:\n{}", classification.report);
    }
    Ok(classification)
}

/// Check a sequence for an unwanted self-dimer.
pub fn check_self_dimer(
    seq: &str,
    thresholds: &UnwantedThresholds,
    params: &ParameterSet,
    settings: &DimerSettings,
) -> Result<Classification> {
    let result = find_best_dimer(seq, seq, Direction::DoesntMatter, params, settings)?;
    classify_with("Self-dimer:\n", &result, thresholds, params)
}

/// Check two sequences, both given 5'->3', for an unwanted hetero-dimer.
pub fn check_hetero_dimer(
    forward: &str,
    reverse: &str,
    thresholds: &UnwantedThresholds,
    params: &ParameterSet,
    settings: &DimerSettings,
) -> Result<Classification> {
    let result = find_best_dimer(forward, reverse, Direction::Forward, params, settings)?;
    classify_with("Hetero-dimer:\n", &result, thresholds, params)
}
