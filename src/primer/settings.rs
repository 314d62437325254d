//! Settings for a primer design run.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::dimer::DimerSettings;
use crate::error::{Result, StrandrError};
use crate::sequence::{self, Region};
use crate::thermo::ParameterSet;
use crate::unwanted::UnwantedThresholds;

/// Inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerDesignSettings {
    /// Primer the user already has for the forward end, 5'->3'
    pub forward_user_primer: Option<String>,
    /// Primer the user already has for the reverse end, 5'->3'
    pub reverse_user_primer: Option<String>,

    /// Duplex Gibbs free energy a designed primer must have (kcal/mol)
    pub gibbs_free_energy: ValueRange<f64>,
    /// Melting temperature a designed primer must have (Celsius)
    pub melting_point: ValueRange<f64>,
    pub primer_length: ValueRange<usize>,

    pub unwanted: UnwantedThresholds,

    /// Where the forward primer is searched
    pub left_area: Region,
    /// Where the reverse primer is searched
    pub right_area: Region,

    pub left_overhang: String,
    pub right_overhang: String,

    pub thermo: ParameterSet,
    pub dimer: DimerSettings,
}

impl Default for PrimerDesignSettings {
    fn default() -> Self {
        Self {
            forward_user_primer: None,
            reverse_user_primer: None,
            gibbs_free_energy: ValueRange::new(-45.0, -20.0),
            melting_point: ValueRange::new(52.0, 65.0),
            primer_length: ValueRange::new(18, 30),
            unwanted: UnwantedThresholds::default(),
            left_area: Region::new(0, 0),
            right_area: Region::new(0, 0),
            left_overhang: String::new(),
            right_overhang: String::new(),
            thermo: ParameterSet::default(),
            dimer: DimerSettings::default(),
        }
    }
}

fn check_range<T: PartialOrd + Copy + Display>(name: &str, range: &ValueRange<T>) -> Result<()> {
    if range.is_inverted() {
        return Err(StrandrError::InvalidSettings(format!(
            "{} range is inverted: min {} > max {}",
            name, range.min, range.max
        )));
    }
    Ok(())
}

fn check_area(name: &str, area: &Region, sequence_len: usize) -> Result<()> {
    if !area.fits(sequence_len) {
        return Err(StrandrError::InvalidRegion(format!(
            "{} (start {}, length {}) exceeds the sequence of {} bases",
            name, area.start, area.length, sequence_len
        )));
    }
    Ok(())
}

impl PrimerDesignSettings {
    /// Reject settings that cannot be run against a sequence of
    /// `sequence_len` bases.
    pub fn validate(&self, sequence_len: usize) -> Result<()> {
        check_area("left area", &self.left_area, sequence_len)?;
        check_area("right area", &self.right_area, sequence_len)?;

        check_range("Gibbs free energy", &self.gibbs_free_energy)?;
        check_range("melting point", &self.melting_point)?;
        check_range("primer length", &self.primer_length)?;
        if self.primer_length.min == 0 {
            return Err(StrandrError::InvalidSettings("primer length must be at least 1".to_string()));
        }

        for seq in [&self.left_overhang, &self.right_overhang] {
            sequence::normalize(seq)?;
        }
        for primer in [&self.forward_user_primer, &self.reverse_user_primer].into_iter().flatten() {
            sequence::normalize(primer)?;
        }
        Ok(())
    }
}
