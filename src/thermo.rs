//! Thermodynamic model: melting temperature and Gibbs free energy.
//!
//! Energies come from the SantaLucia (1998) unified nearest-neighbor table.
//! Enthalpy is in kcal/mol, entropy in cal/(K*mol), temperatures in Celsius.
//! All functions are pure; empty or non-ACGT input is an error.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandrError};
use crate::sequence::{self, complement, gc_count};

/// Gas constant in cal/(K*mol)
pub const GAS_CONSTANT: f64 = 1.987;

const KELVIN: f64 = 273.15;

/// Below this length the rough method falls back to the Wallace rule.
const WALLACE_MAX_LEN: usize = 14;

/// How melting temperature is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TmMethod {
    /// Wallace rule for short oligos, GC-content formula otherwise
    Rough,
    /// Two-state nearest-neighbor model with salt-corrected entropy
    #[default]
    NearestNeighbor,
}

/// Reaction conditions and method used by every thermodynamic calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    pub method: TmMethod,
    /// Temperature at which Gibbs free energy is evaluated
    pub temperature_c: f64,
    /// Total strand concentration, nM
    pub dna_nm: f64,
    /// Monovalent cation concentration, mM
    pub na_mm: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            method: TmMethod::NearestNeighbor,
            temperature_c: 37.0,
            dna_nm: 50.0,
            na_mm: 50.0,
        }
    }
}

impl ParameterSet {
    pub fn rough() -> Self {
        Self {
            method: TmMethod::Rough,
            ..Self::default()
        }
    }

    fn kelvin(&self) -> f64 {
        self.temperature_c + KELVIN
    }

    /// Entropy correction applied per nearest-neighbor stack.
    fn salt_entropy_per_stack(&self) -> f64 {
        0.368 * (self.na_mm / 1000.0).ln()
    }
}

/// Enthalpy/entropy of the stack `5'-xy-3' / 3'-x'y'-5'`.
fn stack_params(x: u8, y: u8) -> (f64, f64) {
    match (x, y) {
        (b'A', b'A') | (b'T', b'T') => (-7.9, -22.2),
        (b'A', b'T') => (-7.2, -20.4),
        (b'T', b'A') => (-7.2, -21.3),
        (b'C', b'A') | (b'T', b'G') => (-8.5, -22.7),
        (b'G', b'T') | (b'A', b'C') => (-8.4, -22.4),
        (b'C', b'T') | (b'A', b'G') => (-7.8, -21.0),
        (b'G', b'A') | (b'T', b'C') => (-8.2, -22.2),
        (b'C', b'G') => (-10.6, -27.2),
        (b'G', b'C') => (-9.8, -24.4),
        (b'G', b'G') | (b'C', b'C') => (-8.0, -19.9),
        _ => (0.0, 0.0),
    }
}

/// Initiation term for a duplex end closed by `base`.
fn initiation_params(base: u8) -> (f64, f64) {
    match base {
        b'G' | b'C' => (0.1, -2.8),
        _ => (2.3, 4.1),
    }
}

/// Gibbs free energy of one nearest-neighbor stack at the set's temperature.
pub fn stack_energy(x: u8, y: u8, params: &ParameterSet) -> f64 {
    let (dh, ds) = stack_params(x, y);
    dh - params.kelvin() * (ds + params.salt_entropy_per_stack()) / 1000.0
}

/// Gibbs free energy of one duplex end closed by `base`.
pub fn initiation_energy(base: u8, params: &ParameterSet) -> f64 {
    let (dh, ds) = initiation_params(base);
    dh - params.kelvin() * ds / 1000.0
}

/// Summed enthalpy and entropy of a perfectly paired duplex.
fn duplex_params(seq: &[u8], params: &ParameterSet) -> (f64, f64) {
    let (mut dh, mut ds) = (0.0, 0.0);
    for pair in seq.windows(2) {
        let (h, s) = stack_params(pair[0], pair[1]);
        dh += h;
        ds += s + params.salt_entropy_per_stack();
    }
    for end in [seq[0], seq[seq.len() - 1]] {
        let (h, s) = initiation_params(end);
        dh += h;
        ds += s;
    }
    if is_self_complementary(seq) {
        ds -= 1.4;
    }
    (dh, ds)
}

fn is_self_complementary(seq: &[u8]) -> bool {
    seq.iter()
        .zip(seq.iter().rev())
        .all(|(&a, &b)| complement(a) == b)
}

fn checked(seq: &str, what: &str) -> Result<Vec<u8>> {
    let bases = sequence::normalize(seq)?;
    if bases.is_empty() {
        return Err(StrandrError::EmptySequence(what.to_string()));
    }
    Ok(bases)
}

/// Melting temperature (Celsius) of `seq` paired with its complement.
pub fn melting_temperature(seq: &str, params: &ParameterSet) -> Result<f64> {
    let bases = checked(seq, "melting temperature needs at least one base")?;
    Ok(melting_temperature_of(&bases, params))
}

/// Melting temperature of an already normalized, non-empty sequence.
pub(crate) fn melting_temperature_of(bases: &[u8], params: &ParameterSet) -> f64 {
    let n = bases.len();
    let gc = gc_count(bases) as f64;
    match params.method {
        TmMethod::Rough if n < WALLACE_MAX_LEN => 2.0 * (n as f64 - gc) + 4.0 * gc,
        TmMethod::Rough => 64.9 + 41.0 * (gc - 16.4) / n as f64,
        TmMethod::NearestNeighbor => {
            let (dh, ds) = duplex_params(bases, params);
            let factor = if is_self_complementary(bases) { 1.0 } else { 4.0 };
            let ct = params.dna_nm * 1e-9;
            dh * 1000.0 / (ds + GAS_CONSTANT * (ct / factor).ln()) - KELVIN
        }
    }
}

/// Gibbs free energy (kcal/mol) of the duplex whose top strand is `paired`.
pub fn gibbs_free_energy(paired: &str, params: &ParameterSet) -> Result<f64> {
    let bases = checked(paired, "Gibbs free energy needs at least one paired base")?;
    Ok(gibbs_free_energy_of(&bases, params))
}

pub(crate) fn gibbs_free_energy_of(bases: &[u8], params: &ParameterSet) -> f64 {
    let (dh, ds) = duplex_params(bases, params);
    dh - params.kelvin() * ds / 1000.0
}
