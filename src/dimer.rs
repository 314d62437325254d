//! Primer dimer search.
//!
//! Sequence B is laid antiparallel under sequence A and slid across every
//! offset that leaves at least one base overlapping, `len(A) + len(B) - 1`
//! alignments in total. Within an alignment every contiguous run of
//! complementary pairs is scored with nearest-neighbor stack energies plus
//! initiation terms for its two ends. A mismatch ends a run, so unpaired
//! stretches never count toward a dimer. The most stable run wins.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandrError};
use crate::sequence::{self, Region, is_complementary, reverse_complement};
use crate::thermo::{ParameterSet, initiation_energy, stack_energy};

/// Energies closer than this are treated as equal when breaking ties.
const ENERGY_EPSILON: f64 = 1e-9;

/// How sequence B is presented to the finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// B is a separate 5'->3' strand and pairs as given
    Forward,
    /// B is written on the opposite strand and is reverse-complemented first
    Reverse,
    /// Orientation carries no meaning (self-dimers); treated like `Forward`
    DoesntMatter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimerSettings {
    /// Alignments must score strictly below this energy (kcal/mol) to count
    pub noise_floor: f64,
}

impl Default for DimerSettings {
    fn default() -> Self {
        Self { noise_floor: 0.0 }
    }
}

/// Best hybridization found between two sequences.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimerFinderResult {
    /// Paired run within sequence A, `None` when nothing paired
    pub overlap_a: Option<Region>,
    /// Paired run within sequence B as the caller passed it
    pub overlap_b: Option<Region>,
    /// Bases of A taking part in the dimer
    pub dimer: String,
    /// Gibbs free energy of the pairing, kcal/mol
    pub delta_g: f64,
    pub base_pairs: usize,
    pub report: String,
}

impl DimerFinderResult {
    pub fn empty() -> Self {
        Self {
            overlap_a: None,
            overlap_b: None,
            dimer: String::new(),
            delta_g: 0.0,
            base_pairs: 0,
            report: String::new(),
        }
    }

    /// True when no alignment scored below the noise floor.
    pub fn is_empty(&self) -> bool {
        self.overlap_a.is_none() || self.dimer.is_empty()
    }

    pub fn full_report(&self) -> &str {
        &self.report
    }
}

/// One contiguous paired run at one alignment offset.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Position in A facing the first base of the partner strand
    shift: isize,
    first: usize,
    last: usize,
    delta_g: f64,
}

impl Candidate {
    /// Every base in a run is paired, so this is also the base pair count.
    fn length(&self) -> usize {
        self.last - self.first + 1
    }

    /// More stable wins, then the longer overlap. Equal candidates keep the
    /// earlier (leftmost) one because runs are visited left to right.
    fn beats(&self, other: &Candidate) -> bool {
        let diff = self.delta_g - other.delta_g;
        if diff < -ENERGY_EPSILON {
            return true;
        }
        diff.abs() <= ENERGY_EPSILON && self.length() > other.length()
    }
}

/// Find the most stable dimer between `a` and `b`.
///
/// For self-dimers pass the same sequence twice with [`Direction::DoesntMatter`].
pub fn find_best_dimer(
    a: &str,
    b: &str,
    direction: Direction,
    params: &ParameterSet,
    settings: &DimerSettings,
) -> Result<DimerFinderResult> {
    let a = checked(a, "dimer search needs a non-empty first sequence")?;
    let b = checked(b, "dimer search needs a non-empty second sequence")?;

    let oriented = match direction {
        Direction::Reverse => reverse_complement(&b),
        Direction::Forward | Direction::DoesntMatter => b,
    };
    // Partner strand written 3'->5' so index j sits under A[shift + j].
    let partner: Vec<u8> = oriented.iter().rev().copied().collect();

    let mut best: Option<Candidate> = None;
    for shift in -(partner.len() as isize - 1)..a.len() as isize {
        let Some(candidate) = score_alignment(&a, &partner, shift, params) else {
            continue;
        };
        if candidate.delta_g >= settings.noise_floor {
            continue;
        }
        if best.as_ref().is_none_or(|current| candidate.beats(current)) {
            best = Some(candidate);
        }
    }

    let Some(best) = best else {
        log::trace!("no dimer below noise floor {}", settings.noise_floor);
        return Ok(DimerFinderResult::empty());
    };

    let m = partner.len();
    let j_first = (best.first as isize - best.shift) as usize;
    let j_last = (best.last as isize - best.shift) as usize;
    let length = best.length();
    let overlap_b = match direction {
        Direction::Reverse => Region::new(j_first, length),
        Direction::Forward | Direction::DoesntMatter => Region::new(m - 1 - j_last, length),
    };
    let dimer = String::from_utf8_lossy(&a[best.first..=best.last]).into_owned();
    let report = render_report(&a, &partner, &best, &dimer);

    Ok(DimerFinderResult {
        overlap_a: Some(Region::new(best.first, length)),
        overlap_b: Some(overlap_b),
        dimer,
        delta_g: best.delta_g,
        base_pairs: length,
        report,
    })
}

fn checked(seq: &str, what: &str) -> Result<Vec<u8>> {
    let bases = sequence::normalize(seq)?;
    if bases.is_empty() {
        return Err(StrandrError::EmptySequence(what.to_string()));
    }
    Ok(bases)
}

fn paired_at(a: &[u8], partner: &[u8], shift: isize, i: usize) -> bool {
    is_complementary(a[i], partner[(i as isize - shift) as usize])
}

/// Best paired run of A against the partner placed at `shift`; `None` when
/// no two adjacent positions pair.
fn score_alignment(a: &[u8], partner: &[u8], shift: isize, params: &ParameterSet) -> Option<Candidate> {
    let lo = shift.max(0) as usize;
    let hi = (shift + partner.len() as isize).min(a.len() as isize) as usize;

    let mut best: Option<Candidate> = None;
    let mut i = lo;
    while i < hi {
        if !paired_at(a, partner, shift, i) {
            i += 1;
            continue;
        }
        let first = i;
        let mut delta_g = 0.0;
        while i + 1 < hi && paired_at(a, partner, shift, i + 1) {
            delta_g += stack_energy(a[i], a[i + 1], params);
            i += 1;
        }
        let last = i;
        i += 1;

        // A lone pair has no stack to hold it.
        if last == first {
            continue;
        }
        let candidate = Candidate {
            shift,
            first,
            last,
            delta_g: delta_g + initiation_energy(a[first], params) + initiation_energy(a[last], params),
        };
        if best.as_ref().is_none_or(|current| candidate.beats(current)) {
            best = Some(candidate);
        }
    }
    best
}

/// Plain-text report with the duplex drawn as two strands and pair marks.
fn render_report(a: &[u8], partner: &[u8], best: &Candidate, dimer: &str) -> String {
    let pad_a = (-best.shift).max(0) as usize;
    let pad_p = best.shift.max(0) as usize;

    let mut marks = String::new();
    for column in 0..pad_a + a.len() {
        let paired = column
            .checked_sub(pad_a)
            .filter(|&i| i >= best.first && i <= best.last)
            .is_some_and(|i| paired_at(a, partner, best.shift, i));
        marks.push(if paired { '|' } else { ' ' });
    }

    let mut report = String::new();
    let _ = writeln!(report, "Delta G: {:.2} kcal/mol", best.delta_g);
    let _ = writeln!(report, "Base pairs: {}", best.length());
    let _ = writeln!(report, "Dimer: {}", dimer);
    let _ = writeln!(report, "5'-{}{}-3'", " ".repeat(pad_a), String::from_utf8_lossy(a));
    let _ = writeln!(report, "   {}", marks.trim_end());
    let _ = writeln!(report, "3'-{}{}-5'", " ".repeat(pad_p), String::from_utf8_lossy(partner));
    report
}
