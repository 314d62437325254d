//! Nucleotide helpers shared by the thermodynamic and dimer code.
//!
//! Sequences are handled as uppercase ASCII bytes over `A`, `C`, `G`, `T`.
//! Anything else is rejected up front so no downstream calculation has to
//! guess what an ambiguous symbol should contribute.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandrError};

/// Normalize a nucleotide string: trims, uppercases, and validates every base.
pub fn normalize(seq: &str) -> Result<Vec<u8>> {
    seq.trim()
        .chars()
        .enumerate()
        .map(|(position, c)| match c.to_ascii_uppercase() {
            b @ ('A' | 'C' | 'G' | 'T') => Ok(b as u8),
            _ => Err(StrandrError::InvalidNucleotide { symbol: c, position }),
        })
        .collect()
}

/// Watson-Crick complement of a single base.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

/// True when `a` and `b` form a Watson-Crick pair.
pub fn is_complementary(a: u8, b: u8) -> bool {
    complement(a) == b
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// GC count of a normalized sequence.
pub fn gc_count(seq: &[u8]) -> usize {
    seq.iter().filter(|&&b| b == b'G' || b == b'C').count()
}

/// Half-open region `[start, start + length)` over a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub start: usize,
    pub length: usize,
}

impl Region {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// One past the last position covered.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True when the whole region lies within a sequence of `len` bases.
    pub fn fits(&self, len: usize) -> bool {
        self.start
            .checked_add(self.length)
            .is_some_and(|end| end <= len)
    }
}

impl fmt::Display for Region {
    /// One-based inclusive coordinates, the way sequence viewers show them.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "{}..{} (empty)", self.start + 1, self.start)
        } else {
            write!(f, "{}..{}", self.start + 1, self.end())
        }
    }
}

impl FromStr for Region {
    type Err = StrandrError;

    /// Parses `START:LENGTH` with a zero-based start.
    fn from_str(s: &str) -> Result<Self> {
        let (start, length) = s
            .split_once(':')
            .ok_or_else(|| StrandrError::InvalidRegion(format!("expected START:LENGTH, got '{}'", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| StrandrError::InvalidRegion(format!("'{}' is not a non-negative integer", v)))
        };
        Ok(Region::new(parse(start)?, parse(length)?))
    }
}
