//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - tm: melting temperature and Gibbs free energy of a sequence
//! - dimer: best dimer between one or two sequences
//! - design: primer design over a target sequence

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use strandr::sequence::Region;

/// Strandr - primer design with dimer-risk analysis
#[derive(Parser, Debug)]
#[command(name = "strandr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

fn parse_region(s: &str) -> Result<Region, String> {
    s.parse::<Region>().map_err(|e| e.to_string())
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Melting temperature and Gibbs free energy of a sequence
    Tm {
        /// Sequence, 5'->3'
        sequence: String,
    },

    /// Find the most stable dimer between two sequences
    Dimer {
        /// First sequence, 5'->3'
        sequence_a: String,

        /// Second sequence; omit for a self-dimer
        sequence_b: Option<String>,

        /// Second sequence is given on the opposite strand
        #[arg(short, long)]
        reverse: bool,
    },

    /// Design a primer pair over a target sequence
    Design {
        /// Target sequence, 5'->3'
        sequence: String,

        /// Area searched for the forward primer, START:LENGTH (zero-based)
        #[arg(short, long, value_parser = parse_region)]
        left_area: Region,

        /// Area searched for the reverse primer, START:LENGTH (zero-based)
        #[arg(short = 'R', long, value_parser = parse_region)]
        right_area: Region,

        /// Overhang appended to the forward primer
        #[arg(long)]
        left_overhang: Option<String>,

        /// Overhang appended to the reverse primer
        #[arg(long)]
        right_overhang: Option<String>,

        /// Existing forward primer to check
        #[arg(long)]
        forward_primer: Option<String>,

        /// Existing reverse primer to check
        #[arg(long)]
        reverse_primer: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}
