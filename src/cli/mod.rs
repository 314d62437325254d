//! CLI module for strandr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for thermodynamic
//! calculations, dimer search, and primer design.

pub mod commands;

pub use commands::Cli;
