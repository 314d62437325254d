//! Error types for Strandr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Strandr
#[derive(Debug, Error)]
pub enum StrandrError {
    /// A thermodynamic or dimer computation was given no bases
    #[error("Empty sequence: {0}")]
    EmptySequence(String),

    /// Sequence contains a symbol outside A/C/G/T
    #[error("Invalid nucleotide '{symbol}' at position {position}")]
    InvalidNucleotide { symbol: char, position: usize },

    /// Search region does not fit the target sequence
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Settings failed validation before a run
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A task finished with an error
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// A task was canceled before producing a result
    #[error("Task canceled: {0}")]
    Canceled(String),

    /// Scheduler could not drive a task to completion
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Result type alias for Strandr operations
pub type Result<T> = std::result::Result<T, StrandrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sequence_error() {
        let err = StrandrError::EmptySequence("melting temperature".to_string());
        assert_eq!(err.to_string(), "Empty sequence: melting temperature");
    }

    #[test]
    fn test_invalid_nucleotide_error() {
        let err = StrandrError::InvalidNucleotide {
            symbol: 'X',
            position: 3,
        };
        assert_eq!(err.to_string(), "Invalid nucleotide 'X' at position 3");
    }

    #[test]
    fn test_invalid_region_error() {
        let err = StrandrError::InvalidRegion("left area 90..120 exceeds length 100".to_string());
        assert_eq!(err.to_string(), "Invalid region: left area 90..120 exceeds length 100");
    }

    #[test]
    fn test_task_failed_error() {
        let err = StrandrError::TaskFailed("no files matched".to_string());
        assert_eq!(err.to_string(), "Task failed: no files matched");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(StrandrError::Canceled("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
