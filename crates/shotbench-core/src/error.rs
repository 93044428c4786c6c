//! Error types for benchmark configuration and shot acquisition.
//!
//! Two families live here:
//! - [`BenchError`]: structural/input problems. These abort a run before (or, for
//!   estimates outside the valid range, during) tensor collection.
//! - [`AcquisitionError`]: a single protocol invocation could not obtain its shots.
//!   The harness records the affected row as abandoned and keeps going.

use thiserror::Error;

/// Input and structural errors that abort a benchmark run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BenchError {
    #[error("shot grid is empty")]
    EmptyShotGrid,

    #[error("shot grid must be strictly increasing: {previous} is followed by {next}")]
    NonIncreasingShotGrid { previous: u64, next: u64 },

    #[error("shot grid contains a zero budget")]
    ZeroShotBudget,

    #[error("replicate count must be positive")]
    ZeroReplicates,

    #[error("protocol list is empty")]
    EmptyProtocolList,

    #[error("protocol '{0}' is listed more than once")]
    DuplicateProtocol(String),

    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("observable set is empty")]
    EmptyObservableSet,

    #[error("observable id '{0}' is used more than once")]
    DuplicateObservable(String),

    #[error("invalid Pauli character '{0}'")]
    InvalidPauli(char),

    #[error("Pauli string '{label}' has {actual} qubits, expected {expected}")]
    QubitCountMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },

    #[error("{0} qubits requested, at most 64 are supported")]
    TooManyQubits(usize),

    #[error("Bloch vector of qubit {qubit} has norm {norm}, must be at most 1")]
    InvalidBlochVector { qubit: usize, norm: f64 },

    #[error("noise parameter {name} = {value} is out of range")]
    InvalidNoiseParameter { name: &'static str, value: f64 },

    #[error("ground truth {value} for observable '{observable}' is outside [-1, 1]")]
    GroundTruthOutOfRange { observable: String, value: f64 },

    #[error("target epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),

    #[error("delta must lie in (0, 1), got {0}")]
    InvalidDelta(f64),

    #[error("fraction must lie in (0, 1], got {0}")]
    InvalidFraction(f64),

    #[error("protocol '{0}' needs a calibration provider, none was supplied")]
    MissingCalibration(String),

    #[error("calibration failed: {0}")]
    CalibrationFailed(#[from] AcquisitionError),

    #[error("backend has {backend} qubits but observables act on {observables}")]
    BackendMismatch { backend: usize, observables: usize },

    #[error("budget {0} is not on the evaluated grid")]
    BudgetNotEvaluated(u64),

    #[error("tensor dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "protocol '{protocol}' produced estimate {value} for '{observable}', outside [-{bound}, {bound}]"
    )]
    EstimateOutOfRange {
        protocol: String,
        observable: String,
        value: f64,
        bound: f64,
    },
}

/// Failure to acquire shots for a single protocol invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("backend '{backend}' timed out")]
    Timeout { backend: String },

    #[error("backend '{backend}' rejected the request: {reason}")]
    Rejected { backend: String, reason: String },
}

/// Result type for benchmark setup and execution.
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_values() {
        let err = BenchError::NonIncreasingShotGrid {
            previous: 300,
            next: 100,
        };
        assert_eq!(
            err.to_string(),
            "shot grid must be strictly increasing: 300 is followed by 100"
        );

        let err = BenchError::EstimateOutOfRange {
            protocol: "direct_naive".into(),
            observable: "o3".into(),
            value: 1.5,
            bound: 1.0,
        };
        assert!(err.to_string().contains("o3"));
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_acquisition_error_converts_to_calibration_failure() {
        let acq = AcquisitionError::Timeout {
            backend: "sim".into(),
        };
        let err: BenchError = acq.clone().into();
        assert_eq!(err, BenchError::CalibrationFailed(acq));
    }
}
