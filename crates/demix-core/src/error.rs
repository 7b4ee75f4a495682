//! Separation error types

use thiserror::Error;

/// Errors that can occur during source separation
#[derive(Error, Debug)]
pub enum SeparationError {
    /// Caller supplied data that violates a precondition
    /// (empty waveform, channel mismatch, non-finite samples, bad PCM length)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An estimator returned a tensor whose shape disagrees with its input
    #[error("Contract violation by {source_name}: expected shape {expected:?}, got {actual:?}")]
    ContractViolation {
        source_name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Configuration values that cannot produce a working pipeline
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// FFT backend failure
    #[error("FFT failed: {0}")]
    Fft(String),

    /// Estimator failed internally (inference runtime error)
    #[error("Estimator {name} failed: {message}")]
    Estimator { name: String, message: String },
}

impl SeparationError {
    /// Build a contract violation from two ndarray shapes
    pub fn contract(source_name: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ContractViolation {
            source_name: source_name.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SeparationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violation_message() {
        let err = SeparationError::contract("vocals", &[1, 2, 512, 1024], &[1, 2, 512, 512]);
        let msg = err.to_string();
        assert!(msg.contains("vocals"), "missing source name: {}", msg);
        assert!(msg.contains("[1, 2, 512, 1024]"), "missing expected shape: {}", msg);
    }
}
