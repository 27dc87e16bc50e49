//! Validation Error Types

use thiserror::Error;

/// Errors during input validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Value could not be read as the expected type
    #[error("Invalid {field}: {reason}")]
    InvalidFormat {
        field: &'static str,
        reason: String,
    },

    /// NaN or infinite number
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    /// Value out of the configured plausibility range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Relay state other than ON/OFF
    #[error("Invalid state '{0}', expected ON or OFF")]
    UnknownState(String),

    /// Relay mode other than AUTO/MANUAL
    #[error("Invalid mode '{0}', expected AUTO or MANUAL")]
    UnknownMode(String),
}
