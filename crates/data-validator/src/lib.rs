//! Data Validation
//!
//! Input validation and range checking for sensor samples and relay commands.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{ensure_finite, ValidationConfig, Validator, TEMPERATURE_FIELD};
