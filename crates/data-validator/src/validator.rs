//! Range and format checks for sensor payloads

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name reported for temperature failures
pub const TEMPERATURE_FIELD: &str = "temperature";

/// Validation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Lowest plausible sensor reading (°C), unbounded when unset
    pub temperature_min: Option<f64>,
    /// Highest plausible sensor reading (°C), unbounded when unset
    pub temperature_max: Option<f64>,
}

/// Validator for incoming temperature samples
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Read a temperature from a raw JSON field.
    ///
    /// Accepts a JSON number or a string holding one. Absent, `null`,
    /// non-numeric or non-finite input is rejected.
    pub fn parse_temperature(&self, raw: Option<&Value>) -> Result<f64, ValidationError> {
        let value = match raw {
            None | Some(Value::Null) => return Err(ValidationError::MissingField(TEMPERATURE_FIELD)),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| ValidationError::InvalidFormat {
                field: TEMPERATURE_FIELD,
                reason: format!("{} is not representable as a float", n),
            })?,
            Some(Value::String(s)) => {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| ValidationError::InvalidFormat {
                        field: TEMPERATURE_FIELD,
                        reason: format!("'{}' is not a number", s),
                    })?
            }
            Some(other) => {
                return Err(ValidationError::InvalidFormat {
                    field: TEMPERATURE_FIELD,
                    reason: format!("expected a number, got {}", json_kind(other)),
                })
            }
        };

        self.validate_temperature(value)?;
        Ok(value)
    }

    /// Validate an already-numeric temperature
    pub fn validate_temperature(&self, value: f64) -> Result<(), ValidationError> {
        ensure_finite(TEMPERATURE_FIELD, value)?;
        let min = self.config.temperature_min.unwrap_or(f64::NEG_INFINITY);
        let max = self.config.temperature_max.unwrap_or(f64::INFINITY);
        self.validate_range(TEMPERATURE_FIELD, value, (min, max))
    }
}

/// Reject NaN and infinities
pub fn ensure_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NotFinite { field, value })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_temperature() {
        let validator = Validator::default();
        assert_eq!(validator.parse_temperature(Some(&json!(30))).unwrap(), 30.0);
        assert_eq!(validator.parse_temperature(Some(&json!(-4.5))).unwrap(), -4.5);
    }

    #[test]
    fn test_numeric_string_temperature() {
        let validator = Validator::default();
        assert_eq!(validator.parse_temperature(Some(&json!(" 26.25 "))).unwrap(), 26.25);
    }

    #[test]
    fn test_missing_temperature() {
        let validator = Validator::default();
        assert_eq!(
            validator.parse_temperature(None),
            Err(ValidationError::MissingField(TEMPERATURE_FIELD))
        );
        assert_eq!(
            validator.parse_temperature(Some(&Value::Null)),
            Err(ValidationError::MissingField(TEMPERATURE_FIELD))
        );
    }

    #[test]
    fn test_non_numeric_temperature() {
        let validator = Validator::default();
        assert!(matches!(
            validator.parse_temperature(Some(&json!("abc"))),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validator.parse_temperature(Some(&json!(true))),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validator.parse_temperature(Some(&json!([30]))),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_non_finite_string() {
        let validator = Validator::default();
        assert!(matches!(
            validator.parse_temperature(Some(&json!("NaN"))),
            Err(ValidationError::NotFinite { .. })
        ));
        assert!(matches!(
            validator.parse_temperature(Some(&json!("inf"))),
            Err(ValidationError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_unbounded_by_default() {
        let validator = Validator::default();
        assert!(validator.validate_temperature(-273.0).is_ok());
        assert!(validator.validate_temperature(1.0e6).is_ok());
    }

    #[test]
    fn test_configured_range() {
        let validator = Validator::new(ValidationConfig {
            temperature_min: Some(-55.0),
            temperature_max: Some(125.0),
        });
        assert!(validator.validate_temperature(-55.0).is_ok());
        assert!(validator.validate_temperature(125.0).is_ok());
        assert!(matches!(
            validator.parse_temperature(Some(&json!(130))),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
