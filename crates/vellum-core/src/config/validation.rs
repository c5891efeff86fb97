//! Configuration validation utilities

use crate::errors::{InvalidArgument, VellumError};
use std::fmt;

/// Configuration validation result
pub type ValidationResult = Result<(), ValidationError>;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Value is required but missing or empty
    Required { field: String },
    /// Value is out of acceptable range
    OutOfRange {
        field: String,
        min: Option<u64>,
        max: Option<u64>,
        actual: u64,
    },
    /// Value format is invalid
    InvalidFormat {
        field: String,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Required { field } => {
                write!(f, "Field '{field}' is required but missing")
            }
            ValidationError::OutOfRange {
                field,
                min,
                max,
                actual,
            } => {
                let range_desc = match (min, max) {
                    (Some(min), Some(max)) => format!("between {min} and {max}"),
                    (Some(min), None) => format!("at least {min}"),
                    (None, Some(max)) => format!("at most {max}"),
                    (None, None) => "in valid range".to_string(),
                };
                write!(f, "Field '{field}' must be {range_desc} (got {actual})")
            }
            ValidationError::InvalidFormat {
                field,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Field '{field}' has invalid format. Expected: {expected}, got: {actual}"
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for VellumError {
    fn from(err: ValidationError) -> Self {
        VellumError::invalid(InvalidArgument::Other {
            message: err.to_string(),
        })
    }
}

/// Validator that accumulates rule failures for one configuration value
#[derive(Debug, Default)]
pub struct ConfigValidator {
    errors: Vec<ValidationError>,
}

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate that a string is present and not blank
    pub fn non_empty(&mut self, field_name: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(ValidationError::Required {
                field: field_name.to_string(),
            });
        }
        self
    }

    /// Validate that a number is within range
    pub fn range(
        &mut self,
        field_name: &str,
        value: u64,
        min: Option<u64>,
        max: Option<u64>,
    ) -> &mut Self {
        let below = min.is_some_and(|min| value < min);
        let above = max.is_some_and(|max| value > max);
        if below || above {
            self.errors.push(ValidationError::OutOfRange {
                field: field_name.to_string(),
                min,
                max,
                actual: value,
            });
        }
        self
    }

    /// Validate that a string is one of the accepted spellings
    pub fn one_of(&mut self, field_name: &str, value: &str, accepted: &[&str]) -> &mut Self {
        if !accepted.contains(&value) {
            self.errors.push(ValidationError::InvalidFormat {
                field: field_name.to_string(),
                expected: accepted.join(" | "),
                actual: value.to_string(),
            });
        }
        self
    }

    /// Get validation result, reporting the first failure
    pub fn result(self) -> ValidationResult {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Get all validation errors
    pub fn all_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}
