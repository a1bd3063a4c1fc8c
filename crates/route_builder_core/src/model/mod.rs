//! Domain model for routes, places and typed criteria.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Validate field-level constraints before anything reaches storage.
//!
//! # Invariants
//! - Routes and places are identified externally by a stable UUID and
//!   internally by a storage row id.
//! - `Route::is_draft` is derived from `details`; it is never stored.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod criterion;
pub mod place;
pub mod route;

/// Maximum length for human-readable names.
pub const NAME_MAX_CHARS: usize = 255;

/// Maximum length for stored criterion values.
pub const VALUE_MAX_CHARS: usize = 255;

/// Field-level validation failure for domain records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// Required text field is empty after trimming.
    EmptyField(&'static str),
    /// Text field exceeds its maximum length.
    FieldTooLong { field: &'static str, max_chars: usize },
    /// Criterion internal name contains unsupported characters.
    InvalidInternalName(String),
    /// Criterion internal name collides with a build-request envelope key.
    ReservedInternalName(String),
    /// Latitude outside [-90, 90] or not finite.
    LatitudeOutOfRange(String),
    /// Longitude outside [-180, 180] or not finite.
    LongitudeOutOfRange(String),
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "`{field}` must not be empty"),
            Self::FieldTooLong { field, max_chars } => {
                write!(f, "`{field}` must be at most {max_chars} characters")
            }
            Self::InvalidInternalName(value) => write!(
                f,
                "internal name `{value}` may only contain ASCII letters, digits, `_`, `.` or `-`"
            ),
            Self::ReservedInternalName(value) => {
                write!(f, "internal name `{value}` is reserved")
            }
            Self::LatitudeOutOfRange(value) => {
                write!(f, "latitude {value} must be within [-90, 90]")
            }
            Self::LongitudeOutOfRange(value) => {
                write!(f, "longitude {value} must be within [-180, 180]")
            }
        }
    }
}

impl Error for ModelValidationError {}

/// Validates a required human-readable name and returns it trimmed.
pub fn validate_name(field: &'static str, value: &str) -> Result<String, ModelValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ModelValidationError::EmptyField(field));
    }
    if trimmed.chars().count() > NAME_MAX_CHARS {
        return Err(ModelValidationError::FieldTooLong {
            field,
            max_chars: NAME_MAX_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Checks the stored-length bound of a raw criterion value.
pub fn validate_criterion_value(value: &str) -> Result<(), ModelValidationError> {
    if value.chars().count() > VALUE_MAX_CHARS {
        return Err(ModelValidationError::FieldTooLong {
            field: "value",
            max_chars: VALUE_MAX_CHARS,
        });
    }
    Ok(())
}
