//! Criterion domain model.
//!
//! # Invariants
//! - `internal_name` is unique across all criteria and is the key used in
//!   build-request messages.
//! - `kind` decides which raw values are acceptable; it is assumed stable once
//!   values reference the criterion.

use crate::model::{validate_name, ModelValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Storage row id of a criterion.
pub type CriterionId = i64;

/// Maximum length of `Criterion::internal_name`.
pub const INTERNAL_NAME_MAX_CHARS: usize = 63;

/// Top-level build-request key holding the ordered `[lat, lon]` pairs.
pub const POINTS_COORDINATES_KEY: &str = "points_coordinates";

/// Keys that build-request messages already use at top level.
pub const RESERVED_INTERNAL_NAMES: &[&str] = &[POINTS_COORDINATES_KEY];

static INTERNAL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid internal name regex"));

/// Declared kind of a criterion value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Free text, any value accepted.
    String,
    /// Decimal number with optional sign.
    Numeric,
    /// One of `0`, `1`, `true`, `false`.
    Boolean,
}

impl ValueKind {
    /// Stable storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
        }
    }

    /// Parses the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(Self::String),
            "numeric" => Some(Self::Numeric),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted criterion record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    /// Human-readable label.
    pub name: String,
    /// Machine key, unique.
    pub internal_name: String,
    /// Serialized as `value_type` to match external schema naming.
    #[serde(rename = "value_type")]
    pub kind: ValueKind,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCriterion {
    pub name: String,
    pub internal_name: String,
    #[serde(rename = "value_type", default = "default_kind")]
    pub kind: ValueKind,
}

fn default_kind() -> ValueKind {
    ValueKind::String
}

impl NewCriterion {
    pub fn new(name: impl Into<String>, internal_name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            internal_name: internal_name.into(),
            kind,
        }
    }

    /// Returns a normalized copy or the first field violation.
    pub fn validated(&self) -> Result<Self, ModelValidationError> {
        Ok(Self {
            name: validate_name("name", &self.name)?,
            internal_name: validate_internal_name(&self.internal_name)?,
            kind: self.kind,
        })
    }
}

/// Validates a criterion machine key.
pub fn validate_internal_name(value: &str) -> Result<String, ModelValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ModelValidationError::EmptyField("internal_name"));
    }
    if trimmed.chars().count() > INTERNAL_NAME_MAX_CHARS {
        return Err(ModelValidationError::FieldTooLong {
            field: "internal_name",
            max_chars: INTERNAL_NAME_MAX_CHARS,
        });
    }
    if !INTERNAL_NAME_RE.is_match(trimmed) {
        return Err(ModelValidationError::InvalidInternalName(
            trimmed.to_string(),
        ));
    }
    if RESERVED_INTERNAL_NAMES.contains(&trimmed) {
        return Err(ModelValidationError::ReservedInternalName(
            trimmed.to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
