//! Criterion value validation and typed casts.
//!
//! # Responsibility
//! - Decide whether a raw string is acceptable for a criterion's kind.
//! - Cast stored raw strings into typed values for build requests.
//!
//! # Invariants
//! - `cast_value` accepts exactly what `validate_value` accepts; the cast
//!   always validates first and never parses with looser rules.
//! - Whitespace is never trimmed.

use crate::model::criterion::ValueKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

// Optional leading `-`, digits with at most one `.`, at least one digit.
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?:[0-9]+\.?[0-9]*|\.[0-9]+)$").expect("valid numeric value regex")
});

const BOOLEAN_TRUE: &[&str] = &["1", "true"];
const BOOLEAN_FALSE: &[&str] = &["0", "false"];

/// Raw value rejected for its declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub kind: ValueKind,
    pub value: String,
}

impl Display for InvalidValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ValueKind::Numeric => write!(f, "value `{}` must be a number", self.value),
            ValueKind::Boolean => write!(
                f,
                "value `{}` must be one of 0, 1, true, false",
                self.value
            ),
            ValueKind::String => write!(f, "value `{}` is not a valid string", self.value),
        }
    }
}

impl Error for InvalidValue {}

/// Criterion value cast to its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl TypedValue {
    /// Converts into the JSON shape used by build-request messages.
    pub fn into_json(self) -> Value {
        match self {
            Self::Number(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
            Self::Bool(flag) => Value::Bool(flag),
            Self::Text(text) => Value::String(text),
        }
    }
}

/// Validates `raw` against `kind` and returns it unchanged on success.
pub fn validate_value(kind: ValueKind, raw: &str) -> Result<&str, InvalidValue> {
    let accepted = match kind {
        ValueKind::String => true,
        ValueKind::Numeric => parse_number(raw).is_some(),
        ValueKind::Boolean => BOOLEAN_TRUE.contains(&raw) || BOOLEAN_FALSE.contains(&raw),
    };

    if accepted {
        Ok(raw)
    } else {
        Err(invalid(kind, raw))
    }
}

/// Casts a raw stored value for read paths.
///
/// Numeric values become `f64`, booleans become `bool`, strings pass through.
pub fn cast_value(kind: ValueKind, raw: &str) -> Result<TypedValue, InvalidValue> {
    let accepted = validate_value(kind, raw)?;
    match kind {
        ValueKind::String => Ok(TypedValue::Text(accepted.to_string())),
        ValueKind::Numeric => parse_number(accepted)
            .map(TypedValue::Number)
            .ok_or_else(|| invalid(kind, raw)),
        ValueKind::Boolean => Ok(TypedValue::Bool(BOOLEAN_TRUE.contains(&accepted))),
    }
}

/// Numeric rule: pattern match and a finite `f64`.
fn parse_number(raw: &str) -> Option<f64> {
    if !NUMERIC_RE.is_match(raw) {
        return None;
    }
    raw.parse::<f64>().ok().filter(|number| number.is_finite())
}

fn invalid(kind: ValueKind, raw: &str) -> InvalidValue {
    InvalidValue {
        kind,
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{cast_value, validate_value, TypedValue};
    use crate::model::criterion::ValueKind;
    use serde_json::json;

    #[test]
    fn accepts_valid_values_unchanged() {
        let cases = [
            (ValueKind::Numeric, "3.0"),
            (ValueKind::Numeric, "3"),
            (ValueKind::Numeric, "-999"),
            (ValueKind::Numeric, "-9.5"),
            (ValueKind::Numeric, "1."),
            (ValueKind::Numeric, ".5"),
            (ValueKind::Boolean, "1"),
            (ValueKind::Boolean, "0"),
            (ValueKind::Boolean, "true"),
            (ValueKind::Boolean, "false"),
            (ValueKind::String, "some"),
            (ValueKind::String, "2"),
            (ValueKind::String, ""),
        ];
        for (kind, value) in cases {
            assert_eq!(validate_value(kind, value), Ok(value), "{kind} `{value}`");
        }
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            (ValueKind::Numeric, ""),
            (ValueKind::Numeric, "a.5"),
            (ValueKind::Numeric, "-d"),
            (ValueKind::Numeric, "1.2.3"),
            (ValueKind::Numeric, "-"),
            (ValueKind::Numeric, "."),
            (ValueKind::Numeric, " 1"),
            (ValueKind::Numeric, "+1"),
            (ValueKind::Boolean, "2"),
            (ValueKind::Boolean, ""),
            (ValueKind::Boolean, "try"),
            (ValueKind::Boolean, "True"),
        ];
        for (kind, value) in cases {
            let err = validate_value(kind, value).unwrap_err();
            assert_eq!(err.kind, kind);
            assert_eq!(err.value, value);
        }
    }

    #[test]
    fn cast_produces_typed_values() {
        assert_eq!(
            cast_value(ValueKind::Numeric, "-10").unwrap(),
            TypedValue::Number(-10.0)
        );
        assert_eq!(
            cast_value(ValueKind::Boolean, "true").unwrap(),
            TypedValue::Bool(true)
        );
        assert_eq!(
            cast_value(ValueKind::Boolean, "0").unwrap(),
            TypedValue::Bool(false)
        );
        assert_eq!(
            cast_value(ValueKind::String, "12").unwrap(),
            TypedValue::Text("12".to_string())
        );
    }

    #[test]
    fn cast_rejects_what_validation_rejects() {
        assert!(cast_value(ValueKind::Numeric, "a.5").is_err());
        assert!(cast_value(ValueKind::Boolean, "yes").is_err());
    }

    #[test]
    fn numbers_that_overflow_to_infinity_are_rejected_on_validation() {
        let huge = "9".repeat(400);
        let err = validate_value(ValueKind::Numeric, &huge).unwrap_err();
        assert_eq!(err.kind, ValueKind::Numeric);
        assert!(cast_value(ValueKind::Numeric, &huge).is_err());

        let large = format!("{}.5", "9".repeat(300));
        assert_eq!(validate_value(ValueKind::Numeric, &large), Ok(large.as_str()));
        assert!(cast_value(ValueKind::Numeric, &large).is_ok());
    }

    #[test]
    fn typed_values_map_to_json() {
        assert_eq!(TypedValue::Number(2.5).into_json(), json!(2.5));
        assert_eq!(TypedValue::Bool(false).into_json(), json!(false));
        assert_eq!(TypedValue::Text("x".into()).into_json(), json!("x"));
    }
}
