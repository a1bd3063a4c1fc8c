//! Place domain model.
//!
//! # Invariants
//! - Latitude stays within [-90, 90] and longitude within [-180, 180].
//! - Coordinates keep exactly five decimal places; they are stored as
//!   fixed-point integers so no precision is lost between write and read.

use crate::model::criterion::{CriterionId, ValueKind};
use crate::model::{validate_name, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable external identifier for places.
pub type PlaceId = Uuid;

/// Storage row id of a place. Route payloads reference places by this id.
pub type PlaceDbId = i64;

const E5_SCALE: f64 = 100_000.0;

/// Fixed-point geographic position with five decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "DegreePair", try_from = "DegreePair")]
pub struct Coordinates {
    latitude_e5: i32,
    longitude_e5: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DegreePair {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    /// Builds coordinates from decimal degrees, rounding to five places.
    pub fn from_degrees(latitude: f64, longitude: f64) -> Result<Self, ModelValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ModelValidationError::LatitudeOutOfRange(
                latitude.to_string(),
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ModelValidationError::LongitudeOutOfRange(
                longitude.to_string(),
            ));
        }
        Ok(Self {
            latitude_e5: (latitude * E5_SCALE).round() as i32,
            longitude_e5: (longitude * E5_SCALE).round() as i32,
        })
    }

    /// Builds coordinates from stored fixed-point values.
    pub fn from_e5(latitude_e5: i32, longitude_e5: i32) -> Result<Self, ModelValidationError> {
        if !(-9_000_000..=9_000_000).contains(&latitude_e5) {
            return Err(ModelValidationError::LatitudeOutOfRange(
                latitude_e5.to_string(),
            ));
        }
        if !(-18_000_000..=18_000_000).contains(&longitude_e5) {
            return Err(ModelValidationError::LongitudeOutOfRange(
                longitude_e5.to_string(),
            ));
        }
        Ok(Self {
            latitude_e5,
            longitude_e5,
        })
    }

    pub fn latitude(self) -> f64 {
        f64::from(self.latitude_e5) / E5_SCALE
    }

    pub fn longitude(self) -> f64 {
        f64::from(self.longitude_e5) / E5_SCALE
    }

    pub fn latitude_e5(self) -> i32 {
        self.latitude_e5
    }

    pub fn longitude_e5(self) -> i32 {
        self.longitude_e5
    }
}

impl From<Coordinates> for DegreePair {
    fn from(value: Coordinates) -> Self {
        Self {
            latitude: value.latitude(),
            longitude: value.longitude(),
        }
    }
}

impl TryFrom<DegreePair> for Coordinates {
    type Error = ModelValidationError;

    fn try_from(value: DegreePair) -> Result<Self, Self::Error> {
        Self::from_degrees(value.latitude, value.longitude)
    }
}

/// Persisted place record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceDbId,
    pub uuid: PlaceId,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub coordinates: Coordinates,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlace {
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub coordinates: Coordinates,
}

impl NewPlace {
    pub fn new(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            name: name.into(),
            description: None,
            coordinates,
        }
    }

    /// Returns a normalized copy or the first field violation.
    pub fn validated(&self) -> Result<Self, ModelValidationError> {
        Ok(Self {
            name: validate_name("name", &self.name)?,
            description: self.description.clone(),
            coordinates: self.coordinates,
        })
    }
}

/// One `(criterion, value)` pair attached to a place or route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionValue {
    pub criterion_id: CriterionId,
    pub internal_name: String,
    pub name: String,
    #[serde(rename = "value_type")]
    pub kind: ValueKind,
    /// Raw stored value, already validated for `kind`.
    pub value: String,
}

/// Place read model with attached criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceDetail {
    #[serde(flatten)]
    pub place: Place,
    pub criteria: Vec<CriterionValue>,
}

#[cfg(test)]
mod tests {
    use super::Coordinates;
    use crate::model::ModelValidationError;

    #[test]
    fn coordinates_round_to_five_places() {
        let coords = Coordinates::from_degrees(55.752_224_9, 37.617_634_1).unwrap();
        assert_eq!(coords.latitude_e5(), 5_575_222);
        assert_eq!(coords.longitude_e5(), 3_761_763);
        assert_eq!(coords.latitude(), 55.75222);
    }

    #[test]
    fn coordinates_accept_bounds_and_reject_outside() {
        Coordinates::from_degrees(90.0, -180.0).unwrap();
        Coordinates::from_degrees(-90.0, 180.0).unwrap();
        assert!(matches!(
            Coordinates::from_degrees(-90.23145, 0.0),
            Err(ModelValidationError::LatitudeOutOfRange(_))
        ));
        assert!(matches!(
            Coordinates::from_degrees(0.0, 204.23145),
            Err(ModelValidationError::LongitudeOutOfRange(_))
        ));
        assert!(Coordinates::from_degrees(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn coordinates_deserialize_through_validation() {
        let ok: Coordinates = serde_json::from_str(r#"{"latitude":10.5,"longitude":-20.25}"#)
            .unwrap();
        assert_eq!(ok.longitude_e5(), -2_025_000);

        let bad = serde_json::from_str::<Coordinates>(r#"{"latitude":91,"longitude":0}"#);
        assert!(bad.is_err());
    }
}
