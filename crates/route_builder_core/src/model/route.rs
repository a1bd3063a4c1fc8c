//! Route aggregate model.
//!
//! # Responsibility
//! - Define the route record and its read model with attached relations.
//! - Own the draft predicate over `details`.
//!
//! # Invariants
//! - A route with absent or empty `details` is a draft.
//! - `details` is written verbatim from the build worker reply.

use crate::model::criterion::CriterionId;
use crate::model::place::{CriterionValue, Place, PlaceDbId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable external identifier for routes.
pub type RouteId = Uuid;

/// Storage row id of a route.
pub type RouteDbId = i64;

/// Caller identity that owns routes.
pub type AuthorId = Uuid;

/// Persisted route record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteDbId,
    pub uuid: RouteId,
    pub name: String,
    /// Opaque build result. `None` until a build reply is applied.
    pub details: Option<Value>,
    pub author: AuthorId,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Route {
    /// Returns whether the route has not been built yet.
    pub fn is_draft(&self) -> bool {
        is_draft_details(self.details.as_ref())
    }
}

/// Draft predicate over a `details` payload.
///
/// `None`, JSON `null`, and empty objects, arrays or strings all count as
/// "not built".
pub fn is_draft_details(details: Option<&Value>) -> bool {
    match details {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Bool(_) | Value::Number(_)) => false,
    }
}

/// Route read model with relations loaded from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDetail {
    #[serde(flatten)]
    pub route: Route,
    pub is_draft: bool,
    /// Places in membership order.
    pub places: Vec<Place>,
    pub criteria: Vec<CriterionValue>,
}

impl RouteDetail {
    pub fn new(route: Route, places: Vec<Place>, criteria: Vec<CriterionValue>) -> Self {
        Self {
            is_draft: route.is_draft(),
            route,
            places,
            criteria,
        }
    }

    pub fn place_ids(&self) -> Vec<PlaceDbId> {
        self.places.iter().map(|place| place.id).collect()
    }

    pub fn criterion_ids(&self) -> Vec<CriterionId> {
        self.criteria.iter().map(|item| item.criterion_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::is_draft_details;
    use serde_json::json;

    #[test]
    fn draft_predicate_follows_details_emptiness() {
        assert!(is_draft_details(None));
        assert!(is_draft_details(Some(&json!(null))));
        assert!(is_draft_details(Some(&json!({}))));
        assert!(is_draft_details(Some(&json!([]))));
        assert!(!is_draft_details(Some(&json!({"x": 1}))));
        assert!(!is_draft_details(Some(&json!([1]))));
    }
}
