//! Route aggregate synchronization.
//!
//! # Responsibility
//! - Apply a partial create/update payload to a route row and its two join
//!   relations (`route_criteria`, `route_places`) as one atomic unit.
//! - Lower the explicit request structs into [`RouteChanges`].
//!
//! # Invariants
//! - An absent relation field leaves that relation untouched; a present but
//!   empty one clears it.
//! - Removals are computed against the membership snapshot taken at
//!   transaction start.
//! - Any failure rolls back the whole transaction; no partial relation
//!   change survives.
//! - Updates serialize on the database writer lock, which is only requested
//!   after the route is known to exist for the caller.
//! - `details` is never written here; only the build reply path sets it.

use crate::codec::validate_value;
use crate::db::now_epoch_ms;
use crate::model::criterion::{CriterionId, ValueKind};
use crate::model::place::PlaceDbId;
use crate::model::route::{AuthorId, RouteDbId, RouteDetail, RouteId};
use crate::model::{validate_criterion_value, validate_name, ModelValidationError};
use crate::relation::{diff_relation, RelationDiff};
use crate::repo::criterion_repo::criterion_kind;
use crate::repo::route_repo::{
    require_route_detail, require_route_row, route_place_ids, route_row_id,
    touch_route,
};
use crate::repo::{EntityRef, RepoError};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Synchronizer error.
#[derive(Debug)]
pub enum SyncError {
    /// Route (for this author), criterion or place does not exist.
    NotFound(EntityRef),
    /// Criterion value rejected for the criterion's kind.
    InvalidValue {
        criterion: String,
        value: String,
        kind: ValueKind,
    },
    /// Scalar field failed validation.
    InvalidField(ModelValidationError),
    Repo(RepoError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::InvalidValue {
                criterion,
                value,
                kind,
            } => write!(
                f,
                "invalid value `{value}` for {kind} criterion `{criterion}`"
            ),
            Self::InvalidField(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidField(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(entity) => Self::NotFound(entity),
            RepoError::Validation(err) => Self::InvalidField(err),
            RepoError::InvalidValue {
                internal_name,
                source,
            } => Self::InvalidValue {
                criterion: internal_name,
                value: source.value,
                kind: source.kind,
            },
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<ModelValidationError> for SyncError {
    fn from(value: ModelValidationError) -> Self {
        Self::InvalidField(value)
    }
}

/// One `(criterion, value)` pair of a criteria payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CriterionEntry {
    #[serde(alias = "criterion")]
    pub criterion_id: CriterionId,
    pub value: String,
}

impl CriterionEntry {
    pub fn new(criterion_id: CriterionId, value: impl Into<String>) -> Self {
        Self {
            criterion_id,
            value: value.into(),
        }
    }
}

/// Partial route payload. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteChanges {
    pub name: Option<String>,
    pub criteria: Option<Vec<CriterionEntry>>,
    /// Place row ids in the desired membership order.
    pub places: Option<Vec<PlaceDbId>>,
}

/// Create payload: name and places are mandatory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRouteRequest {
    pub name: String,
    pub places: Vec<PlaceDbId>,
    #[serde(default)]
    pub criteria: Option<Vec<CriterionEntry>>,
}

impl From<CreateRouteRequest> for RouteChanges {
    fn from(value: CreateRouteRequest) -> Self {
        Self {
            name: Some(value.name),
            criteria: value.criteria,
            places: Some(value.places),
        }
    }
}

/// Update payload: every field optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRouteRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub criteria: Option<Vec<CriterionEntry>>,
    #[serde(default)]
    pub places: Option<Vec<PlaceDbId>>,
}

impl From<UpdateRouteRequest> for RouteChanges {
    fn from(value: UpdateRouteRequest) -> Self {
        Self {
            name: value.name,
            criteria: value.criteria,
            places: value.places,
        }
    }
}

/// Applies route payloads against one connection.
pub struct RouteSynchronizer<'conn> {
    conn: &'conn Connection,
}

impl<'conn> RouteSynchronizer<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn create(
        &self,
        author: AuthorId,
        request: CreateRouteRequest,
    ) -> Result<RouteDetail, SyncError> {
        self.apply(author, None, &request.into())
    }

    pub fn update(
        &self,
        author: AuthorId,
        id: RouteId,
        request: UpdateRouteRequest,
    ) -> Result<RouteDetail, SyncError> {
        self.apply(author, Some(id), &request.into())
    }

    /// Creates (`route == None`) or updates a route with its relations.
    pub fn apply(
        &self,
        author: AuthorId,
        route: Option<RouteId>,
        changes: &RouteChanges,
    ) -> Result<RouteDetail, SyncError> {
        let result = match route {
            None => self.apply_create(author, changes),
            Some(id) => self.apply_update(author, id, changes),
        };
        if let Err(err) = &result {
            warn!("event=route_sync module=service status=error error={err}");
        }
        result
    }

    fn apply_create(
        &self,
        author: AuthorId,
        changes: &RouteChanges,
    ) -> Result<RouteDetail, SyncError> {
        let name = validate_name("name", changes.name.as_deref().unwrap_or_default())?;
        let uuid = Uuid::new_v4();
        let now = now_epoch_ms();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO routes (uuid, name, author_uuid, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4);",
            params![uuid.to_string(), name, author.to_string(), now],
        )?;
        let route_row = tx.last_insert_rowid();

        let criteria = sync_criteria(&tx, route_row, &BTreeSet::new(), changes.criteria.as_deref())?;
        let places = sync_places(&tx, route_row, &BTreeSet::new(), changes.places.as_deref())?;

        let detail = require_route_detail(&tx, author, uuid)?;
        tx.commit()?;
        log_applied("create", uuid, &criteria, &places);
        Ok(detail)
    }

    fn apply_update(
        &self,
        author: AuthorId,
        id: RouteId,
        changes: &RouteChanges,
    ) -> Result<RouteDetail, SyncError> {
        let name = changes
            .name
            .as_deref()
            .map(|value| validate_name("name", value))
            .transpose()?;

        // Unknown routes fail before the writer lock is requested.
        if route_row_id(self.conn, author, id)?.is_none() {
            return Err(SyncError::NotFound(EntityRef::Route(id)));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let route_row = require_route_row(&tx, author, id)?;

        if let Some(name) = &name {
            tx.execute(
                "UPDATE routes SET name = ?2 WHERE id = ?1;",
                params![route_row, name],
            )?;
        }

        let current_criteria = route_criterion_ids(&tx, route_row)?;
        let current_places: BTreeSet<PlaceDbId> =
            route_place_ids(&tx, route_row)?.into_iter().collect();

        let criteria = sync_criteria(
            &tx,
            route_row,
            &current_criteria,
            changes.criteria.as_deref(),
        )?;
        let places = sync_places(&tx, route_row, &current_places, changes.places.as_deref())?;

        touch_route(&tx, route_row)?;
        let detail = require_route_detail(&tx, author, id)?;
        tx.commit()?;
        log_applied("update", id, &criteria, &places);
        Ok(detail)
    }
}

fn route_criterion_ids(
    conn: &Connection,
    route_row: RouteDbId,
) -> Result<BTreeSet<CriterionId>, SyncError> {
    let mut stmt = conn.prepare("SELECT criterion_id FROM route_criteria WHERE route_id = ?1;")?;
    let mut rows = stmt.query([route_row])?;
    let mut ids = BTreeSet::new();
    while let Some(row) = rows.next()? {
        ids.insert(row.get(0)?);
    }
    Ok(ids)
}

/// Upserts every requested criterion value, then deletes the ones dropped
/// from the payload. Repeated ids keep their first occurrence.
fn sync_criteria(
    conn: &Connection,
    route_row: RouteDbId,
    current: &BTreeSet<CriterionId>,
    entries: Option<&[CriterionEntry]>,
) -> Result<RelationDiff<CriterionId>, SyncError> {
    let Some(entries) = entries else {
        return Ok(RelationDiff::unchanged());
    };

    let mut seen = BTreeSet::new();
    for entry in entries {
        if !seen.insert(entry.criterion_id) {
            continue;
        }
        validate_criterion_value(&entry.value)?;
        let (internal_name, kind) = criterion_kind(conn, entry.criterion_id)?
            .ok_or(SyncError::NotFound(EntityRef::Criterion(entry.criterion_id)))?;
        let value =
            validate_value(kind, &entry.value).map_err(|err| SyncError::InvalidValue {
                criterion: internal_name,
                value: err.value,
                kind,
            })?;

        conn.execute(
            "INSERT INTO route_criteria (route_id, criterion_id, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (route_id, criterion_id) DO UPDATE SET value = excluded.value;",
            params![route_row, entry.criterion_id, value],
        )?;
    }

    let requested: Vec<CriterionId> = entries.iter().map(|entry| entry.criterion_id).collect();
    let diff = diff_relation(current, Some(requested.as_slice()));
    for criterion_id in &diff.to_remove {
        conn.execute(
            "DELETE FROM route_criteria WHERE route_id = ?1 AND criterion_id = ?2;",
            params![route_row, criterion_id],
        )?;
    }
    Ok(diff)
}

/// Inserts new members in payload order and deletes dropped ones.
fn sync_places(
    conn: &Connection,
    route_row: RouteDbId,
    current: &BTreeSet<PlaceDbId>,
    requested: Option<&[PlaceDbId]>,
) -> Result<RelationDiff<PlaceDbId>, SyncError> {
    let diff = diff_relation(current, requested);
    let Some(requested) = requested else {
        return Ok(diff);
    };

    let mut pending = diff.to_add.clone();
    for place_id in requested {
        if !pending.remove(place_id) {
            continue;
        }
        let exists = conn
            .query_row("SELECT 1 FROM places WHERE id = ?1;", [place_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(SyncError::NotFound(EntityRef::PlaceRow(*place_id)));
        }
        conn.execute(
            "INSERT OR IGNORE INTO route_places (route_id, place_id) VALUES (?1, ?2);",
            params![route_row, place_id],
        )?;
    }

    for place_id in &diff.to_remove {
        conn.execute(
            "DELETE FROM route_places WHERE route_id = ?1 AND place_id = ?2;",
            params![route_row, place_id],
        )?;
    }
    Ok(diff)
}

fn log_applied(
    action: &str,
    id: RouteId,
    criteria: &RelationDiff<CriterionId>,
    places: &RelationDiff<PlaceDbId>,
) {
    info!(
        "event=route_sync module=service status=ok action={action} route_uuid={id} \
         criteria_added={} criteria_removed={} places_added={} places_removed={}",
        criteria.to_add.len(),
        criteria.to_remove.len(),
        places.to_add.len(),
        places.to_remove.len()
    );
}

#[cfg(test)]
mod tests {
    use super::{CreateRouteRequest, RouteChanges, UpdateRouteRequest};
    use serde_json::json;

    #[test]
    fn update_request_distinguishes_absent_and_empty_relations() {
        let absent: UpdateRouteRequest = serde_json::from_value(json!({"name": "x"})).unwrap();
        let changes = RouteChanges::from(absent);
        assert!(changes.criteria.is_none());
        assert!(changes.places.is_none());

        let empty: UpdateRouteRequest =
            serde_json::from_value(json!({"criteria": [], "places": []})).unwrap();
        let changes = RouteChanges::from(empty);
        assert_eq!(changes.criteria, Some(Vec::new()));
        assert_eq!(changes.places, Some(Vec::new()));
        assert!(changes.name.is_none());
    }

    #[test]
    fn create_request_requires_places() {
        let missing = serde_json::from_value::<CreateRouteRequest>(json!({"name": "t"}));
        assert!(missing.is_err());

        let request: CreateRouteRequest = serde_json::from_value(json!({
            "name": "t",
            "places": [1, 2],
            "criteria": [{"criterion": 3, "value": "1"}]
        }))
        .unwrap();
        let changes = RouteChanges::from(request);
        assert_eq!(changes.places, Some(vec![1, 2]));
        assert_eq!(changes.criteria.map(|items| items[0].criterion_id), Some(3));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_value::<UpdateRouteRequest>(json!({"colour": "red"}));
        assert!(result.is_err());
    }

    #[test]
    fn details_cannot_be_set_through_route_payloads() {
        let update = serde_json::from_value::<UpdateRouteRequest>(json!({"details": {"fake": 1}}));
        assert!(update.is_err());

        let create = serde_json::from_value::<CreateRouteRequest>(json!({
            "name": "t",
            "places": [1],
            "details": {"fake": 1}
        }));
        assert!(create.is_err());
    }
}
