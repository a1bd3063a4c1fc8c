//! Place repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist places with fixed-point coordinates.
//! - Manage the `place_criteria` join relation.
//!
//! # Invariants
//! - Every stored place criterion value is at most 255 characters and passed
//!   `validate_value` for the criterion's kind at write time.
//! - A place referenced by any route cannot be deleted.

use crate::codec::validate_value;
use crate::db::now_epoch_ms;
use crate::model::criterion::{Criterion, ValueKind};
use crate::model::validate_criterion_value;
use crate::model::place::{
    Coordinates, CriterionValue, NewPlace, Place, PlaceDbId, PlaceDetail, PlaceId,
};
use crate::repo::criterion_repo::{find_criterion_by_internal_name, parse_kind};
use crate::repo::{map_constraint, parse_uuid, EntityRef, RepoError, RepoResult};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub(crate) const PLACE_COLUMNS_SQL: &str = "p.id AS id,
    p.uuid AS uuid,
    p.name AS name,
    p.description AS description,
    p.latitude_e5 AS latitude_e5,
    p.longitude_e5 AS longitude_e5,
    p.created_at AS created_at,
    p.updated_at AS updated_at";

/// Repository interface for place operations.
pub trait PlaceRepository {
    fn create_place(&self, input: &NewPlace) -> RepoResult<Place>;
    fn get_place(&self, id: PlaceId) -> RepoResult<Option<PlaceDetail>>;
    fn list_places(&self) -> RepoResult<Vec<Place>>;
    /// Attaches a criterion value, replacing the previous value if attached.
    fn set_place_criterion(&self, id: PlaceId, internal_name: &str, value: &str)
        -> RepoResult<()>;
    fn remove_place_criterion(&self, id: PlaceId, internal_name: &str) -> RepoResult<()>;
    fn delete_place(&self, id: PlaceId) -> RepoResult<()>;
}

/// SQLite-backed place repository.
pub struct SqlitePlaceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePlaceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PlaceRepository for SqlitePlaceRepository<'_> {
    fn create_place(&self, input: &NewPlace) -> RepoResult<Place> {
        let input = input.validated()?;
        let uuid = Uuid::new_v4();
        let now = now_epoch_ms();

        self.conn.execute(
            "INSERT INTO places (
                uuid,
                name,
                description,
                latitude_e5,
                longitude_e5,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
            params![
                uuid.to_string(),
                input.name.as_str(),
                input.description.as_deref(),
                input.coordinates.latitude_e5(),
                input.coordinates.longitude_e5(),
                now,
            ],
        )?;

        info!("event=place_create module=repo status=ok place_uuid={uuid}");
        load_place(self.conn, uuid)?.ok_or(RepoError::NotFound(EntityRef::Place(uuid)))
    }

    fn get_place(&self, id: PlaceId) -> RepoResult<Option<PlaceDetail>> {
        let Some(place) = load_place(self.conn, id)? else {
            return Ok(None);
        };
        let criteria = load_place_criteria(self.conn, place.id)?;
        Ok(Some(PlaceDetail { place, criteria }))
    }

    fn list_places(&self) -> RepoResult<Vec<Place>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLACE_COLUMNS_SQL}
             FROM places p
             ORDER BY p.updated_at DESC, p.id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_place_row(row)?);
        }
        Ok(items)
    }

    fn set_place_criterion(
        &self,
        id: PlaceId,
        internal_name: &str,
        value: &str,
    ) -> RepoResult<()> {
        let place_row =
            place_row_id(self.conn, id)?.ok_or(RepoError::NotFound(EntityRef::Place(id)))?;
        let criterion = require_criterion(self.conn, internal_name)?;
        let value = checked_value(&criterion, value)?;

        self.conn.execute(
            "INSERT INTO place_criteria (place_id, criterion_id, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (place_id, criterion_id) DO UPDATE SET value = excluded.value;",
            params![place_row, criterion.id, value],
        )?;
        touch_place(self.conn, place_row)
    }

    fn remove_place_criterion(&self, id: PlaceId, internal_name: &str) -> RepoResult<()> {
        let place_row =
            place_row_id(self.conn, id)?.ok_or(RepoError::NotFound(EntityRef::Place(id)))?;
        let criterion = require_criterion(self.conn, internal_name)?;

        let changed = self.conn.execute(
            "DELETE FROM place_criteria WHERE place_id = ?1 AND criterion_id = ?2;",
            params![place_row, criterion.id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Attachment {
                owner: id,
                internal_name: criterion.internal_name,
            }));
        }
        touch_place(self.conn, place_row)
    }

    fn delete_place(&self, id: PlaceId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM places WHERE uuid = ?1;", [id.to_string()])
            .map_err(|err| map_constraint(err, format!("place {id}")))?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Place(id)));
        }
        Ok(())
    }
}

/// Validates a value for `criterion`, tagging failures with its key.
pub(crate) fn checked_value<'v>(criterion: &Criterion, value: &'v str) -> RepoResult<&'v str> {
    validate_kind_value(&criterion.internal_name, criterion.kind, value)
}

pub(crate) fn validate_kind_value<'v>(
    internal_name: &str,
    kind: ValueKind,
    value: &'v str,
) -> RepoResult<&'v str> {
    validate_criterion_value(value)?;
    validate_value(kind, value).map_err(|source| RepoError::InvalidValue {
        internal_name: internal_name.to_string(),
        source,
    })
}

pub(crate) fn require_criterion(conn: &Connection, internal_name: &str) -> RepoResult<Criterion> {
    find_criterion_by_internal_name(conn, internal_name)?.ok_or_else(|| {
        RepoError::NotFound(EntityRef::CriterionName(internal_name.to_string()))
    })
}

pub(crate) fn place_row_id(conn: &Connection, id: PlaceId) -> RepoResult<Option<PlaceDbId>> {
    let row = conn
        .query_row(
            "SELECT id FROM places WHERE uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row)
}

fn touch_place(conn: &Connection, place_row: PlaceDbId) -> RepoResult<()> {
    conn.execute(
        "UPDATE places SET updated_at = ?2 WHERE id = ?1;",
        params![place_row, now_epoch_ms()],
    )?;
    Ok(())
}

fn load_place(conn: &Connection, id: PlaceId) -> RepoResult<Option<Place>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLACE_COLUMNS_SQL} FROM places p WHERE p.uuid = ?1;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_place_row(row)?));
    }
    Ok(None)
}

fn load_place_criteria(conn: &Connection, place_row: PlaceDbId) -> RepoResult<Vec<CriterionValue>> {
    let mut stmt = conn.prepare(
        "SELECT
            c.id AS criterion_id,
            c.internal_name AS internal_name,
            c.name AS name,
            c.value_kind AS value_kind,
            pc.value AS value
         FROM place_criteria pc
         INNER JOIN criteria c ON c.id = pc.criterion_id
         WHERE pc.place_id = ?1
         ORDER BY pc.id ASC;",
    )?;
    let mut rows = stmt.query([place_row])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_criterion_value_row(row)?);
    }
    Ok(items)
}

pub(crate) fn parse_criterion_value_row(row: &Row<'_>) -> RepoResult<CriterionValue> {
    let kind_text: String = row.get("value_kind")?;
    Ok(CriterionValue {
        criterion_id: row.get("criterion_id")?,
        internal_name: row.get("internal_name")?,
        name: row.get("name")?,
        kind: parse_kind(&kind_text)?,
        value: row.get("value")?,
    })
}

pub(crate) fn parse_place_row(row: &Row<'_>) -> RepoResult<Place> {
    let uuid_text: String = row.get("uuid")?;
    let coordinates = Coordinates::from_e5(row.get("latitude_e5")?, row.get("longitude_e5")?)
        .map_err(|err| RepoError::InvalidData(format!("{err} in places")))?;

    Ok(Place {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid_text, "places.uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        coordinates,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
