//! Route repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Read route aggregates (route row + places + criteria) from one snapshot.
//! - Provide targeted single-item relation mutations.
//! - Persist build results into `routes.details`.
//!
//! # Invariants
//! - Every route-scoped read and write is filtered by author; a route owned
//!   by someone else is reported as not found.
//! - Aggregate reads run inside one read transaction so relations are never
//!   observed half-way through a concurrent synchronizer commit.
//! - Targeted mutations validate criterion values before writing.

use crate::db::now_epoch_ms;
use crate::model::place::{CriterionValue, Place, PlaceDbId, PlaceId};
use crate::model::route::{AuthorId, Route, RouteDbId, RouteDetail, RouteId};
use crate::repo::place_repo::{
    checked_value, parse_criterion_value_row, parse_place_row, place_row_id, require_criterion,
    PLACE_COLUMNS_SQL,
};
use crate::repo::{map_constraint, parse_uuid, EntityRef, RepoError, RepoResult};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::Value;

const ROUTE_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    name,
    details,
    author_uuid,
    created_at,
    updated_at
FROM routes";

/// Repository interface for route reads and targeted mutations.
pub trait RouteRepository {
    /// Loads a route with its places and criteria from one snapshot.
    fn get_route(&self, author: AuthorId, id: RouteId) -> RepoResult<Option<RouteDetail>>;
    /// Lists routes of one author, most recently updated first.
    fn list_routes(&self, author: AuthorId) -> RepoResult<Vec<Route>>;
    /// Deletes a route and, by cascade, its relation rows.
    fn delete_route(&self, author: AuthorId, id: RouteId) -> RepoResult<()>;
    fn add_place_to_route(
        &self,
        author: AuthorId,
        id: RouteId,
        place: PlaceId,
    ) -> RepoResult<RouteDetail>;
    fn remove_place_from_route(
        &self,
        author: AuthorId,
        id: RouteId,
        place: PlaceId,
    ) -> RepoResult<RouteDetail>;
    fn add_criterion_to_route(
        &self,
        author: AuthorId,
        id: RouteId,
        internal_name: &str,
        value: &str,
    ) -> RepoResult<()>;
    fn edit_route_criterion(
        &self,
        author: AuthorId,
        id: RouteId,
        internal_name: &str,
        value: &str,
    ) -> RepoResult<()>;
    fn remove_criterion_from_route(
        &self,
        author: AuthorId,
        id: RouteId,
        internal_name: &str,
    ) -> RepoResult<()>;
    /// Stores a build result verbatim. Not author-scoped: the reply handler
    /// already resolved ownership before the build was requested.
    fn set_route_details(&self, id: RouteId, details: &Value) -> RepoResult<()>;
}

/// SQLite-backed route repository.
pub struct SqliteRouteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRouteRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RouteRepository for SqliteRouteRepository<'_> {
    fn get_route(&self, author: AuthorId, id: RouteId) -> RepoResult<Option<RouteDetail>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let detail = load_route_detail(&tx, author, id)?;
        tx.commit()?;
        Ok(detail)
    }

    fn list_routes(&self, author: AuthorId) -> RepoResult<Vec<Route>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ROUTE_SELECT_SQL}
             WHERE author_uuid = ?1
             ORDER BY updated_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([author.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_route_row(row)?);
        }
        Ok(items)
    }

    fn delete_route(&self, author: AuthorId, id: RouteId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM routes WHERE uuid = ?1 AND author_uuid = ?2;",
            params![id.to_string(), author.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Route(id)));
        }
        info!("event=route_delete module=repo status=ok route_uuid={id}");
        Ok(())
    }

    fn add_place_to_route(
        &self,
        author: AuthorId,
        id: RouteId,
        place: PlaceId,
    ) -> RepoResult<RouteDetail> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let route_row = require_route_row(&tx, author, id)?;
        let place_row =
            place_row_id(&tx, place)?.ok_or(RepoError::NotFound(EntityRef::Place(place)))?;

        tx.execute(
            "INSERT OR IGNORE INTO route_places (route_id, place_id) VALUES (?1, ?2);",
            params![route_row, place_row],
        )?;
        touch_route(&tx, route_row)?;
        let detail = require_route_detail(&tx, author, id)?;
        tx.commit()?;
        Ok(detail)
    }

    fn remove_place_from_route(
        &self,
        author: AuthorId,
        id: RouteId,
        place: PlaceId,
    ) -> RepoResult<RouteDetail> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let route_row = require_route_row(&tx, author, id)?;
        let place_row =
            place_row_id(&tx, place)?.ok_or(RepoError::NotFound(EntityRef::Place(place)))?;

        tx.execute(
            "DELETE FROM route_places WHERE route_id = ?1 AND place_id = ?2;",
            params![route_row, place_row],
        )?;
        touch_route(&tx, route_row)?;
        let detail = require_route_detail(&tx, author, id)?;
        tx.commit()?;
        Ok(detail)
    }

    fn add_criterion_to_route(
        &self,
        author: AuthorId,
        id: RouteId,
        internal_name: &str,
        value: &str,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let route_row = require_route_row(&tx, author, id)?;
        let criterion = require_criterion(&tx, internal_name)?;
        let value = checked_value(&criterion, value)?;

        tx.execute(
            "INSERT INTO route_criteria (route_id, criterion_id, value) VALUES (?1, ?2, ?3);",
            params![route_row, criterion.id, value],
        )
        .map_err(|err| {
            map_constraint(
                err,
                format!("criterion `{}` on route {id}", criterion.internal_name),
            )
        })?;
        touch_route(&tx, route_row)?;
        tx.commit()?;
        Ok(())
    }

    fn edit_route_criterion(
        &self,
        author: AuthorId,
        id: RouteId,
        internal_name: &str,
        value: &str,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let route_row = require_route_row(&tx, author, id)?;
        let criterion = require_criterion(&tx, internal_name)?;
        let value = checked_value(&criterion, value)?;

        let changed = tx.execute(
            "UPDATE route_criteria SET value = ?3 WHERE route_id = ?1 AND criterion_id = ?2;",
            params![route_row, criterion.id, value],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Attachment {
                owner: id,
                internal_name: criterion.internal_name,
            }));
        }
        touch_route(&tx, route_row)?;
        tx.commit()?;
        Ok(())
    }

    fn remove_criterion_from_route(
        &self,
        author: AuthorId,
        id: RouteId,
        internal_name: &str,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let route_row = require_route_row(&tx, author, id)?;
        let criterion = require_criterion(&tx, internal_name)?;

        tx.execute(
            "DELETE FROM route_criteria WHERE route_id = ?1 AND criterion_id = ?2;",
            params![route_row, criterion.id],
        )?;
        touch_route(&tx, route_row)?;
        tx.commit()?;
        Ok(())
    }

    fn set_route_details(&self, id: RouteId, details: &Value) -> RepoResult<()> {
        let details_text = encode_details(details)?;
        let changed = self.conn.execute(
            "UPDATE routes SET details = ?2, updated_at = ?3 WHERE uuid = ?1;",
            params![id.to_string(), details_text, now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Route(id)));
        }
        Ok(())
    }
}

/// Resolves the storage row id of a route owned by `author`.
pub(crate) fn route_row_id(
    conn: &Connection,
    author: AuthorId,
    id: RouteId,
) -> RepoResult<Option<RouteDbId>> {
    let row = conn
        .query_row(
            "SELECT id FROM routes WHERE uuid = ?1 AND author_uuid = ?2;",
            params![id.to_string(), author.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn require_route_row(
    conn: &Connection,
    author: AuthorId,
    id: RouteId,
) -> RepoResult<RouteDbId> {
    route_row_id(conn, author, id)?.ok_or(RepoError::NotFound(EntityRef::Route(id)))
}

/// Loads a full aggregate. Callers wrap this in a transaction when they need
/// the relations to come from one snapshot.
pub(crate) fn load_route_detail(
    conn: &Connection,
    author: AuthorId,
    id: RouteId,
) -> RepoResult<Option<RouteDetail>> {
    let mut stmt = conn.prepare(&format!(
        "{ROUTE_SELECT_SQL} WHERE uuid = ?1 AND author_uuid = ?2;"
    ))?;
    let mut rows = stmt.query(params![id.to_string(), author.to_string()])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let route = parse_route_row(row)?;

    let places = load_route_places(conn, route.id)?;
    let criteria = load_route_criteria(conn, route.id)?;
    Ok(Some(RouteDetail::new(route, places, criteria)))
}

pub(crate) fn require_route_detail(
    conn: &Connection,
    author: AuthorId,
    id: RouteId,
) -> RepoResult<RouteDetail> {
    load_route_detail(conn, author, id)?.ok_or(RepoError::NotFound(EntityRef::Route(id)))
}

/// Places of a route in membership order.
pub(crate) fn load_route_places(conn: &Connection, route_row: RouteDbId) -> RepoResult<Vec<Place>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLACE_COLUMNS_SQL}
         FROM route_places rp
         INNER JOIN places p ON p.id = rp.place_id
         WHERE rp.route_id = ?1
         ORDER BY rp.id ASC;"
    ))?;
    let mut rows = stmt.query([route_row])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_place_row(row)?);
    }
    Ok(items)
}

pub(crate) fn load_route_criteria(
    conn: &Connection,
    route_row: RouteDbId,
) -> RepoResult<Vec<CriterionValue>> {
    let mut stmt = conn.prepare(
        "SELECT
            c.id AS criterion_id,
            c.internal_name AS internal_name,
            c.name AS name,
            c.value_kind AS value_kind,
            rc.value AS value
         FROM route_criteria rc
         INNER JOIN criteria c ON c.id = rc.criterion_id
         WHERE rc.route_id = ?1
         ORDER BY rc.id ASC;",
    )?;
    let mut rows = stmt.query([route_row])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_criterion_value_row(row)?);
    }
    Ok(items)
}

/// Place row ids currently joined to a route.
pub(crate) fn route_place_ids(conn: &Connection, route_row: RouteDbId) -> RepoResult<Vec<PlaceDbId>> {
    let mut stmt =
        conn.prepare("SELECT place_id FROM route_places WHERE route_id = ?1 ORDER BY id ASC;")?;
    let mut rows = stmt.query([route_row])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

pub(crate) fn touch_route(conn: &Connection, route_row: RouteDbId) -> RepoResult<()> {
    conn.execute(
        "UPDATE routes SET updated_at = ?2 WHERE id = ?1;",
        params![route_row, now_epoch_ms()],
    )?;
    Ok(())
}

/// `None` for JSON `null`, so "no details" has a single storage shape.
pub(crate) fn encode_details(details: &Value) -> RepoResult<Option<String>> {
    if details.is_null() {
        return Ok(None);
    }
    serde_json::to_string(details)
        .map(Some)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode route details: {err}")))
}

fn parse_route_row(row: &Row<'_>) -> RepoResult<Route> {
    let uuid_text: String = row.get("uuid")?;
    let author_text: String = row.get("author_uuid")?;
    let details = match row.get::<_, Option<String>>("details")? {
        Some(text) => Some(serde_json::from_str::<Value>(&text).map_err(|err| {
            RepoError::InvalidData(format!("invalid json in routes.details: {err}"))
        })?),
        None => None,
    };

    Ok(Route {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid_text, "routes.uuid")?,
        name: row.get("name")?,
        details,
        author: parse_uuid(&author_text, "routes.author_uuid")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
