//! Criterion repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `internal_name` uniqueness is enforced by storage and surfaced as
//!   `RepoError::Duplicate`.
//! - Deleting a criterion referenced by any place or route fails with
//!   `RepoError::Referenced`.

use crate::db::now_epoch_ms;
use crate::model::criterion::{Criterion, CriterionId, NewCriterion, ValueKind};
use crate::repo::{map_constraint, EntityRef, RepoError, RepoResult};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CRITERION_SELECT_SQL: &str = "SELECT
    id,
    name,
    internal_name,
    value_kind,
    created_at,
    updated_at
FROM criteria";

/// Repository interface for criterion catalog operations.
pub trait CriterionRepository {
    fn create_criterion(&self, input: &NewCriterion) -> RepoResult<Criterion>;
    fn get_criterion(&self, id: CriterionId) -> RepoResult<Option<Criterion>>;
    fn get_criterion_by_internal_name(&self, internal_name: &str)
        -> RepoResult<Option<Criterion>>;
    fn list_criteria(&self) -> RepoResult<Vec<Criterion>>;
    fn delete_criterion(&self, id: CriterionId) -> RepoResult<()>;
}

/// SQLite-backed criterion repository.
pub struct SqliteCriterionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCriterionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CriterionRepository for SqliteCriterionRepository<'_> {
    fn create_criterion(&self, input: &NewCriterion) -> RepoResult<Criterion> {
        let input = input.validated()?;
        let now = now_epoch_ms();

        self.conn
            .execute(
                "INSERT INTO criteria (name, internal_name, value_kind, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4);",
                params![
                    input.name.as_str(),
                    input.internal_name.as_str(),
                    input.kind.as_str(),
                    now
                ],
            )
            .map_err(|err| {
                map_constraint(err, format!("criterion `{}`", input.internal_name))
            })?;

        let id = self.conn.last_insert_rowid();
        info!(
            "event=criterion_create module=repo status=ok criterion_id={id} kind={}",
            input.kind
        );
        self.get_criterion(id)?
            .ok_or(RepoError::NotFound(EntityRef::Criterion(id)))
    }

    fn get_criterion(&self, id: CriterionId) -> RepoResult<Option<Criterion>> {
        find_criterion_by_id(self.conn, id)
    }

    fn get_criterion_by_internal_name(
        &self,
        internal_name: &str,
    ) -> RepoResult<Option<Criterion>> {
        find_criterion_by_internal_name(self.conn, internal_name)
    }

    fn list_criteria(&self) -> RepoResult<Vec<Criterion>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CRITERION_SELECT_SQL} ORDER BY updated_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_criterion_row(row)?);
        }
        Ok(items)
    }

    fn delete_criterion(&self, id: CriterionId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM criteria WHERE id = ?1;", [id])
            .map_err(|err| map_constraint(err, format!("criterion #{id}")))?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Criterion(id)));
        }
        Ok(())
    }
}

pub(crate) fn find_criterion_by_id(
    conn: &Connection,
    id: CriterionId,
) -> RepoResult<Option<Criterion>> {
    let mut stmt = conn.prepare(&format!("{CRITERION_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_criterion_row(row)?));
    }
    Ok(None)
}

pub(crate) fn find_criterion_by_internal_name(
    conn: &Connection,
    internal_name: &str,
) -> RepoResult<Option<Criterion>> {
    let mut stmt = conn.prepare(&format!(
        "{CRITERION_SELECT_SQL} WHERE internal_name = ?1;"
    ))?;
    let mut rows = stmt.query([internal_name])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_criterion_row(row)?));
    }
    Ok(None)
}

/// Loads only the declared kind of a criterion.
pub(crate) fn criterion_kind(
    conn: &Connection,
    id: CriterionId,
) -> RepoResult<Option<(String, ValueKind)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT internal_name, value_kind FROM criteria WHERE id = ?1;",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((internal_name, kind_text)) => {
            let kind = parse_kind(&kind_text)?;
            Ok(Some((internal_name, kind)))
        }
    }
}

pub(crate) fn parse_kind(value: &str) -> RepoResult<ValueKind> {
    ValueKind::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid value kind `{value}` in criteria.value_kind"))
    })
}

fn parse_criterion_row(row: &Row<'_>) -> RepoResult<Criterion> {
    let kind_text: String = row.get("value_kind")?;
    Ok(Criterion {
        id: row.get("id")?,
        name: row.get("name")?,
        internal_name: row.get("internal_name")?,
        kind: parse_kind(&kind_text)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
