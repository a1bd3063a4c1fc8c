//! Repository layer contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for criteria, places
//!   and routes.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Write paths validate model fields and criterion values before SQL
//!   mutations.
//! - Repository APIs return semantic errors (`NotFound`, `Duplicate`,
//!   `Referenced`) in addition to DB transport errors.

use crate::codec::InvalidValue;
use crate::db::DbError;
use crate::model::criterion::CriterionId;
use crate::model::place::{PlaceDbId, PlaceId};
use crate::model::route::RouteId;
use crate::model::ModelValidationError;
use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod criterion_repo;
pub mod place_repo;
pub mod route_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Entity a lookup failed to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// Route by UUID, or present but owned by another author.
    Route(RouteId),
    Place(PlaceId),
    PlaceRow(PlaceDbId),
    Criterion(CriterionId),
    CriterionName(String),
    /// Criterion exists but is not attached to the owner.
    Attachment { owner: Uuid, internal_name: String },
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Route(id) => write!(f, "route {id}"),
            Self::Place(id) => write!(f, "place {id}"),
            Self::PlaceRow(id) => write!(f, "place #{id}"),
            Self::Criterion(id) => write!(f, "criterion #{id}"),
            Self::CriterionName(name) => write!(f, "criterion `{name}`"),
            Self::Attachment {
                owner,
                internal_name,
            } => write!(f, "criterion `{internal_name}` on {owner}"),
        }
    }
}

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ModelValidationError),
    /// Criterion value rejected for the criterion's kind.
    InvalidValue {
        internal_name: String,
        source: InvalidValue,
    },
    Db(DbError),
    NotFound(EntityRef),
    /// Unique constraint violated.
    Duplicate(String),
    /// Delete blocked by a protecting reference.
    Referenced(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidValue {
                internal_name,
                source,
            } => write!(f, "invalid value for criterion `{internal_name}`: {source}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Duplicate(message) => write!(f, "already exists: {message}"),
            Self::Referenced(message) => write!(f, "still referenced: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidValue { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Duplicate(_) => None,
            Self::Referenced(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Maps unique/foreign-key violations to semantic errors.
pub(crate) fn map_constraint(err: rusqlite::Error, context: impl Into<String>) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return RepoError::Duplicate(context.into());
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY | ffi::SQLITE_CONSTRAINT_TRIGGER => {
                return RepoError::Referenced(context.into());
            }
            _ => {}
        }
    }
    err.into()
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
