//! Core domain logic for the route builder service.
//! Owns route/place/criterion storage, route aggregate synchronization and
//! the build-request exchange with the external route worker.

pub mod build;
pub mod codec;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod relation;
pub mod repo;
pub mod service;

pub use build::{
    BrokerTransport, BuildClientConfig, BuildError, BuildOutcome, BuildRequestClient, BuildState,
    InMemoryBroker, TransportError,
};
pub use codec::{cast_value, validate_value, InvalidValue, TypedValue};
pub use config::{AppConfig, BrokerConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::criterion::{Criterion, CriterionId, NewCriterion, ValueKind};
pub use model::place::{Coordinates, NewPlace, Place, PlaceDetail, PlaceId};
pub use model::route::{AuthorId, Route, RouteDetail, RouteId};
pub use relation::{diff_relation, RelationDiff};
pub use repo::criterion_repo::{CriterionRepository, SqliteCriterionRepository};
pub use repo::place_repo::{PlaceRepository, SqlitePlaceRepository};
pub use repo::route_repo::{RouteRepository, SqliteRouteRepository};
pub use repo::{EntityRef, RepoError, RepoResult};
pub use service::route_sync::{
    CreateRouteRequest, CriterionEntry, RouteChanges, RouteSynchronizer, SyncError,
    UpdateRouteRequest,
};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
