use route_builder_core::db::open_db_in_memory;
use route_builder_core::{
    Coordinates, CreateRouteRequest, CriterionRepository, EntityRef, NewCriterion, NewPlace,
    Place, PlaceRepository, RepoError, RouteRepository, RouteSynchronizer,
    SqliteCriterionRepository, SqlitePlaceRepository, SqliteRouteRepository, ValueKind,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn place(conn: &Connection, name: &str, lat: f64) -> Place {
    SqlitePlaceRepository::new(conn)
        .create_place(&NewPlace::new(
            name,
            Coordinates::from_degrees(lat, 0.5).unwrap(),
        ))
        .unwrap()
}

fn route(conn: &Connection, author: Uuid, places: Vec<i64>) -> Uuid {
    RouteSynchronizer::new(conn)
        .create(
            author,
            CreateRouteRequest {
                name: "Loop".to_string(),
                places,
                criteria: None,
            },
        )
        .unwrap()
        .route
        .uuid
}

#[test]
fn add_and_remove_place_by_uuid() {
    let conn = open_db_in_memory().unwrap();
    let author = Uuid::new_v4();
    let first = place(&conn, "first", 1.0);
    let second = place(&conn, "second", 2.0);
    let id = route(&conn, author, vec![first.id]);
    let repo = SqliteRouteRepository::new(&conn);

    let added = repo.add_place_to_route(author, id, second.uuid).unwrap();
    assert_eq!(added.place_ids(), vec![first.id, second.id]);

    let again = repo.add_place_to_route(author, id, second.uuid).unwrap();
    assert_eq!(again.place_ids(), vec![first.id, second.id]);

    let removed = repo.remove_place_from_route(author, id, first.uuid).unwrap();
    assert_eq!(removed.place_ids(), vec![second.id]);
    let removed_again = repo.remove_place_from_route(author, id, first.uuid).unwrap();
    assert_eq!(removed_again.place_ids(), vec![second.id]);

    let unknown = repo
        .add_place_to_route(author, id, Uuid::new_v4())
        .unwrap_err();
    assert!(matches!(unknown, RepoError::NotFound(EntityRef::Place(_))));
}

#[test]
fn targeted_criterion_operations_validate_and_report_missing_links() {
    let conn = open_db_in_memory().unwrap();
    let author = Uuid::new_v4();
    SqliteCriterionRepository::new(&conn)
        .create_criterion(&NewCriterion::new("Hours", "max_hours", ValueKind::Numeric))
        .unwrap();
    let stop = place(&conn, "stop", 3.0);
    let id = route(&conn, author, vec![stop.id]);
    let repo = SqliteRouteRepository::new(&conn);

    let edit_missing = repo
        .edit_route_criterion(author, id, "max_hours", "2")
        .unwrap_err();
    assert!(matches!(
        edit_missing,
        RepoError::NotFound(EntityRef::Attachment { .. })
    ));

    let invalid = repo
        .add_criterion_to_route(author, id, "max_hours", "a.5")
        .unwrap_err();
    assert!(matches!(invalid, RepoError::InvalidValue { .. }));

    repo.add_criterion_to_route(author, id, "max_hours", "2")
        .unwrap();
    let duplicate = repo
        .add_criterion_to_route(author, id, "max_hours", "3")
        .unwrap_err();
    assert!(matches!(duplicate, RepoError::Duplicate(_)));

    repo.edit_route_criterion(author, id, "max_hours", "-4.25")
        .unwrap();
    let detail = repo.get_route(author, id).unwrap().unwrap();
    assert_eq!(detail.criteria.len(), 1);
    assert_eq!(detail.criteria[0].value, "-4.25");

    repo.remove_criterion_from_route(author, id, "max_hours")
        .unwrap();
    repo.remove_criterion_from_route(author, id, "max_hours")
        .unwrap();
    assert!(repo.get_route(author, id).unwrap().unwrap().criteria.is_empty());

    let unknown = repo
        .remove_criterion_from_route(author, id, "nope")
        .unwrap_err();
    assert!(matches!(
        unknown,
        RepoError::NotFound(EntityRef::CriterionName(_))
    ));
}

#[test]
fn route_operations_are_scoped_to_the_author() {
    let conn = open_db_in_memory().unwrap();
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let stop = place(&conn, "stop", 4.0);
    let id = route(&conn, owner, vec![stop.id]);
    let repo = SqliteRouteRepository::new(&conn);

    assert!(repo.get_route(stranger, id).unwrap().is_none());
    assert!(repo.list_routes(stranger).unwrap().is_empty());
    assert!(matches!(
        repo.remove_place_from_route(stranger, id, stop.uuid)
            .unwrap_err(),
        RepoError::NotFound(EntityRef::Route(_))
    ));
    assert!(matches!(
        repo.delete_route(stranger, id).unwrap_err(),
        RepoError::NotFound(EntityRef::Route(_))
    ));
    assert_eq!(repo.list_routes(owner).unwrap().len(), 1);
}

#[test]
fn deleting_a_route_releases_its_places() {
    let conn = open_db_in_memory().unwrap();
    let author = Uuid::new_v4();
    let stop = place(&conn, "stop", 5.0);
    let id = route(&conn, author, vec![stop.id]);
    let places = SqlitePlaceRepository::new(&conn);
    assert!(matches!(
        places.delete_place(stop.uuid).unwrap_err(),
        RepoError::Referenced(_)
    ));

    SqliteRouteRepository::new(&conn)
        .delete_route(author, id)
        .unwrap();
    places.delete_place(stop.uuid).unwrap();
}

#[test]
fn set_route_details_stores_json_and_null_clears() {
    let conn = open_db_in_memory().unwrap();
    let author = Uuid::new_v4();
    let stop = place(&conn, "stop", 6.0);
    let id = route(&conn, author, vec![stop.id]);
    let repo = SqliteRouteRepository::new(&conn);

    repo.set_route_details(id, &json!({"legs": [1, 2]})).unwrap();
    let built = repo.get_route(author, id).unwrap().unwrap();
    assert_eq!(built.route.details, Some(json!({"legs": [1, 2]})));
    assert!(!built.is_draft);

    repo.set_route_details(id, &json!(null)).unwrap();
    let cleared = repo.get_route(author, id).unwrap().unwrap();
    assert!(cleared.route.details.is_none());
    assert!(cleared.is_draft);

    assert!(matches!(
        repo.set_route_details(Uuid::new_v4(), &json!({}))
            .unwrap_err(),
        RepoError::NotFound(EntityRef::Route(_))
    ));
}
