use route_builder_core::db::open_db_in_memory;
use route_builder_core::model::ModelValidationError;
use route_builder_core::{
    Coordinates, CreateRouteRequest, CriterionEntry, CriterionRepository, EntityRef, NewCriterion,
    NewPlace, PlaceRepository, RepoError, RouteSynchronizer, SqliteCriterionRepository,
    SqlitePlaceRepository, ValueKind,
};
use uuid::Uuid;

#[test]
fn criterion_internal_name_is_unique() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCriterionRepository::new(&conn);

    let created = repo
        .create_criterion(&NewCriterion::new("Budget", "budget", ValueKind::Numeric))
        .unwrap();
    assert_eq!(created.kind, ValueKind::Numeric);
    assert_eq!(
        repo.get_criterion_by_internal_name("budget")
            .unwrap()
            .map(|item| item.id),
        Some(created.id)
    );

    let duplicate = repo
        .create_criterion(&NewCriterion::new("Budget again", "budget", ValueKind::String))
        .unwrap_err();
    assert!(matches!(duplicate, RepoError::Duplicate(_)));
    assert_eq!(repo.list_criteria().unwrap().len(), 1);
}

#[test]
fn criterion_validation_rejects_reserved_and_malformed_keys() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCriterionRepository::new(&conn);

    let reserved = repo
        .create_criterion(&NewCriterion::new(
            "Points",
            "points_coordinates",
            ValueKind::String,
        ))
        .unwrap_err();
    assert!(matches!(
        reserved,
        RepoError::Validation(ModelValidationError::ReservedInternalName(_))
    ));

    let malformed = repo
        .create_criterion(&NewCriterion::new("Spaces", "has spaces", ValueKind::String))
        .unwrap_err();
    assert!(matches!(
        malformed,
        RepoError::Validation(ModelValidationError::InvalidInternalName(_))
    ));
}

#[test]
fn place_round_trips_coordinates_with_five_decimals() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePlaceRepository::new(&conn);

    let coordinates = Coordinates::from_degrees(59.938_63, 30.314_13).unwrap();
    let created = repo
        .create_place(&NewPlace::new("Hermitage", coordinates))
        .unwrap();

    let loaded = repo.get_place(created.uuid).unwrap().unwrap();
    assert_eq!(loaded.place.coordinates, coordinates);
    assert_eq!(loaded.place.coordinates.latitude_e5(), 5_993_863);
    assert!(loaded.criteria.is_empty());
}

#[test]
fn place_criterion_values_are_validated_and_replaced() {
    let conn = open_db_in_memory().unwrap();
    let criteria = SqliteCriterionRepository::new(&conn);
    let places = SqlitePlaceRepository::new(&conn);

    criteria
        .create_criterion(&NewCriterion::new("Free entry", "free", ValueKind::Boolean))
        .unwrap();
    let place = places
        .create_place(&NewPlace::new(
            "Park",
            Coordinates::from_degrees(10.0, 20.0).unwrap(),
        ))
        .unwrap();

    let rejected = places
        .set_place_criterion(place.uuid, "free", "2")
        .unwrap_err();
    assert!(matches!(rejected, RepoError::InvalidValue { .. }));

    places.set_place_criterion(place.uuid, "free", "1").unwrap();
    places
        .set_place_criterion(place.uuid, "free", "false")
        .unwrap();

    let detail = places.get_place(place.uuid).unwrap().unwrap();
    assert_eq!(detail.criteria.len(), 1);
    assert_eq!(detail.criteria[0].value, "false");

    let missing = places
        .set_place_criterion(place.uuid, "unknown", "x")
        .unwrap_err();
    assert!(matches!(
        missing,
        RepoError::NotFound(EntityRef::CriterionName(_))
    ));

    places.remove_place_criterion(place.uuid, "free").unwrap();
    let again = places.remove_place_criterion(place.uuid, "free").unwrap_err();
    assert!(matches!(
        again,
        RepoError::NotFound(EntityRef::Attachment { .. })
    ));
}

#[test]
fn referenced_criterion_and_place_cannot_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let criteria = SqliteCriterionRepository::new(&conn);
    let places = SqlitePlaceRepository::new(&conn);

    let criterion = criteria
        .create_criterion(&NewCriterion::new("Mood", "mood", ValueKind::String))
        .unwrap();
    let place = places
        .create_place(&NewPlace::new(
            "Square",
            Coordinates::from_degrees(1.0, 2.0).unwrap(),
        ))
        .unwrap();

    let route = RouteSynchronizer::new(&conn)
        .create(
            Uuid::new_v4(),
            CreateRouteRequest {
                name: "Walk".to_string(),
                places: vec![place.id],
                criteria: Some(vec![CriterionEntry::new(criterion.id, "calm")]),
            },
        )
        .unwrap();
    assert_eq!(route.places.len(), 1);

    assert!(matches!(
        criteria.delete_criterion(criterion.id).unwrap_err(),
        RepoError::Referenced(_)
    ));
    assert!(matches!(
        places.delete_place(place.uuid).unwrap_err(),
        RepoError::Referenced(_)
    ));
}

#[test]
fn deleting_place_cascades_its_criterion_values() {
    let conn = open_db_in_memory().unwrap();
    let criteria = SqliteCriterionRepository::new(&conn);
    let places = SqlitePlaceRepository::new(&conn);

    let criterion = criteria
        .create_criterion(&NewCriterion::new("Rating", "rating", ValueKind::Numeric))
        .unwrap();
    let place = places
        .create_place(&NewPlace::new(
            "Cafe",
            Coordinates::from_degrees(-1.5, 3.25).unwrap(),
        ))
        .unwrap();
    places.set_place_criterion(place.uuid, "rating", "4.5").unwrap();

    places.delete_place(place.uuid).unwrap();
    assert!(places.get_place(place.uuid).unwrap().is_none());
    criteria.delete_criterion(criterion.id).unwrap();
    assert!(criteria.get_criterion(criterion.id).unwrap().is_none());
}

#[test]
fn place_criterion_value_longer_than_255_chars_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    SqliteCriterionRepository::new(&conn)
        .create_criterion(&NewCriterion::new("Note", "note", ValueKind::String))
        .unwrap();
    let places = SqlitePlaceRepository::new(&conn);
    let place = places
        .create_place(&NewPlace::new(
            "Pier",
            Coordinates::from_degrees(4.0, 5.0).unwrap(),
        ))
        .unwrap();

    let err = places
        .set_place_criterion(place.uuid, "note", &"n".repeat(256))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ModelValidationError::FieldTooLong { field: "value", .. })
    ));
    places
        .set_place_criterion(place.uuid, "note", &"n".repeat(255))
        .unwrap();
}
