//! Type management through the repository

use assert_matches::assert_matches;
use vellum_core::{property_ids as ids, ConstraintViolation, NotFound, TypeId, VellumError};
use vellum_store::{CreateObject, ReadOptions};
use vellum_testkit::*;
use vellum_types::{BagValue, BaseType, Datatype, PropertyDefinition, TypeDefinition};

const MEMO: &str = "test:memo";
const PAGES: &str = "test:pages";
const AUTHOR: &str = "test:author";

fn memo_type() -> TypeDefinition {
    TypeDefinition::new(MEMO, TEST_DOCUMENT, BaseType::Document)
        .with_property(PropertyDefinition::single(PAGES, Datatype::Integer))
}

fn create_memo(repository: &vellum_store::Repository, name: &str) -> vellum_core::ObjectId {
    let request = CreateObject::new(MEMO, named(name))
        .in_folder(repository.root_folder_id().clone());
    repository.create_object(request, &alice()).unwrap()
}

#[test]
fn test_type_mutation_is_admin_only() {
    init_test_tracing();
    let repository = test_repository();

    let err = repository.create_type(memo_type(), &alice()).unwrap_err();
    assert_matches!(err, VellumError::PermissionDenied { .. });
    assert!(repository.get_type(MEMO).is_err());

    repository.create_type(memo_type(), &admin()).unwrap();
    let err = repository.delete_type(MEMO, &bob()).unwrap_err();
    assert_matches!(err, VellumError::PermissionDenied { .. });
    assert!(repository.get_type(MEMO).is_ok());
}

#[test]
fn test_created_type_inherits_properties() {
    let repository = test_repository();
    let memo = repository.create_type(memo_type(), &admin()).unwrap();

    assert_eq!(memo.parent_id, Some(TypeId::new(TEST_DOCUMENT)));
    assert!(memo.property_definition(ids::NAME).unwrap().inherited);
    assert!(memo.property_definition(props::STRING).unwrap().inherited);
    assert!(!memo.property_definition(PAGES).unwrap().inherited);

    let children = repository.get_type_children(Some(TEST_DOCUMENT)).unwrap();
    assert!(children.iter().any(|t| t.id.as_str() == MEMO));

    let descendants = repository
        .get_type_descendants(BaseType::Document.type_id(), None)
        .unwrap();
    let ids: Vec<&str> = descendants.iter().map(|t| t.id.as_str()).collect();
    assert!(ids.contains(&TEST_DOCUMENT));
    assert!(ids.contains(&MEMO));
}

#[test]
fn test_base_types_are_listed_without_a_parent() {
    let repository = test_repository();
    let bases = repository.get_type_children(None).unwrap();
    let ids: Vec<&str> = bases.iter().map(|t| t.id.as_str()).collect();
    assert!(ids.contains(&BaseType::Document.type_id()));
    assert!(ids.contains(&BaseType::Folder.type_id()));
    assert!(ids.contains(&BaseType::Secondary.type_id()));
    assert!(bases.iter().all(|t| t.is_base()));
}

#[test]
fn test_type_with_instances_cannot_be_deleted() {
    let repository = test_repository();
    repository.create_type(memo_type(), &admin()).unwrap();
    let id = create_memo(&repository, "memo.txt");

    let err = repository.delete_type(MEMO, &admin()).unwrap_err();
    assert_matches!(
        err,
        VellumError::Constraint {
            reason: ConstraintViolation::TypeInUse { .. }
        }
    );

    repository.delete_object(&id, true, &alice()).unwrap();
    repository.delete_type(MEMO, &admin()).unwrap();
    let err = repository.get_type(MEMO).unwrap_err();
    assert_matches!(
        err,
        VellumError::NotFound {
            reason: NotFound::UnknownType { .. }
        }
    );
}

#[test]
fn test_attached_secondary_type_is_in_use() {
    let repository = test_repository();
    let request = CreateObject::new(TEST_DOCUMENT, named("tagged.txt"))
        .with_secondary_types(vec![TypeId::new(TEST_TAGGABLE)]);
    repository.create_object(request, &alice()).unwrap();

    let err = repository.delete_type(TEST_TAGGABLE, &admin()).unwrap_err();
    assert_matches!(
        err,
        VellumError::Constraint {
            reason: ConstraintViolation::TypeInUse { .. }
        }
    );
    repository.delete_type(TEST_RATED, &admin()).unwrap();
}

#[test]
fn test_type_with_subtypes_cannot_be_deleted() {
    let repository = test_repository();
    repository.create_type(memo_type(), &admin()).unwrap();

    let err = repository.delete_type(TEST_DOCUMENT, &admin()).unwrap_err();
    assert_matches!(
        err,
        VellumError::Constraint {
            reason: ConstraintViolation::TypeInUse { .. }
        }
    );

    let err = repository
        .delete_type(BaseType::Document.type_id(), &admin())
        .unwrap_err();
    assert_matches!(
        err,
        VellumError::Constraint {
            reason: ConstraintViolation::TypeNotMutable { .. }
        }
    );
}

#[test]
fn test_update_adds_optional_property() {
    let repository = test_repository();
    repository.create_type(memo_type(), &admin()).unwrap();
    create_memo(&repository, "before.txt");

    let updated = memo_type().with_property(PropertyDefinition::single(AUTHOR, Datatype::String));
    repository.update_type(updated, &admin()).unwrap();

    let request = CreateObject::new(
        MEMO,
        bag([
            (ids::NAME, BagValue::from("after.txt")),
            (AUTHOR, BagValue::from("alice")),
            (PAGES, BagValue::U8(3)),
        ]),
    );
    let id = repository.create_object(request, &alice()).unwrap();
    let memo = repository
        .get_object(&id, &ReadOptions::default(), &alice())
        .unwrap();
    assert_eq!(memo.text(AUTHOR), Some("alice"));
}

#[test]
fn test_incompatible_update_is_rejected() {
    let repository = test_repository();
    repository.create_type(memo_type(), &admin()).unwrap();

    let without_pages = TypeDefinition::new(MEMO, TEST_DOCUMENT, BaseType::Document);
    let err = repository.update_type(without_pages, &admin()).unwrap_err();
    assert_matches!(
        err,
        VellumError::Constraint {
            reason: ConstraintViolation::IncompatibleTypeUpdate { .. }
        }
    );

    let retyped = TypeDefinition::new(MEMO, TEST_DOCUMENT, BaseType::Document)
        .with_property(PropertyDefinition::single(PAGES, Datatype::String));
    let err = repository.update_type(retyped, &admin()).unwrap_err();
    assert_matches!(
        err,
        VellumError::Constraint {
            reason: ConstraintViolation::IncompatibleTypeUpdate { .. }
        }
    );
}

#[test]
fn test_duplicate_type_is_rejected() {
    let repository = test_repository();
    let err = repository
        .create_type(
            TypeDefinition::new(TEST_DOCUMENT, BaseType::Document.type_id(), BaseType::Document),
            &admin(),
        )
        .unwrap_err();
    assert_matches!(
        err,
        VellumError::Constraint {
            reason: ConstraintViolation::DuplicateType { .. }
        }
    );
}

#[test]
fn test_type_deletion_racing_creation_never_orphans_objects() {
    for _ in 0..50 {
        let repository = test_repository();
        repository.create_type(memo_type(), &admin()).unwrap();

        let (created, deleted) = std::thread::scope(|scope| {
            let create = scope.spawn(|| {
                repository.create_object(CreateObject::new(MEMO, named("memo.txt")), &alice())
            });
            let delete = scope.spawn(|| repository.delete_type(MEMO, &admin()));
            (create.join().unwrap(), delete.join().unwrap())
        });

        match (created, deleted) {
            (Ok(id), Err(err)) => {
                assert_matches!(
                    err,
                    VellumError::Constraint {
                        reason: ConstraintViolation::TypeInUse { .. }
                    }
                );
                let memo = repository
                    .get_object(&id, &ReadOptions::default(), &alice())
                    .unwrap();
                assert_eq!(memo.type_id.as_str(), MEMO);
            }
            (Err(err), Ok(())) => {
                assert_matches!(
                    err,
                    VellumError::NotFound {
                        reason: NotFound::UnknownType { .. }
                    }
                );
            }
            (created, deleted) => panic!("create {created:?} and delete {deleted:?} both took effect or both failed"),
        }
    }
}
