//! Test type system and repository fixtures

use num_bigint::BigInt;
use std::sync::Arc;

use vellum_core::{principal_ids, property_ids, ObjectId, PrincipalId, RepositoryConfig};
use vellum_store::{CreateObject, Repository, VersioningState};
use vellum_types::{
    BagValue, BaseType, Choice, Datatype, PropertyBag, PropertyDefinition, PropertyValue,
    TypeDefinition, TypeRegistry, Updatability,
};

/// Versionable document type with one property per datatype
pub const TEST_DOCUMENT: &str = "test:document";
/// Document type that cannot be versioned
pub const TEST_PLAIN_DOCUMENT: &str = "test:plain";
/// Folder subtype
pub const TEST_FOLDER: &str = "test:folder";
/// Secondary type defining `test:label` as a string
pub const TEST_TAGGABLE: &str = "test:taggable";
/// Secondary type defining `test:label` as an integer
pub const TEST_RATED: &str = "test:rated";
/// Property id shared by both secondary types
pub const SHARED_LABEL: &str = "test:label";

/// Custom property ids of [`TEST_DOCUMENT`]
pub mod props {
    /// String, at most 64 characters
    pub const STRING: &str = "test:string";
    /// Boolean
    pub const BOOLEAN: &str = "test:boolean";
    /// Integer between 0 and 1000
    pub const INTEGER: &str = "test:integer";
    /// Decimal
    pub const DECIMAL: &str = "test:decimal";
    /// Date-time
    pub const DATETIME: &str = "test:datetime";
    /// Id
    pub const ID: &str = "test:id";
    /// URI
    pub const URI: &str = "test:uri";
    /// HTML
    pub const HTML: &str = "test:html";
    /// Multi-valued string
    pub const STRINGS: &str = "test:strings";
    /// Multi-valued integer
    pub const INTEGERS: &str = "test:integers";
    /// Closed choice of `draft` and `final`, updatable only when checked out
    pub const STATUS: &str = "test:status";
}

fn subtype(id: &str, base: BaseType) -> TypeDefinition {
    TypeDefinition::new(id, base.type_id(), base)
}

fn choice(value: &str) -> Choice {
    Choice {
        display_name: value.to_string(),
        values: vec![PropertyValue::String(value.to_string())],
    }
}

/// The test types, parents first
pub fn test_type_definitions() -> Vec<TypeDefinition> {
    let document = subtype(TEST_DOCUMENT, BaseType::Document)
        .with_property(
            PropertyDefinition::single(props::STRING, Datatype::String).with_max_length(64),
        )
        .with_property(PropertyDefinition::single(props::BOOLEAN, Datatype::Boolean))
        .with_property(
            PropertyDefinition::single(props::INTEGER, Datatype::Integer)
                .with_integer_range(Some(BigInt::from(0)), Some(BigInt::from(1000))),
        )
        .with_property(PropertyDefinition::single(props::DECIMAL, Datatype::Decimal))
        .with_property(PropertyDefinition::single(props::DATETIME, Datatype::DateTime))
        .with_property(PropertyDefinition::single(props::ID, Datatype::Id))
        .with_property(PropertyDefinition::single(props::URI, Datatype::Uri))
        .with_property(PropertyDefinition::single(props::HTML, Datatype::Html))
        .with_property(PropertyDefinition::multi(props::STRINGS, Datatype::String))
        .with_property(PropertyDefinition::multi(props::INTEGERS, Datatype::Integer))
        .with_property(
            PropertyDefinition::single(props::STATUS, Datatype::String)
                .with_updatability(Updatability::WhenCheckedOut)
                .with_choices(false, vec![choice("draft"), choice("final")]),
        );

    let plain = subtype(TEST_PLAIN_DOCUMENT, BaseType::Document).with_versionable(false);

    let folder = subtype(TEST_FOLDER, BaseType::Folder);

    let taggable = subtype(TEST_TAGGABLE, BaseType::Secondary)
        .with_property(PropertyDefinition::single(SHARED_LABEL, Datatype::String));
    let rated = subtype(TEST_RATED, BaseType::Secondary)
        .with_property(PropertyDefinition::single(SHARED_LABEL, Datatype::Integer));

    vec![document, plain, folder, taggable, rated]
}

/// A protocol 1.1 registry holding the base types and the test types
pub fn test_registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new(RepositoryConfig::default().protocol_version);
    for definition in test_type_definitions() {
        registry.register(definition).unwrap();
    }
    Arc::new(registry)
}

/// A repository with the default configuration over [`test_registry`]
///
/// Every caller starts with full access through the default entry on the
/// root folder.
pub fn test_repository() -> Repository {
    test_repository_with(RepositoryConfig::new("test"))
}

/// A repository with `config` over [`test_registry`]
pub fn test_repository_with(config: RepositoryConfig) -> Repository {
    Repository::with_registry(config, test_registry()).unwrap()
}

/// The administrator principal
pub fn admin() -> PrincipalId {
    PrincipalId::new(principal_ids::ADMIN)
}

/// A regular user
pub fn alice() -> PrincipalId {
    PrincipalId::new("alice")
}

/// Another regular user
pub fn bob() -> PrincipalId {
    PrincipalId::new("bob")
}

/// Build a bag from `(key, value)` pairs, keeping their order
pub fn bag<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> PropertyBag
where
    K: Into<String>,
    V: Into<BagValue>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// A bag holding only a name
pub fn named(name: &str) -> PropertyBag {
    bag([(property_ids::NAME, name)])
}

/// Create a [`TEST_DOCUMENT`] in the root folder in the major state
pub fn create_document(repository: &Repository, name: &str, user: &PrincipalId) -> ObjectId {
    create_document_with(repository, name, VersioningState::Major, user)
}

/// Create a [`TEST_DOCUMENT`] in the root folder in `state`
pub fn create_document_with(
    repository: &Repository,
    name: &str,
    state: VersioningState,
    user: &PrincipalId,
) -> ObjectId {
    let request = CreateObject::new(TEST_DOCUMENT, named(name))
        .in_folder(repository.root_folder_id().clone())
        .with_versioning_state(state);
    repository.create_object(request, user).unwrap()
}

/// Create a [`TEST_FOLDER`] inside `parent`
pub fn create_folder(
    repository: &Repository,
    parent: &ObjectId,
    name: &str,
    user: &PrincipalId,
) -> ObjectId {
    let request = CreateObject::new(TEST_FOLDER, named(name)).in_folder(parent.clone());
    repository.create_object(request, user).unwrap()
}
