//! In-memory repository
//!
//! The object service over the type registry, the permission evaluator and
//! the object table. Operations are grouped by concern in the submodules;
//! this module holds the shared request and response types.
//!
//! Locking: the object table lock may be held while a series mutex is taken,
//! never the other way round. Permission checks run before a series is
//! locked.

mod acl;
mod navigation;
mod objects;
mod types;
mod versions;

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

use vellum_authorization::{Ace, Acl, Action, PermissionEvaluator};
use vellum_core::{
    property_ids, ObjectId, PrincipalId, RepositoryConfig, Result, TypeId, VellumConfig,
    VellumError,
};
use vellum_types::{
    BaseType, CachedTypeSource, PropertyBag, PropertyDefinition, PropertyMarshaller, PropertySet,
    PropertyValue, TypeDefinition, TypeRegistry, TypeSource,
};

use crate::content::ContentStream;
use crate::object::{AuditInfo, ObjectKind, ObjectRecord, ObjectTable, StoredObject};
use crate::versioning::VersioningState;

pub use navigation::{ObjectParent, ObjectTree};
pub use versions::CheckIn;

/// Which properties a read returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PropertyFilter {
    /// Every property
    #[default]
    All,
    /// Only properties whose id or query name is listed
    Only(BTreeSet<String>),
}

impl PropertyFilter {
    /// Parse a filter string: `*` (or nothing) for all, else a comma list
    pub fn parse(filter: &str) -> Self {
        let filter = filter.trim();
        if filter.is_empty() || filter == "*" {
            return PropertyFilter::All;
        }
        PropertyFilter::Only(
            filter
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether `definition` passes the filter
    pub fn matches(&self, definition: &PropertyDefinition) -> bool {
        match self {
            PropertyFilter::All => true,
            PropertyFilter::Only(names) => {
                names.contains(definition.id.as_str()) || names.contains(&definition.query_name)
            }
        }
    }
}

/// Options for reads
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Property filter
    pub filter: PropertyFilter,
    /// Include the effective ACL
    pub include_acl: bool,
    /// Include the caller's allowable actions
    pub include_allowable_actions: bool,
}

impl ReadOptions {
    /// Read everything
    pub fn full() -> Self {
        Self {
            filter: PropertyFilter::All,
            include_acl: true,
            include_allowable_actions: true,
        }
    }

    /// Restrict properties to `filter`
    pub fn with_filter(mut self, filter: PropertyFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Result of a read
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// Object id (the version id for documents)
    pub id: ObjectId,
    /// Base type
    pub base_type: BaseType,
    /// Object type
    pub type_id: TypeId,
    /// Filtered properties
    pub properties: PropertySet,
    /// Effective ACL, when requested
    pub acl: Option<Acl>,
    /// Allowable actions, when requested
    pub allowable_actions: Option<BTreeSet<Action>>,
}

impl ObjectData {
    /// Text of the first value of a property
    pub fn text(&self, property_id: &str) -> Option<&str> {
        self.properties.text(property_id)
    }

    /// Name of the object
    pub fn name(&self) -> Option<&str> {
        self.text(property_ids::NAME)
    }

    /// Boolean value of a property
    pub fn flag(&self, property_id: &str) -> Option<bool> {
        self.properties
            .first_value(property_id)
            .and_then(PropertyValue::as_bool)
    }
}

/// Outcome for one object of a bulk property update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUpdate {
    /// Id the caller addressed
    pub id: ObjectId,
    /// Id of the updated object or version
    pub new_id: ObjectId,
    /// Change token after the update
    pub change_token: String,
}

/// Inbound create call
#[derive(Debug, Clone, Default)]
pub struct CreateObject {
    /// Object type; when absent it is read from the bag
    pub type_id: Option<TypeId>,
    /// Secondary types; when absent they are read from the bag
    pub secondary_type_ids: Option<Vec<TypeId>>,
    /// Raw properties
    pub properties: PropertyBag,
    /// Content of a document
    pub content: Option<ContentStream>,
    /// Versioning state of a document
    pub versioning_state: Option<VersioningState>,
    /// Policies to apply
    pub policy_ids: Vec<ObjectId>,
    /// Entries to add to the direct ACL
    pub add_aces: Vec<Ace>,
    /// Entries to remove from the direct ACL
    pub remove_aces: Vec<Ace>,
    /// Parent folder
    pub folder_id: Option<ObjectId>,
}

impl CreateObject {
    /// Create call with an explicit type
    pub fn new(type_id: impl Into<TypeId>, properties: PropertyBag) -> Self {
        Self {
            type_id: Some(type_id.into()),
            properties,
            ..Self::default()
        }
    }

    /// Create call whose type comes from the object-type-id entry of the bag
    pub fn from_bag(properties: PropertyBag) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    /// File the object in `folder_id`
    pub fn in_folder(mut self, folder_id: impl Into<ObjectId>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Attach content
    pub fn with_content(mut self, content: ContentStream) -> Self {
        self.content = Some(content);
        self
    }

    /// Request a versioning state
    pub fn with_versioning_state(mut self, state: VersioningState) -> Self {
        self.versioning_state = Some(state);
        self
    }

    /// Attach secondary types
    pub fn with_secondary_types(mut self, ids: Vec<TypeId>) -> Self {
        self.secondary_type_ids = Some(ids);
        self
    }

    /// Add and remove direct ACL entries
    pub fn with_aces(mut self, add: Vec<Ace>, remove: Vec<Ace>) -> Self {
        self.add_aces = add;
        self.remove_aces = remove;
        self
    }

    /// Apply policies
    pub fn with_policies(mut self, policy_ids: Vec<ObjectId>) -> Self {
        self.policy_ids = policy_ids;
        self
    }
}

/// In-memory object service
#[derive(Debug)]
pub struct Repository {
    config: RepositoryConfig,
    types: Arc<TypeRegistry>,
    type_cache: CachedTypeSource,
    evaluator: PermissionEvaluator,
    state: RwLock<ObjectTable>,
    root_id: ObjectId,
}

impl Repository {
    /// Create a repository with the base types of its protocol version
    pub fn new(config: RepositoryConfig) -> Result<Self> {
        let types = Arc::new(TypeRegistry::from_config(&config));
        Self::with_registry(config, types)
    }

    /// Create a repository over an existing registry
    pub fn with_registry(config: RepositoryConfig, types: Arc<TypeRegistry>) -> Result<Self> {
        config.validate()?;
        if types.protocol_version() != config.protocol_version {
            return Err(VellumError::invalid_message(format!(
                "registry speaks protocol {} but the repository is configured for {}",
                types.protocol_version(),
                config.protocol_version
            )));
        }
        let evaluator = PermissionEvaluator::from_config(&config)?;
        let admin = PrincipalId::new(config.admin_principal.as_str());

        let folder_type = types.resolve(BaseType::Folder.type_id())?;
        let mut properties = PropertySet::new();
        if let Some(name) = folder_type.property_definition(property_ids::NAME) {
            properties.insert(vellum_types::Property::single(
                name.clone(),
                PropertyValue::String(String::new()),
            )?);
        }
        let root_id = ObjectId::generate();
        let root = StoredObject {
            id: root_id.clone(),
            type_id: folder_type.id.clone(),
            parent: None,
            acl: vec![evaluator.default_ace().clone()],
            acl_inherited: false,
            policies: BTreeSet::new(),
            kind: ObjectKind::Folder(ObjectRecord {
                secondary_type_ids: Vec::new(),
                properties,
                audit: AuditInfo::new(&admin),
            }),
        };
        let mut table = ObjectTable::new();
        table.insert(root);

        tracing::info!(
            repository = %config.repository_id,
            protocol = %config.protocol_version,
            root = %root_id,
            "Opened repository"
        );

        Ok(Self {
            type_cache: CachedTypeSource::new(types.clone()),
            config,
            types,
            evaluator,
            state: RwLock::new(table),
            root_id,
        })
    }

    /// Repository configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Authoritative type registry
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Permission evaluator
    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    /// Id of the root folder
    pub fn root_folder_id(&self) -> &ObjectId {
        &self.root_id
    }

    fn marshaller(&self) -> PropertyMarshaller<'_, CachedTypeSource> {
        PropertyMarshaller::new(&self.type_cache)
    }

    fn resolve_type(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        self.type_cache
            .type_definition(type_id)
            .ok_or_else(|| VellumError::unknown_type(type_id))
    }

    /// Effective ACL of `id` and the permission check for `action`
    fn authorize(
        &self,
        table: &ObjectTable,
        id: &ObjectId,
        user: &PrincipalId,
        action: Action,
    ) -> Result<Acl> {
        let key = table
            .resolve_key(id)
            .ok_or_else(|| VellumError::object_not_found(id.as_str()))?;
        let acl = self.evaluator.effective_acl(table, &key)?;
        self.evaluator.check(user, &acl, action)?;
        Ok(acl)
    }
}

/// Secondary type ids held in a marshalled property set
fn secondary_ids_in(properties: &PropertySet) -> Option<Vec<TypeId>> {
    let property = properties.get(property_ids::SECONDARY_OBJECT_TYPE_IDS)?;
    let mut ids: Vec<TypeId> = Vec::new();
    for value in property.values() {
        if let Some(id) = value.as_str() {
            if !ids.iter().any(|existing| existing.as_str() == id) {
                ids.push(TypeId::new(id));
            }
        }
    }
    Some(ids)
}

/// Drop keys the repository maintains outside the stored property set
fn strip_maintained(properties: &mut PropertySet) {
    properties.remove(property_ids::OBJECT_TYPE_ID);
    properties.remove(property_ids::SECONDARY_OBJECT_TYPE_IDS);
}

/// Expand the user macro in both ACE lists
fn expand_aces(add: &[Ace], remove: &[Ace], user: &PrincipalId) -> (Vec<Ace>, Vec<Ace>) {
    (
        Acl::expand_user_macro(add, user),
        Acl::expand_user_macro(remove, user),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_types::Datatype;

    #[test]
    fn test_property_filter_parse() {
        assert_eq!(PropertyFilter::parse("*"), PropertyFilter::All);
        assert_eq!(PropertyFilter::parse("  "), PropertyFilter::All);

        let filter = PropertyFilter::parse("cmis:name, title,");
        let name = PropertyDefinition::single("cmis:name", Datatype::String);
        let title = PropertyDefinition::single("test:title", Datatype::String).with_query_name("title");
        let other = PropertyDefinition::single("test:other", Datatype::String);
        assert!(filter.matches(&name));
        assert!(filter.matches(&title));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_root_folder_uses_default_ace() {
        let repository = Repository::new(RepositoryConfig::default()).unwrap();
        let table = repository.state.read();
        let root = table.get(repository.root_folder_id()).unwrap();
        assert_eq!(root.base_type(), BaseType::Folder);
        assert_eq!(root.acl, vec![repository.evaluator().default_ace().clone()]);
        assert!(root.parent.is_none());
    }

    #[test]
    fn test_registry_version_must_match() {
        let types = Arc::new(TypeRegistry::new(vellum_core::ProtocolVersion::V1_0));
        let config = RepositoryConfig::default();
        assert!(Repository::with_registry(config, types).is_err());
    }
}
