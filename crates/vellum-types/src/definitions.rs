//! Type and property definitions
//!
//! A [`TypeDefinition`] owns an ordered map of [`PropertyDefinition`]s. Inherited
//! definitions are copied from the parent at registration time and precede the
//! type's own definitions.

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use vellum_authorization::Action;
use vellum_core::{PropertyId, TypeId};

use crate::value::PropertyValue;

/// The six fixed root types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BaseType {
    /// `cmis:document`
    #[serde(rename = "cmis:document")]
    Document,
    /// `cmis:folder`
    #[serde(rename = "cmis:folder")]
    Folder,
    /// `cmis:relationship`
    #[serde(rename = "cmis:relationship")]
    Relationship,
    /// `cmis:policy`
    #[serde(rename = "cmis:policy")]
    Policy,
    /// `cmis:item`
    #[serde(rename = "cmis:item")]
    Item,
    /// `cmis:secondary`, a mixin that never has instances of its own
    #[serde(rename = "cmis:secondary")]
    Secondary,
}

impl BaseType {
    /// All base types
    pub const ALL: [BaseType; 6] = [
        BaseType::Document,
        BaseType::Folder,
        BaseType::Relationship,
        BaseType::Policy,
        BaseType::Item,
        BaseType::Secondary,
    ];

    /// Type id of the root type
    pub fn type_id(self) -> &'static str {
        match self {
            BaseType::Document => "cmis:document",
            BaseType::Folder => "cmis:folder",
            BaseType::Relationship => "cmis:relationship",
            BaseType::Policy => "cmis:policy",
            BaseType::Item => "cmis:item",
            BaseType::Secondary => "cmis:secondary",
        }
    }

    /// Base type whose root has the given id
    pub fn from_type_id(id: &str) -> Option<BaseType> {
        BaseType::ALL.iter().copied().find(|base| base.type_id() == id)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_id())
    }
}

/// Property datatypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Datatype {
    Boolean,
    DateTime,
    Decimal,
    Html,
    Id,
    Integer,
    String,
    Uri,
}

impl Datatype {
    /// All datatypes
    pub const ALL: [Datatype; 8] = [
        Datatype::Boolean,
        Datatype::DateTime,
        Datatype::Decimal,
        Datatype::Html,
        Datatype::Id,
        Datatype::Integer,
        Datatype::String,
        Datatype::Uri,
    ];

    /// Lowercase protocol name
    pub fn as_str(self) -> &'static str {
        match self {
            Datatype::Boolean => "boolean",
            Datatype::DateTime => "datetime",
            Datatype::Decimal => "decimal",
            Datatype::Html => "html",
            Datatype::Id => "id",
            Datatype::Integer => "integer",
            Datatype::String => "string",
            Datatype::Uri => "uri",
        }
    }

    /// Whether values are carried as text
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            Datatype::Html | Datatype::Id | Datatype::String | Datatype::Uri
        )
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of values a property holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// Exactly one value (or unset)
    Single,
    /// An ordered list of values
    Multi,
}

/// When a property may be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Updatability {
    /// Maintained by the repository
    ReadOnly,
    /// Writable at any time
    ReadWrite,
    /// Writable only on a private working copy
    WhenCheckedOut,
    /// Writable only when the object is created
    OnCreate,
}

impl Updatability {
    /// Filter used by bulk property updates
    pub const UPDATE: &'static [Updatability] = &[Updatability::ReadWrite];

    /// Filter used by checkin and by updates of a private working copy
    pub const CHECKIN: &'static [Updatability] =
        &[Updatability::ReadWrite, Updatability::WhenCheckedOut];

    /// Filter used on create
    pub const CREATE: &'static [Updatability] = &[
        Updatability::ReadWrite,
        Updatability::WhenCheckedOut,
        Updatability::OnCreate,
    ];
}

/// One entry of a choice list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Label shown to users
    pub display_name: String,
    /// Values the entry stands for
    pub values: Vec<PropertyValue>,
}

/// Choice list of a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choices {
    /// Open lists accept values outside the list
    pub open: bool,
    /// Entries in presentation order
    pub entries: Vec<Choice>,
}

impl Choices {
    /// Whether `value` is one of the listed values
    pub fn contains(&self, value: &PropertyValue) -> bool {
        self.entries.iter().any(|choice| choice.values.contains(value))
    }
}

/// Precision of stored datetime values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateTimeResolution {
    /// Year only
    Year,
    /// Calendar date
    Date,
    /// Full timestamp
    Time,
}

/// Datatype-specific constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyConstraints {
    /// Maximum string length in characters
    pub max_length: Option<u64>,
    /// Smallest allowed integer
    pub min_integer: Option<BigInt>,
    /// Largest allowed integer
    pub max_integer: Option<BigInt>,
    /// Smallest allowed decimal
    pub min_decimal: Option<BigDecimal>,
    /// Largest allowed decimal
    pub max_decimal: Option<BigDecimal>,
    /// Datetime resolution
    pub resolution: Option<DateTimeResolution>,
}

/// Definition of one property of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Property id
    pub id: PropertyId,
    /// Local name
    pub local_name: String,
    /// Name used in queries
    pub query_name: String,
    /// Human-readable name
    pub display_name: String,
    /// Optional description
    pub description: Option<String>,
    /// Datatype of the values
    pub datatype: Datatype,
    /// Single or multi-valued
    pub cardinality: Cardinality,
    /// When the property may be written
    pub updatability: Updatability,
    /// Must be set on create
    pub required: bool,
    /// May appear in query predicates
    pub queryable: bool,
    /// May appear in query ordering
    pub orderable: bool,
    /// Copied from the parent type
    pub inherited: bool,
    /// Optional choice list
    pub choices: Option<Choices>,
    /// Values applied when the property is not supplied on create
    pub default_value: Vec<PropertyValue>,
    /// Datatype-specific constraints
    pub constraints: PropertyConstraints,
}

impl PropertyDefinition {
    /// Create a writable, optional definition with names equal to the id
    pub fn new(id: impl Into<PropertyId>, datatype: Datatype, cardinality: Cardinality) -> Self {
        let id = id.into();
        Self {
            local_name: id.as_str().to_string(),
            query_name: id.as_str().to_string(),
            display_name: id.as_str().to_string(),
            id,
            description: None,
            datatype,
            cardinality,
            updatability: Updatability::ReadWrite,
            required: false,
            queryable: true,
            orderable: cardinality == Cardinality::Single,
            inherited: false,
            choices: None,
            default_value: Vec::new(),
            constraints: PropertyConstraints::default(),
        }
    }

    /// Single-valued definition
    pub fn single(id: impl Into<PropertyId>, datatype: Datatype) -> Self {
        Self::new(id, datatype, Cardinality::Single)
    }

    /// Multi-valued definition
    pub fn multi(id: impl Into<PropertyId>, datatype: Datatype) -> Self {
        Self::new(id, datatype, Cardinality::Multi)
    }

    /// Set the updatability
    pub fn with_updatability(mut self, updatability: Updatability) -> Self {
        self.updatability = updatability;
        self
    }

    /// Mark the property as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the query name
    pub fn with_query_name(mut self, query_name: impl Into<String>) -> Self {
        self.query_name = query_name.into();
        self
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Attach a choice list
    pub fn with_choices(mut self, open: bool, entries: Vec<Choice>) -> Self {
        self.choices = Some(Choices { open, entries });
        self
    }

    /// Set the default value
    pub fn with_default(mut self, values: Vec<PropertyValue>) -> Self {
        self.default_value = values;
        self
    }

    /// Limit string length
    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.constraints.max_length = Some(max_length);
        self
    }

    /// Bound integer values
    pub fn with_integer_range(mut self, min: Option<BigInt>, max: Option<BigInt>) -> Self {
        self.constraints.min_integer = min;
        self.constraints.max_integer = max;
        self
    }

    /// Bound decimal values
    pub fn with_decimal_range(mut self, min: Option<BigDecimal>, max: Option<BigDecimal>) -> Self {
        self.constraints.min_decimal = min;
        self.constraints.max_decimal = max;
        self
    }

    /// Whether the property holds a list
    pub fn is_multi(&self) -> bool {
        self.cardinality == Cardinality::Multi
    }

    /// Copy of this definition flagged as inherited
    pub fn as_inherited(&self) -> Self {
        Self {
            inherited: true,
            ..self.clone()
        }
    }
}

/// Which type-management operations a type allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMutability {
    /// Subtypes may be created
    pub can_create: bool,
    /// The type may be updated
    pub can_update: bool,
    /// The type may be deleted
    pub can_delete: bool,
}

impl TypeMutability {
    /// Everything allowed
    pub const FULL: TypeMutability = TypeMutability {
        can_create: true,
        can_update: true,
        can_delete: true,
    };

    /// Subtypes only; the type itself is fixed
    pub const FIXED: TypeMutability = TypeMutability {
        can_create: true,
        can_update: false,
        can_delete: false,
    };
}

impl Default for TypeMutability {
    fn default() -> Self {
        Self::FULL
    }
}

/// Whether documents of a type carry content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStreamAllowed {
    /// Content is rejected
    NotAllowed,
    /// Content is optional
    #[default]
    Allowed,
    /// Content must be supplied
    Required,
}

/// Definition of an object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Type id
    pub id: TypeId,
    /// Parent type, `None` for base types
    pub parent_id: Option<TypeId>,
    /// Local name
    pub local_name: String,
    /// Name used in queries
    pub query_name: String,
    /// Human-readable name
    pub display_name: String,
    /// Optional description
    pub description: Option<String>,
    /// Base type tag
    pub base_type: BaseType,
    /// Instances may be created
    pub creatable: bool,
    /// Instances may be filed in folders
    pub fileable: bool,
    /// May appear in query FROM clauses
    pub queryable: bool,
    /// Content is full-text indexed
    pub fulltext_indexed: bool,
    /// Included in queries against the supertype
    pub included_in_supertype_query: bool,
    /// Policies may be applied to instances
    pub controllable_policy: bool,
    /// ACLs may be applied to instances
    pub controllable_acl: bool,
    /// Type-management capabilities (protocol 1.1 only)
    pub type_mutability: Option<TypeMutability>,
    /// Documents of the type keep a version history
    pub versionable: bool,
    /// Content stream policy for documents
    pub content_stream_allowed: ContentStreamAllowed,
    /// Property definitions, inherited first
    pub property_definitions: IndexMap<PropertyId, Arc<PropertyDefinition>>,
}

impl TypeDefinition {
    /// Create a subtype of `parent_id` with the default flags of its base type
    pub fn new(id: impl Into<TypeId>, parent_id: impl Into<TypeId>, base_type: BaseType) -> Self {
        let mut definition = Self::root(base_type);
        let id = id.into();
        definition.local_name = id.as_str().to_string();
        definition.query_name = id.as_str().to_string();
        definition.display_name = id.as_str().to_string();
        definition.id = id;
        definition.parent_id = Some(parent_id.into());
        definition.type_mutability = Some(TypeMutability::FULL);
        definition
    }

    /// Create the root definition of a base type, without properties
    pub fn root(base_type: BaseType) -> Self {
        let id = base_type.type_id();
        let instantiable = base_type != BaseType::Secondary;
        Self {
            id: TypeId::new(id),
            parent_id: None,
            local_name: id.to_string(),
            query_name: id.to_string(),
            display_name: id.to_string(),
            description: None,
            base_type,
            creatable: instantiable,
            fileable: matches!(
                base_type,
                BaseType::Document | BaseType::Folder | BaseType::Policy | BaseType::Item
            ),
            queryable: instantiable,
            fulltext_indexed: false,
            included_in_supertype_query: true,
            controllable_policy: instantiable,
            controllable_acl: instantiable,
            type_mutability: Some(TypeMutability::FIXED),
            versionable: base_type == BaseType::Document,
            content_stream_allowed: if base_type == BaseType::Document {
                ContentStreamAllowed::Allowed
            } else {
                ContentStreamAllowed::NotAllowed
            },
            property_definitions: IndexMap::new(),
        }
    }

    /// Add (or replace) an own property definition
    pub fn with_property(mut self, definition: PropertyDefinition) -> Self {
        self.property_definitions
            .insert(definition.id.clone(), Arc::new(definition));
        self
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set whether documents keep versions
    pub fn with_versionable(mut self, versionable: bool) -> Self {
        self.versionable = versionable;
        self
    }

    /// Set the content stream policy
    pub fn with_content_stream(mut self, allowed: ContentStreamAllowed) -> Self {
        self.content_stream_allowed = allowed;
        self
    }

    /// Set the type mutability
    pub fn with_mutability(mut self, mutability: TypeMutability) -> Self {
        self.type_mutability = Some(mutability);
        self
    }

    /// Whether this is one of the fixed root types
    pub fn is_base(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Look up a property definition by id
    pub fn property_definition(&self, id: &str) -> Option<&Arc<PropertyDefinition>> {
        self.property_definitions.get(id)
    }

    /// Look up a property definition by query name
    pub fn property_by_query_name(&self, query_name: &str) -> Option<&Arc<PropertyDefinition>> {
        self.property_definitions
            .values()
            .find(|definition| definition.query_name == query_name)
    }

    /// Definitions declared on this type itself
    pub fn own_properties(&self) -> impl Iterator<Item = &Arc<PropertyDefinition>> {
        self.property_definitions
            .values()
            .filter(|definition| !definition.inherited)
    }

    /// Mapping actions that can apply to instances of this type
    pub fn candidate_actions(&self) -> Vec<Action> {
        let mut actions = vec![
            Action::GetPropertiesObject,
            Action::UpdatePropertiesObject,
            Action::DeleteObject,
            Action::GetObjectRelationshipsObject,
            Action::GetAclObject,
        ];
        if self.controllable_acl {
            actions.push(Action::ApplyAclObject);
        }
        if self.controllable_policy {
            actions.extend([
                Action::AddPolicyObject,
                Action::RemovePolicyObject,
                Action::GetAppliedPoliciesObject,
            ]);
        }
        if self.fileable {
            actions.extend([
                Action::GetFolderParentObject,
                Action::MoveObject,
                Action::AddToFolderObject,
                Action::RemoveFromFolderObject,
            ]);
        }
        match self.base_type {
            BaseType::Document => {
                if self.content_stream_allowed != ContentStreamAllowed::NotAllowed {
                    actions.extend([
                        Action::ViewContentObject,
                        Action::SetContentDocument,
                        Action::DeleteContentDocument,
                    ]);
                }
                if self.versionable {
                    actions.extend([
                        Action::CheckoutDocument,
                        Action::CancelCheckoutDocument,
                        Action::CheckinDocument,
                    ]);
                }
                actions.push(Action::GetAllVersionsVersionSeries);
            }
            BaseType::Folder => actions.extend([
                Action::GetDescendantsFolder,
                Action::GetChildrenFolder,
                Action::GetParentsFolder,
                Action::CreateDocumentFolder,
                Action::CreateFolderFolder,
                Action::CreatePolicyFolder,
                Action::DeleteTreeFolder,
                Action::AddToFolderFolder,
                Action::RemoveFromFolderFolder,
                Action::MoveTarget,
                Action::MoveSource,
            ]),
            BaseType::Relationship => actions.extend([
                Action::CreateRelationshipSource,
                Action::CreateRelationshipTarget,
            ]),
            BaseType::Policy => {
                actions.extend([Action::AddPolicyPolicy, Action::RemovePolicyPolicy]);
            }
            BaseType::Item | BaseType::Secondary => {}
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_type_ids() {
        for base in BaseType::ALL {
            assert_eq!(BaseType::from_type_id(base.type_id()), Some(base));
        }
        assert_eq!(BaseType::from_type_id("cmis:blob"), None);
    }

    #[test]
    fn test_subtype_defaults() {
        let def = TypeDefinition::new("test:doc", "cmis:document", BaseType::Document)
            .with_property(PropertyDefinition::single("test:title", Datatype::String));
        assert!(def.versionable);
        assert!(!def.is_base());
        assert_eq!(def.type_mutability, Some(TypeMutability::FULL));
        assert_eq!(def.own_properties().count(), 1);
    }

    #[test]
    fn test_secondary_root_is_not_creatable() {
        let def = TypeDefinition::root(BaseType::Secondary);
        assert!(!def.creatable);
        assert!(!def.fileable);
    }

    #[test]
    fn test_candidate_actions_follow_flags() {
        let doc = TypeDefinition::new("test:plain", "cmis:document", BaseType::Document)
            .with_versionable(false);
        let actions = doc.candidate_actions();
        assert!(!actions.contains(&Action::CheckoutDocument));
        assert!(actions.contains(&Action::ViewContentObject));

        let folder = TypeDefinition::root(BaseType::Folder);
        assert!(folder.candidate_actions().contains(&Action::GetChildrenFolder));
    }
}
