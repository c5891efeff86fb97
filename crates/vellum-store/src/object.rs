//! Stored objects
//!
//! Every object in the table is one of the instantiable base kinds. Documents
//! hold their version series behind a mutex shared by all version ids of the
//! series; the other kinds carry a single property record.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use vellum_authorization::{Ace, AclGraph, AclNode};
use vellum_core::{InvalidArgument, ObjectId, PrincipalId, Result, TypeId, VellumError};
use vellum_types::{BaseType, PropertySet};

use crate::versioning::VersionSeries;

/// Creation and modification bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditInfo {
    /// Creator
    pub created_by: PrincipalId,
    /// Creation time
    pub creation_date: DateTime<Utc>,
    /// Last modifier
    pub last_modified_by: PrincipalId,
    /// Last modification time
    pub last_modification_date: DateTime<Utc>,
    /// Incremented on every modification
    pub change_token: u64,
}

impl AuditInfo {
    /// Audit record for an object created now by `user`
    pub fn new(user: &PrincipalId) -> Self {
        let now = Utc::now();
        Self {
            created_by: user.clone(),
            creation_date: now,
            last_modified_by: user.clone(),
            last_modification_date: now,
            change_token: 1,
        }
    }

    /// Record a modification
    pub fn touch(&mut self, user: &PrincipalId) {
        self.last_modified_by = user.clone();
        self.last_modification_date = Utc::now();
        self.change_token += 1;
    }
}

/// Properties of a non-document object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Attached secondary types, in attach order
    pub secondary_type_ids: Vec<TypeId>,
    /// Caller-visible properties
    pub properties: PropertySet,
    /// Bookkeeping
    pub audit: AuditInfo,
}

/// Kind-specific state of a stored object
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// Versioned document
    Document(Arc<Mutex<VersionSeries>>),
    /// Folder
    Folder(ObjectRecord),
    /// Policy
    Policy(ObjectRecord),
    /// Relationship between two objects
    Relationship(ObjectRecord),
    /// Item
    Item(ObjectRecord),
}

impl ObjectKind {
    /// Build the kind for an object of `base`
    ///
    /// Secondary types describe mixins and have no instances.
    pub fn for_base(
        base: BaseType,
        record: ObjectRecord,
        series: impl FnOnce(ObjectRecord) -> VersionSeries,
    ) -> Result<Self> {
        Ok(match base {
            BaseType::Document => ObjectKind::Document(Arc::new(Mutex::new(series(record)))),
            BaseType::Folder => ObjectKind::Folder(record),
            BaseType::Policy => ObjectKind::Policy(record),
            BaseType::Relationship => ObjectKind::Relationship(record),
            BaseType::Item => ObjectKind::Item(record),
            BaseType::Secondary => {
                return Err(VellumError::invalid(InvalidArgument::NotInstantiable {
                    base_type: base.type_id().to_string(),
                }))
            }
        })
    }

    /// Base type of this kind
    pub fn base_type(&self) -> BaseType {
        match self {
            ObjectKind::Document(_) => BaseType::Document,
            ObjectKind::Folder(_) => BaseType::Folder,
            ObjectKind::Policy(_) => BaseType::Policy,
            ObjectKind::Relationship(_) => BaseType::Relationship,
            ObjectKind::Item(_) => BaseType::Item,
        }
    }

    /// The property record, for every kind except documents
    pub fn record(&self) -> Option<&ObjectRecord> {
        match self {
            ObjectKind::Document(_) => None,
            ObjectKind::Folder(record)
            | ObjectKind::Policy(record)
            | ObjectKind::Relationship(record)
            | ObjectKind::Item(record) => Some(record),
        }
    }

    /// Mutable property record, for every kind except documents
    pub fn record_mut(&mut self) -> Option<&mut ObjectRecord> {
        match self {
            ObjectKind::Document(_) => None,
            ObjectKind::Folder(record)
            | ObjectKind::Policy(record)
            | ObjectKind::Relationship(record)
            | ObjectKind::Item(record) => Some(record),
        }
    }

    /// The version series of a document
    pub fn series(&self) -> Option<&Arc<Mutex<VersionSeries>>> {
        match self {
            ObjectKind::Document(series) => Some(series),
            _ => None,
        }
    }
}

/// One entry of the object table
///
/// Documents are stored once under their series id; folder membership,
/// ACL and policies apply to every version of the series.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object id (series id for documents)
    pub id: ObjectId,
    /// Object type
    pub type_id: TypeId,
    /// Parent folder
    pub parent: Option<ObjectId>,
    /// Entries set directly on the object
    pub acl: Vec<Ace>,
    /// Whether parent entries apply
    pub acl_inherited: bool,
    /// Applied policy ids
    pub policies: BTreeSet<ObjectId>,
    /// Kind-specific state
    pub kind: ObjectKind,
}

impl StoredObject {
    /// Base type of the object
    pub fn base_type(&self) -> BaseType {
        self.kind.base_type()
    }
}

/// All stored objects and the version index
#[derive(Debug, Default)]
pub struct ObjectTable {
    objects: HashMap<ObjectId, StoredObject>,
    versions: HashMap<ObjectId, ObjectId>,
}

impl ObjectTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object; documents also index their current versions
    pub fn insert(&mut self, object: StoredObject) {
        if let ObjectKind::Document(series) = &object.kind {
            for version in series.lock().versions() {
                self.versions.insert(version.id.clone(), object.id.clone());
            }
        }
        self.objects.insert(object.id.clone(), object);
    }

    /// Remove an object and its version index entries
    pub fn remove(&mut self, id: &ObjectId) -> Option<StoredObject> {
        let object = self.objects.remove(id)?;
        self.versions.retain(|_, series| series != id);
        Some(object)
    }

    /// Record that `version` belongs to `series`
    pub fn index_version(&mut self, version: ObjectId, series: ObjectId) {
        self.versions.insert(version, series);
    }

    /// Forget a version id
    pub fn unindex_version(&mut self, version: &ObjectId) {
        self.versions.remove(version);
    }

    /// Table key of `id`: the series id for a document version, else `id`
    pub fn resolve_key(&self, id: &ObjectId) -> Option<ObjectId> {
        if self.objects.contains_key(id) {
            return Some(id.clone());
        }
        self.versions.get(id).cloned()
    }

    /// Object owning `id`, resolving version ids to their series
    pub fn get(&self, id: &ObjectId) -> Result<&StoredObject> {
        self.resolve_key(id)
            .and_then(|key| self.objects.get(&key))
            .ok_or_else(|| VellumError::object_not_found(id.as_str()))
    }

    /// Mutable object owning `id`
    pub fn get_mut(&mut self, id: &ObjectId) -> Result<&mut StoredObject> {
        let key = self
            .resolve_key(id)
            .ok_or_else(|| VellumError::object_not_found(id.as_str()))?;
        self.objects
            .get_mut(&key)
            .ok_or_else(|| VellumError::object_not_found(id.as_str()))
    }

    /// Objects filed directly in `folder`
    pub fn children<'a>(&'a self, folder: &'a ObjectId) -> impl Iterator<Item = &'a StoredObject> {
        self.objects
            .values()
            .filter(move |object| object.parent.as_ref() == Some(folder))
    }

    /// Whether any object has type `type_id`, as its own type or attached
    /// as a secondary type
    pub fn has_instances(&self, type_id: &str) -> bool {
        let attached = |ids: &[TypeId]| ids.iter().any(|id| id.as_str() == type_id);
        self.objects.values().any(|object| {
            if object.type_id.as_str() == type_id {
                return true;
            }
            match &object.kind {
                ObjectKind::Document(series) => series
                    .lock()
                    .versions()
                    .iter()
                    .any(|version| attached(&version.payload.secondary_type_ids)),
                ObjectKind::Folder(record)
                | ObjectKind::Policy(record)
                | ObjectKind::Relationship(record)
                | ObjectKind::Item(record) => attached(&record.secondary_type_ids),
            }
        })
    }

    /// Whether `policy` is applied to any object
    pub fn is_policy_applied(&self, policy: &ObjectId) -> bool {
        self.objects
            .values()
            .any(|object| object.policies.contains(policy))
    }

    /// Number of stored objects (documents count once)
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl AclGraph for ObjectTable {
    fn acl_node(&self, id: &ObjectId) -> Option<AclNode> {
        let object = self.get(id).ok()?;
        Some(AclNode {
            aces: object.acl.clone(),
            inherits: object.acl_inherited,
            parent: object.parent.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::{VersionContent, VersioningState};
    use assert_matches::assert_matches;
    use vellum_authorization::Permission;

    fn record(user: &PrincipalId) -> ObjectRecord {
        ObjectRecord {
            secondary_type_ids: Vec::new(),
            properties: PropertySet::new(),
            audit: AuditInfo::new(user),
        }
    }

    fn object(id: &str, base: BaseType, parent: Option<&str>) -> StoredObject {
        let user = PrincipalId::new("alice");
        let series_id = ObjectId::new(id);
        let kind = ObjectKind::for_base(base, record(&user), |record| {
            VersionSeries::create(
                series_id,
                VersionContent {
                    secondary_type_ids: record.secondary_type_ids,
                    properties: record.properties,
                    content: None,
                },
                VersioningState::Major,
                &user,
            )
        })
        .unwrap();
        StoredObject {
            id: ObjectId::new(id),
            type_id: TypeId::new(base.type_id()),
            parent: parent.map(ObjectId::new),
            acl: vec![Ace::new("alice", Permission::Read)],
            acl_inherited: true,
            policies: BTreeSet::new(),
            kind,
        }
    }

    #[test]
    fn test_secondary_is_not_instantiable() {
        let user = PrincipalId::new("alice");
        let result = ObjectKind::for_base(BaseType::Secondary, record(&user), |_| {
            unreachable!("secondary objects never build a series")
        });
        assert_matches!(
            result,
            Err(VellumError::InvalidArgument {
                reason: InvalidArgument::NotInstantiable { .. }
            })
        );
    }

    #[test]
    fn test_versions_resolve_to_series() {
        let mut table = ObjectTable::new();
        table.insert(object("root", BaseType::Folder, None));
        table.insert(object("doc", BaseType::Document, Some("root")));
        table.index_version(ObjectId::new("doc-v2"), ObjectId::new("doc"));

        let resolved = table.get(&ObjectId::new("doc-v2")).unwrap();
        assert_eq!(resolved.id.as_str(), "doc");
        assert_eq!(resolved.base_type(), BaseType::Document);
        assert_eq!(table.children(&ObjectId::new("root")).count(), 1);

        table.remove(&ObjectId::new("doc"));
        assert!(table.get(&ObjectId::new("doc-v2")).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_acl_node_follows_parent() {
        let mut table = ObjectTable::new();
        table.insert(object("root", BaseType::Folder, None));
        table.insert(object("child", BaseType::Item, Some("root")));
        let node = table.acl_node(&ObjectId::new("child")).unwrap();
        assert_eq!(node.parent, Some(ObjectId::new("root")));
        assert!(node.inherits);
        assert!(table.acl_node(&ObjectId::new("missing")).is_none());
    }
}
