//! Type Registry
//!
//! Readers work against an immutable [`TypeSnapshot`]. Every mutation builds a
//! new snapshot and swaps it in under the write lock, so a reader never sees a
//! partially updated type.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use vellum_core::{
    ConstraintViolation, InvalidArgument, ProtocolVersion, RepositoryConfig, Result, TypeId,
    VellumError,
};

use crate::builtin::BaseTypes;
use crate::definitions::{PropertyDefinition, TypeDefinition};
use crate::validation::validate_type_definition;

/// Read access to type definitions
///
/// Implemented by the registry itself and by caching views of it. `reload`
/// refreshes whatever the implementation may hold stale.
pub trait TypeSource {
    /// Definition of `type_id`, if known
    fn type_definition(&self, type_id: &str) -> Option<Arc<TypeDefinition>>;

    /// Refresh the given types from the authoritative registry
    fn reload(&self, type_ids: &[&str]);
}

/// Immutable view of all registered types
#[derive(Debug, Clone, Default)]
pub struct TypeSnapshot {
    types: IndexMap<TypeId, Arc<TypeDefinition>>,
}

impl TypeSnapshot {
    /// Look up a type
    pub fn get(&self, type_id: &str) -> Option<&Arc<TypeDefinition>> {
        self.types.get(type_id)
    }

    /// Whether a type is registered
    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDefinition>> {
        self.types.values()
    }

    /// Direct subtypes of `type_id`, in registration order
    pub fn children(&self, type_id: &str) -> Vec<Arc<TypeDefinition>> {
        self.types
            .values()
            .filter(|t| t.parent_id.as_ref().is_some_and(|p| p.as_str() == type_id))
            .cloned()
            .collect()
    }
}

/// Catalog of type definitions
#[derive(Debug)]
pub struct TypeRegistry {
    protocol_version: ProtocolVersion,
    snapshot: RwLock<Arc<TypeSnapshot>>,
}

impl TypeRegistry {
    /// Create a registry holding the base types of `protocol_version`
    pub fn new(protocol_version: ProtocolVersion) -> Self {
        let mut types = IndexMap::new();
        for definition in BaseTypes::standard(protocol_version) {
            types.insert(definition.id.clone(), Arc::new(definition));
        }
        Self {
            protocol_version,
            snapshot: RwLock::new(Arc::new(TypeSnapshot { types })),
        }
    }

    /// Create a registry for a configured repository
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(config.protocol_version)
    }

    /// Protocol version the registry was built for
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<TypeSnapshot> {
        self.snapshot.read().clone()
    }

    /// Look up a type
    pub fn get(&self, type_id: &str) -> Option<Arc<TypeDefinition>> {
        self.snapshot.read().get(type_id).cloned()
    }

    /// Look up a type, failing with `UnknownType`
    pub fn resolve(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        self.get(type_id)
            .ok_or_else(|| VellumError::unknown_type(type_id))
    }

    /// Find a property definition in the primary type, then in each secondary
    /// type in the order given
    ///
    /// Returns `Ok(None)` when no type defines the property.
    pub fn property_definition(
        &self,
        type_id: &str,
        property_id: &str,
        secondary_type_ids: &[TypeId],
    ) -> Result<Option<Arc<PropertyDefinition>>> {
        let snapshot = self.snapshot();
        let primary = snapshot
            .get(type_id)
            .ok_or_else(|| VellumError::unknown_type(type_id))?;
        if let Some(found) = primary.property_definition(property_id) {
            return Ok(Some(found.clone()));
        }
        for secondary_id in secondary_type_ids {
            let secondary = snapshot
                .get(secondary_id.as_str())
                .ok_or_else(|| VellumError::unknown_type(secondary_id.as_str()))?;
            if let Some(found) = secondary.property_definition(property_id) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(None)
    }

    /// Direct subtypes of `type_id`
    pub fn children(&self, type_id: &str) -> Result<Vec<Arc<TypeDefinition>>> {
        let snapshot = self.snapshot();
        if !snapshot.contains(type_id) {
            return Err(VellumError::unknown_type(type_id));
        }
        Ok(snapshot.children(type_id))
    }

    /// Subtypes of `type_id` in pre-order, down to `depth` levels (`None` for all)
    pub fn descendants(
        &self,
        type_id: &str,
        depth: Option<usize>,
    ) -> Result<Vec<Arc<TypeDefinition>>> {
        let snapshot = self.snapshot();
        if !snapshot.contains(type_id) {
            return Err(VellumError::unknown_type(type_id));
        }
        let mut result = Vec::new();
        collect_descendants(&snapshot, type_id, 1, depth, &mut result);
        Ok(result)
    }

    /// Register a new subtype
    ///
    /// Only the definition's own (non-inherited) properties are taken; the
    /// parent's definitions are copied in front of them.
    pub fn register(&self, definition: TypeDefinition) -> Result<Arc<TypeDefinition>> {
        let mut guard = self.snapshot.write();
        let type_id = definition.id.to_string();

        if guard.contains(&type_id) {
            return Err(VellumError::constraint(ConstraintViolation::DuplicateType {
                type_id,
            }));
        }
        let parent_id = definition.parent_id.clone().ok_or_else(|| {
            VellumError::invalid(InvalidArgument::InvalidTypeDefinition {
                type_id: type_id.clone(),
                message: "a parent type is required".to_string(),
            })
        })?;
        let parent = guard.get(parent_id.as_str()).cloned().ok_or_else(|| {
            VellumError::invalid(InvalidArgument::DanglingParent {
                type_id: type_id.clone(),
                parent: parent_id.to_string(),
            })
        })?;
        if self.protocol_version.supports_type_mutability()
            && !parent.type_mutability.is_some_and(|m| m.can_create)
        {
            return Err(VellumError::constraint(ConstraintViolation::TypeNotMutable {
                type_id: parent_id.to_string(),
                operation: "creating subtypes".to_string(),
            }));
        }

        let derived = Arc::new(self.derive(definition, &parent)?);
        let mut next = (**guard).clone();
        next.types.insert(derived.id.clone(), derived.clone());
        *guard = Arc::new(next);

        tracing::debug!(
            type_id = %derived.id,
            parent = %parent_id,
            properties = derived.property_definitions.len(),
            "Registered type"
        );
        Ok(derived)
    }

    /// Replace a type with a backward-compatible update
    ///
    /// Existing properties may not be removed or change datatype or
    /// cardinality, and added properties may not be required. Subtypes are
    /// re-derived so they see the new inherited definitions.
    pub fn update_type(&self, definition: TypeDefinition) -> Result<Arc<TypeDefinition>> {
        if !self.protocol_version.supports_type_mutability() {
            return Err(VellumError::constraint(
                ConstraintViolation::UnsupportedProtocolVersion {
                    feature: "type mutability".to_string(),
                    required: ProtocolVersion::V1_1.to_string(),
                },
            ));
        }

        let mut guard = self.snapshot.write();
        let type_id = definition.id.to_string();
        let existing = guard
            .get(&type_id)
            .cloned()
            .ok_or_else(|| VellumError::unknown_type(type_id.as_str()))?;

        if !existing.type_mutability.is_some_and(|m| m.can_update) {
            return Err(VellumError::constraint(ConstraintViolation::TypeNotMutable {
                type_id,
                operation: "updates".to_string(),
            }));
        }
        check_compatible(&existing, &definition)?;

        let parent_id = existing
            .parent_id
            .clone()
            .ok_or_else(|| VellumError::internal(format!("mutable type '{type_id}' has no parent")))?;
        let parent = guard
            .get(parent_id.as_str())
            .cloned()
            .ok_or_else(|| VellumError::unknown_type(parent_id.as_str()))?;

        let mut next = (**guard).clone();
        let updated = Arc::new(self.derive(definition, &parent)?);
        next.types.insert(updated.id.clone(), updated.clone());

        let mut pending: VecDeque<Arc<TypeDefinition>> = VecDeque::from([updated.clone()]);
        let mut rederived = 0usize;
        while let Some(parent) = pending.pop_front() {
            for child in next.children(parent.id.as_str()) {
                let child = Arc::new(self.derive((*child).clone(), &parent)?);
                next.types.insert(child.id.clone(), child.clone());
                pending.push_back(child);
                rederived += 1;
            }
        }
        *guard = Arc::new(next);

        tracing::debug!(type_id = %updated.id, subtypes = rederived, "Updated type");
        Ok(updated)
    }

    /// Remove a type
    ///
    /// Base types, types with subtypes and types whose mutability forbids it
    /// cannot be deleted. Callers check for remaining instances first.
    pub fn delete_type(&self, type_id: &str) -> Result<()> {
        let mut guard = self.snapshot.write();
        let existing = guard
            .get(type_id)
            .cloned()
            .ok_or_else(|| VellumError::unknown_type(type_id))?;

        if existing.is_base()
            || (self.protocol_version.supports_type_mutability()
                && !existing.type_mutability.is_some_and(|m| m.can_delete))
        {
            return Err(VellumError::constraint(ConstraintViolation::TypeNotMutable {
                type_id: type_id.to_string(),
                operation: "deletion".to_string(),
            }));
        }
        let children = guard.children(type_id);
        if !children.is_empty() {
            return Err(VellumError::constraint(ConstraintViolation::TypeInUse {
                type_id: type_id.to_string(),
                message: format!("{} subtype(s) remain", children.len()),
            }));
        }

        let mut next = (**guard).clone();
        next.types.shift_remove(type_id);
        *guard = Arc::new(next);

        tracing::debug!(type_id, "Deleted type");
        Ok(())
    }

    /// Validate `definition` against `parent` and copy the parent's properties in
    fn derive(&self, definition: TypeDefinition, parent: &TypeDefinition) -> Result<TypeDefinition> {
        let mut own = definition;
        own.property_definitions.retain(|_, p| !p.inherited);
        validate_type_definition(&own, parent)?;

        let mut properties = IndexMap::with_capacity(
            parent.property_definitions.len() + own.property_definitions.len(),
        );
        for (id, inherited) in &parent.property_definitions {
            properties.insert(id.clone(), Arc::new(inherited.as_inherited()));
        }
        properties.extend(own.property_definitions);

        Ok(TypeDefinition {
            property_definitions: properties,
            type_mutability: if self.protocol_version.supports_type_mutability() {
                own.type_mutability
            } else {
                None
            },
            ..own
        })
    }
}

impl TypeSource for TypeRegistry {
    fn type_definition(&self, type_id: &str) -> Option<Arc<TypeDefinition>> {
        self.get(type_id)
    }

    fn reload(&self, _type_ids: &[&str]) {}
}

fn collect_descendants(
    snapshot: &TypeSnapshot,
    type_id: &str,
    level: usize,
    depth: Option<usize>,
    out: &mut Vec<Arc<TypeDefinition>>,
) {
    if depth.is_some_and(|max| level > max) {
        return;
    }
    for child in snapshot.children(type_id) {
        let child_id = child.id.to_string();
        out.push(child);
        collect_descendants(snapshot, &child_id, level + 1, depth, out);
    }
}

fn check_compatible(existing: &TypeDefinition, update: &TypeDefinition) -> Result<()> {
    let incompatible = |message: String| {
        VellumError::constraint(ConstraintViolation::IncompatibleTypeUpdate {
            type_id: existing.id.to_string(),
            message,
        })
    };

    if update.base_type != existing.base_type || update.parent_id != existing.parent_id {
        return Err(incompatible("base type and parent cannot change".to_string()));
    }
    for old in existing.own_properties() {
        let Some(new) = update.property_definition(old.id.as_str()) else {
            return Err(incompatible(format!("property '{}' cannot be removed", old.id)));
        };
        if new.datatype != old.datatype || new.cardinality != old.cardinality {
            return Err(incompatible(format!(
                "property '{}' cannot change datatype or cardinality",
                old.id
            )));
        }
    }
    for new in update.own_properties() {
        if existing.property_definition(new.id.as_str()).is_none() && new.required {
            return Err(incompatible(format!(
                "added property '{}' cannot be required",
                new.id
            )));
        }
    }
    Ok(())
}

/// Caching view over a registry
///
/// Entries are fetched on first use and then served from the cache, even
/// after the registry has changed, until [`TypeSource::reload`] refreshes them.
#[derive(Debug)]
pub struct CachedTypeSource {
    registry: Arc<TypeRegistry>,
    cache: RwLock<HashMap<TypeId, Arc<TypeDefinition>>>,
}

impl CachedTypeSource {
    /// Create an empty cache over `registry`
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The registry behind the cache
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.cache.write().clear();
    }
}

impl TypeSource for CachedTypeSource {
    fn type_definition(&self, type_id: &str) -> Option<Arc<TypeDefinition>> {
        if let Some(cached) = self.cache.read().get(type_id) {
            return Some(cached.clone());
        }
        let fetched = self.registry.get(type_id)?;
        self.cache
            .write()
            .insert(fetched.id.clone(), fetched.clone());
        Some(fetched)
    }

    fn reload(&self, type_ids: &[&str]) {
        let mut cache = self.cache.write();
        for type_id in type_ids {
            match self.registry.get(type_id) {
                Some(fresh) => {
                    cache.insert(fresh.id.clone(), fresh);
                }
                None => {
                    cache.remove(*type_id);
                }
            }
        }
        tracing::debug!(types = ?type_ids, "Reloaded cached type definitions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{BaseType, Datatype, TypeMutability};
    use assert_matches::assert_matches;
    use vellum_core::NotFound;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(ProtocolVersion::V1_1)
    }

    fn doc_type(id: &str) -> TypeDefinition {
        TypeDefinition::new(id, "cmis:document", BaseType::Document)
    }

    #[test]
    fn test_register_inherits_parent_properties_first() {
        let registry = registry();
        let registered = registry
            .register(
                doc_type("test:doc")
                    .with_property(PropertyDefinition::single("test:title", Datatype::String)),
            )
            .unwrap();

        let first = registered.property_definitions.values().next().unwrap();
        assert_eq!(first.id.as_str(), "cmis:name");
        assert!(first.inherited);
        let own = registered.property_definition("test:title").unwrap();
        assert!(!own.inherited);
    }

    #[test]
    fn test_duplicate_and_dangling() {
        let registry = registry();
        registry.register(doc_type("test:doc")).unwrap();

        assert_matches!(
            registry.register(doc_type("test:doc")),
            Err(VellumError::Constraint {
                reason: ConstraintViolation::DuplicateType { .. }
            })
        );
        assert_matches!(
            registry.register(TypeDefinition::new("test:orphan", "test:missing", BaseType::Document)),
            Err(VellumError::InvalidArgument {
                reason: InvalidArgument::DanglingParent { .. }
            })
        );
    }

    #[test]
    fn test_own_property_cannot_shadow_inherited() {
        let registry = registry();
        let err = registry
            .register(
                doc_type("test:doc")
                    .with_property(PropertyDefinition::single("cmis:name", Datatype::Integer)),
            )
            .unwrap_err();
        assert_matches!(
            err,
            VellumError::InvalidArgument {
                reason: InvalidArgument::InvalidTypeDefinition { .. }
            }
        );
    }

    #[test]
    fn test_resolve_unknown() {
        assert_matches!(
            registry().resolve("test:nope"),
            Err(VellumError::NotFound {
                reason: NotFound::UnknownType { .. }
            })
        );
    }

    #[test]
    fn test_property_lookup_order() {
        let registry = registry();
        registry
            .register(
                doc_type("test:doc")
                    .with_property(PropertyDefinition::single("test:label", Datatype::Boolean)),
            )
            .unwrap();
        for (id, datatype) in [("test:text", Datatype::String), ("test:number", Datatype::Integer)] {
            registry
                .register(
                    TypeDefinition::new(id, "cmis:secondary", BaseType::Secondary)
                        .with_property(PropertyDefinition::single("test:label", datatype))
                        .with_property(PropertyDefinition::single("test:shared", datatype)),
                )
                .unwrap();
        }
        let attached = [TypeId::new("test:text"), TypeId::new("test:number")];

        // primary type before any secondary
        let label = registry
            .property_definition("test:doc", "test:label", &attached)
            .unwrap()
            .unwrap();
        assert_eq!(label.datatype, Datatype::Boolean);

        // first attached secondary wins
        let shared = registry
            .property_definition("test:doc", "test:shared", &attached)
            .unwrap()
            .unwrap();
        assert_eq!(shared.datatype, Datatype::String);
        let reversed = [TypeId::new("test:number"), TypeId::new("test:text")];
        let shared = registry
            .property_definition("test:doc", "test:shared", &reversed)
            .unwrap()
            .unwrap();
        assert_eq!(shared.datatype, Datatype::Integer);

        assert!(registry
            .property_definition("test:doc", "test:absent", &attached)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_property_lookup_unknown_types() {
        let registry = registry();
        registry.register(doc_type("test:doc")).unwrap();

        assert_matches!(
            registry.property_definition("test:doc", "test:absent", &[TypeId::new("test:gone")]),
            Err(VellumError::NotFound {
                reason: NotFound::UnknownType { .. }
            })
        );
        assert_matches!(
            registry.property_definition("test:nope", "cmis:name", &[]),
            Err(VellumError::NotFound {
                reason: NotFound::UnknownType { .. }
            })
        );
    }

    #[test]
    fn test_update_rederives_subtypes() {
        let registry = registry();
        registry.register(doc_type("test:parent")).unwrap();
        registry
            .register(TypeDefinition::new("test:child", "test:parent", BaseType::Document))
            .unwrap();

        let before = registry.snapshot();
        registry
            .update_type(
                doc_type("test:parent")
                    .with_property(PropertyDefinition::single("test:extra", Datatype::Boolean)),
            )
            .unwrap();

        let child = registry.resolve("test:child").unwrap();
        assert!(child.property_definition("test:extra").unwrap().inherited);
        // readers holding the old snapshot keep the old definition
        assert!(before
            .get("test:child")
            .unwrap()
            .property_definition("test:extra")
            .is_none());
    }

    #[test]
    fn test_incompatible_updates() {
        let registry = registry();
        registry
            .register(
                doc_type("test:doc")
                    .with_property(PropertyDefinition::single("test:n", Datatype::Integer)),
            )
            .unwrap();

        let retyped =
            doc_type("test:doc").with_property(PropertyDefinition::single("test:n", Datatype::String));
        assert_matches!(
            registry.update_type(retyped),
            Err(VellumError::Constraint {
                reason: ConstraintViolation::IncompatibleTypeUpdate { .. }
            })
        );

        let required_added = doc_type("test:doc")
            .with_property(PropertyDefinition::single("test:n", Datatype::Integer))
            .with_property(PropertyDefinition::single("test:r", Datatype::Integer).required());
        assert!(registry.update_type(required_added).is_err());

        assert!(registry.update_type(doc_type("test:doc")).is_err());
    }

    #[test]
    fn test_delete_rules() {
        let registry = registry();
        registry.register(doc_type("test:parent")).unwrap();
        registry
            .register(TypeDefinition::new("test:child", "test:parent", BaseType::Document))
            .unwrap();
        registry
            .register(doc_type("test:fixed").with_mutability(TypeMutability {
                can_create: true,
                can_update: false,
                can_delete: false,
            }))
            .unwrap();

        assert!(registry.delete_type("cmis:document").is_err());
        assert_matches!(
            registry.delete_type("test:parent"),
            Err(VellumError::Constraint {
                reason: ConstraintViolation::TypeInUse { .. }
            })
        );
        assert!(registry.delete_type("test:fixed").is_err());
        registry.delete_type("test:child").unwrap();
        registry.delete_type("test:parent").unwrap();
        assert!(registry.get("test:parent").is_none());
    }

    #[test]
    fn test_children_and_descendants() {
        let registry = registry();
        registry.register(doc_type("test:a")).unwrap();
        registry
            .register(TypeDefinition::new("test:a1", "test:a", BaseType::Document))
            .unwrap();
        registry.register(doc_type("test:b")).unwrap();

        let children: Vec<_> = registry
            .children("cmis:document")
            .unwrap()
            .iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(children, vec!["test:a", "test:b"]);

        let all = registry.descendants("cmis:document", None).unwrap();
        assert_eq!(all.len(), 3);
        let shallow = registry.descendants("cmis:document", Some(1)).unwrap();
        assert_eq!(shallow.len(), 2);
    }

    #[test]
    fn test_type_mutability_requires_1_1() {
        let registry = TypeRegistry::new(ProtocolVersion::V1_0);
        registry.register(doc_type("test:doc")).unwrap();
        assert!(registry.resolve("test:doc").unwrap().type_mutability.is_none());
        assert_matches!(
            registry.update_type(doc_type("test:doc")),
            Err(VellumError::Constraint {
                reason: ConstraintViolation::UnsupportedProtocolVersion { .. }
            })
        );
    }

    #[test]
    fn test_cached_source_serves_stale_until_reload() {
        let registry = Arc::new(registry());
        registry.register(doc_type("test:doc")).unwrap();
        let cache = CachedTypeSource::new(registry.clone());
        assert!(cache.type_definition("test:doc").is_some());

        registry
            .update_type(
                doc_type("test:doc")
                    .with_property(PropertyDefinition::single("test:new", Datatype::String)),
            )
            .unwrap();
        let stale = cache.type_definition("test:doc").unwrap();
        assert!(stale.property_definition("test:new").is_none());

        cache.reload(&["test:doc"]);
        let fresh = cache.type_definition("test:doc").unwrap();
        assert!(fresh.property_definition("test:new").is_some());
    }
}
