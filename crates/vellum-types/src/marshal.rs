//! Property Marshaller
//!
//! Converts raw property bags into schema-validated [`PropertySet`]s (the write
//! path) and attaches definitions to stored raw properties (the read path).
//! Both directions resolve definitions in the primary type first and then in
//! the attached secondary types, first attached wins. A miss triggers a single
//! reload of the involved types before failing.

use std::mem::discriminant;
use std::sync::Arc;

use vellum_core::{
    property_ids, InvalidArgument, NotFound, PropertyId, Result, TypeId, VellumError,
};

use crate::coerce::coerce;
use crate::definitions::{BaseType, Cardinality, PropertyDefinition, TypeDefinition, Updatability};
use crate::registry::TypeSource;
use crate::value::{BagValue, Property, PropertyBag, PropertySet, PropertyValue};

/// A stored property before its definition is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    /// Property id; `None` for malformed input
    pub id: Option<PropertyId>,
    /// Stored values
    pub values: Vec<PropertyValue>,
}

impl RawProperty {
    /// Raw property with an id
    pub fn new(id: impl Into<PropertyId>, values: Vec<PropertyValue>) -> Self {
        Self {
            id: Some(id.into()),
            values,
        }
    }
}

/// Primary and secondary types of one marshalling call
struct TypeContext {
    primary: Arc<TypeDefinition>,
    secondaries: Vec<Arc<TypeDefinition>>,
    reloaded: bool,
}

impl TypeContext {
    fn find(&self, property_id: &str) -> Option<Arc<PropertyDefinition>> {
        self.primary
            .property_definition(property_id)
            .or_else(|| {
                self.secondaries
                    .iter()
                    .find_map(|secondary| secondary.property_definition(property_id))
            })
            .cloned()
    }

    fn describe_secondaries(&self) -> String {
        describe_secondaries(self.secondaries.iter().map(|t| t.id.as_str()))
    }
}

fn describe_secondaries<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let ids: Vec<&str> = ids.collect();
    if ids.is_empty() {
        String::new()
    } else {
        format!(" or one of the secondary types [{}]", ids.join(", "))
    }
}

/// Marshals property bags against a [`TypeSource`]
pub struct PropertyMarshaller<'a, S: TypeSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: TypeSource + ?Sized> PropertyMarshaller<'a, S> {
    /// Create a marshaller reading types from `source`
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Convert a raw bag into a property set
    ///
    /// The primary type is `explicit_type` or the bag's object-type-id entry.
    /// Secondary types are `explicit_secondaries` or the bag's
    /// secondary-object-type-ids entry. Properties whose updatability is not in
    /// `filter` are skipped.
    pub fn marshal(
        &self,
        bag: &PropertyBag,
        explicit_type: Option<&str>,
        explicit_secondaries: Option<&[TypeId]>,
        filter: Option<&[Updatability]>,
    ) -> Result<PropertySet> {
        let type_id = match explicit_type {
            Some(type_id) => type_id.to_string(),
            None => bag
                .get(property_ids::OBJECT_TYPE_ID)
                .and_then(type_id_from_bag)
                .ok_or_else(|| VellumError::invalid(InvalidArgument::MissingTypeId))?,
        };
        let primary = self.resolve_type(&type_id)?;

        let secondary_ids = match explicit_secondaries {
            Some(ids) => ids.to_vec(),
            None => match bag.get(property_ids::SECONDARY_OBJECT_TYPE_IDS) {
                Some(value) => secondary_ids_from_bag(value)?,
                None => Vec::new(),
            },
        };
        let secondaries = self.resolve_secondaries(&secondary_ids)?;

        let mut context = TypeContext {
            primary,
            secondaries,
            reloaded: false,
        };

        let mut result = PropertySet::new();
        for (key, value) in bag {
            let unwrapped;
            let value = match value {
                BagValue::Property(property) => {
                    if property.id().as_str() != key {
                        return Err(VellumError::invalid(InvalidArgument::PropertyIdMismatch {
                            key: key.clone(),
                            property: property.id().to_string(),
                        }));
                    }
                    unwrapped = unwrap_property(property);
                    &unwrapped
                }
                other => other,
            };

            let definition = self.definition(&mut context, key)?;
            if let Some(allowed) = filter {
                if !allowed.contains(&definition.updatability) {
                    tracing::trace!(property = %key, "Skipping property outside updatability filter");
                    continue;
                }
            }

            let value = if key == property_ids::OBJECT_TYPE_ID {
                normalize_type_key(value)
            } else {
                value
            };
            let values = marshal_values(&definition, value)?;
            result.insert(Property::new(definition, values)?);
        }
        Ok(result)
    }

    /// Attach definitions to stored raw properties
    pub fn convert(
        &self,
        object_type: &str,
        secondary_type_ids: &[TypeId],
        raw: Vec<RawProperty>,
    ) -> Result<PropertySet> {
        let primary = self.resolve_type(object_type)?;
        let secondaries = secondary_type_ids
            .iter()
            .map(|id| self.resolve_type(id.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let mut context = TypeContext {
            primary,
            secondaries,
            reloaded: false,
        };

        let mut result = PropertySet::new();
        for property in raw {
            let Some(id) = property.id else {
                return Err(VellumError::invalid(InvalidArgument::AnonymousProperty {
                    type_id: object_type.to_string(),
                    secondary: describe_secondaries(secondary_type_ids.iter().map(TypeId::as_str)),
                }));
            };
            let definition = self.definition(&mut context, id.as_str())?;
            result.insert(Property::new(definition, property.values)?);
        }
        Ok(result)
    }

    fn resolve_type(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        self.source
            .type_definition(type_id)
            .ok_or_else(|| VellumError::unknown_type(type_id))
    }

    fn resolve_secondaries(&self, ids: &[TypeId]) -> Result<Vec<Arc<TypeDefinition>>> {
        let mut resolved: Vec<Arc<TypeDefinition>> = Vec::with_capacity(ids.len());
        for id in ids {
            if resolved.iter().any(|t| t.id == *id) {
                continue;
            }
            let definition = self.resolve_type(id.as_str())?;
            if definition.base_type != BaseType::Secondary {
                return Err(VellumError::invalid(InvalidArgument::NotASecondaryType {
                    type_id: id.to_string(),
                }));
            }
            resolved.push(definition);
        }
        Ok(resolved)
    }

    fn definition(
        &self,
        context: &mut TypeContext,
        property_id: &str,
    ) -> Result<Arc<PropertyDefinition>> {
        if let Some(found) = context.find(property_id) {
            return Ok(found);
        }

        if !context.reloaded {
            context.reloaded = true;
            let mut ids: Vec<&str> = vec![context.primary.id.as_str()];
            ids.extend(context.secondaries.iter().map(|t| t.id.as_str()));
            tracing::warn!(
                property = property_id,
                type_id = %context.primary.id,
                "Property not found in cached types, reloading"
            );
            self.source.reload(&ids);

            let primary = self.resolve_type(context.primary.id.as_str())?;
            let secondaries = context
                .secondaries
                .iter()
                .map(|t| self.resolve_type(t.id.as_str()))
                .collect::<Result<Vec<_>>>()?;
            context.primary = primary;
            context.secondaries = secondaries;

            if let Some(found) = context.find(property_id) {
                return Ok(found);
            }
        }

        Err(VellumError::not_found(NotFound::PropertyNotDefinedForType {
            property: property_id.to_string(),
            type_id: context.primary.id.to_string(),
            secondary: context.describe_secondaries(),
        }))
    }
}

fn type_id_from_bag(value: &BagValue) -> Option<String> {
    match value {
        BagValue::Text(id) => Some(id.clone()),
        BagValue::List(items) => match items.as_slice() {
            [BagValue::Text(id)] => Some(id.clone()),
            _ => None,
        },
        BagValue::Property(property) => property
            .first_value()
            .and_then(PropertyValue::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn normalize_type_key(value: &BagValue) -> &BagValue {
    match value {
        BagValue::List(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn secondary_ids_from_bag(value: &BagValue) -> Result<Vec<TypeId>> {
    let entries: Vec<BagValue> = match value {
        BagValue::Null => return Ok(Vec::new()),
        BagValue::List(items) => items.clone(),
        BagValue::Property(property) => unwrap_values(property.values()),
        single => vec![single.clone()],
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            BagValue::Text(id) => Ok(TypeId::new(id)),
            other => Err(VellumError::invalid(
                InvalidArgument::InvalidSecondaryTypeEntry {
                    entry: format!("{other:?}"),
                },
            )),
        })
        .collect()
}

fn unwrap_values(values: &[PropertyValue]) -> Vec<BagValue> {
    values.iter().cloned().map(BagValue::from).collect()
}

/// A resolved property becomes its single value or its value list
fn unwrap_property(property: &Property) -> BagValue {
    match property.definition().cardinality {
        Cardinality::Single => property
            .first_value()
            .cloned()
            .map_or(BagValue::Null, BagValue::from),
        Cardinality::Multi => BagValue::List(unwrap_values(property.values())),
    }
}

fn marshal_values(definition: &PropertyDefinition, value: &BagValue) -> Result<Vec<PropertyValue>> {
    let property = || definition.id.to_string();
    match value {
        BagValue::Null => Ok(Vec::new()),
        BagValue::List(items) => {
            if !definition.is_multi() {
                return Err(VellumError::invalid(InvalidArgument::NotMultiValued {
                    property: property(),
                }));
            }
            if items.iter().any(BagValue::is_null) {
                return Err(VellumError::invalid(InvalidArgument::NullValueNotAllowed {
                    property: property(),
                }));
            }
            if let Some(first) = items.first() {
                let kind = discriminant(first);
                if items.iter().any(|item| discriminant(item) != kind) {
                    return Err(VellumError::invalid(InvalidArgument::InhomogeneousValues {
                        property: property(),
                    }));
                }
            }
            items.iter().map(|item| coerce(definition, item)).collect()
        }
        scalar => {
            if definition.is_multi() {
                return Err(VellumError::invalid(InvalidArgument::NotSingleValued {
                    property: property(),
                }));
            }
            Ok(vec![coerce(definition, scalar)?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Datatype;
    use crate::registry::{CachedTypeSource, TypeRegistry};
    use assert_matches::assert_matches;
    use num_bigint::BigInt;
    use vellum_core::ProtocolVersion;

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new(ProtocolVersion::V1_1);
        registry
            .register(
                TypeDefinition::new("doc", "cmis:document", BaseType::Document)
                    .with_property(PropertyDefinition::single("intProp", Datatype::Integer))
                    .with_property(PropertyDefinition::multi("tags", Datatype::String))
                    .with_property(
                        PropertyDefinition::single("locked", Datatype::Boolean)
                            .with_updatability(Updatability::ReadOnly),
                    ),
            )
            .unwrap();
        registry
            .register(
                TypeDefinition::new("sec:a", "cmis:secondary", BaseType::Secondary)
                    .with_property(PropertyDefinition::single("shared", Datatype::String)),
            )
            .unwrap();
        registry
            .register(
                TypeDefinition::new("sec:b", "cmis:secondary", BaseType::Secondary)
                    .with_property(PropertyDefinition::single("shared", Datatype::Integer)),
            )
            .unwrap();
        registry
    }

    fn bag(entries: Vec<(&str, BagValue)>) -> PropertyBag {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_narrow_integer_widened() {
        let registry = registry();
        let marshaller = PropertyMarshaller::new(&registry);
        let props = marshaller
            .marshal(
                &bag(vec![("cmis:objectTypeId", "doc".into()), ("intProp", 42i16.into())]),
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(
            props.get("intProp").unwrap().values(),
            &[PropertyValue::Integer(BigInt::from(42))]
        );
    }

    #[test]
    fn test_missing_type() {
        let registry = registry();
        let err = PropertyMarshaller::new(&registry)
            .marshal(&bag(vec![("cmis:name", "x".into())]), None, None, None)
            .unwrap_err();
        assert_matches!(
            err,
            VellumError::InvalidArgument {
                reason: InvalidArgument::MissingTypeId
            }
        );
    }

    #[test]
    fn test_type_key_as_one_element_list() {
        let registry = registry();
        let props = PropertyMarshaller::new(&registry)
            .marshal(
                &bag(vec![("cmis:objectTypeId", vec!["doc"].into())]),
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(props.text("cmis:objectTypeId"), Some("doc"));
    }

    #[test]
    fn test_cardinality_errors() {
        let registry = registry();
        let marshaller = PropertyMarshaller::new(&registry);
        assert_matches!(
            marshaller.marshal(&bag(vec![("intProp", vec![1i32, 2].into())]), Some("doc"), None, None),
            Err(VellumError::InvalidArgument {
                reason: InvalidArgument::NotMultiValued { .. }
            })
        );
        assert_matches!(
            marshaller.marshal(&bag(vec![("tags", "solo".into())]), Some("doc"), None, None),
            Err(VellumError::InvalidArgument {
                reason: InvalidArgument::NotSingleValued { .. }
            })
        );
        assert_matches!(
            marshaller.marshal(
                &bag(vec![("tags", BagValue::List(vec!["a".into(), 1i32.into()]))]),
                Some("doc"),
                None,
                None
            ),
            Err(VellumError::InvalidArgument {
                reason: InvalidArgument::InhomogeneousValues { .. }
            })
        );
        assert_matches!(
            marshaller.marshal(
                &bag(vec![("tags", BagValue::List(vec!["a".into(), BagValue::Null]))]),
                Some("doc"),
                None,
                None
            ),
            Err(VellumError::InvalidArgument {
                reason: InvalidArgument::NullValueNotAllowed { .. }
            })
        );
    }

    #[test]
    fn test_null_clears_value() {
        let registry = registry();
        let props = PropertyMarshaller::new(&registry)
            .marshal(&bag(vec![("intProp", BagValue::Null)]), Some("doc"), None, None)
            .unwrap();
        assert!(!props.get("intProp").unwrap().is_set());
    }

    #[test]
    fn test_filter_skips_silently() {
        let registry = registry();
        let props = PropertyMarshaller::new(&registry)
            .marshal(
                &bag(vec![("locked", true.into()), ("intProp", 1u8.into())]),
                Some("doc"),
                None,
                Some(Updatability::UPDATE),
            )
            .unwrap();
        assert!(!props.contains("locked"));
        assert!(props.contains("intProp"));
    }

    #[test]
    fn test_resolved_property_unwrapped_and_checked() {
        let registry = registry();
        let marshaller = PropertyMarshaller::new(&registry);
        let definition = registry
            .resolve("doc")
            .unwrap()
            .property_definition("intProp")
            .unwrap()
            .clone();
        let resolved =
            Property::single(definition, PropertyValue::Integer(BigInt::from(7))).unwrap();

        let props = marshaller
            .marshal(
                &bag(vec![("intProp", resolved.clone().into())]),
                Some("doc"),
                None,
                None,
            )
            .unwrap();
        assert_eq!(props.get("intProp"), Some(&resolved));

        assert_matches!(
            marshaller.marshal(&bag(vec![("other", resolved.into())]), Some("doc"), None, None),
            Err(VellumError::InvalidArgument {
                reason: InvalidArgument::PropertyIdMismatch { .. }
            })
        );
    }

    #[test]
    fn test_secondary_must_be_secondary() {
        let registry = registry();
        let err = PropertyMarshaller::new(&registry)
            .marshal(
                &bag(vec![("cmis:secondaryObjectTypeIds", vec!["doc"].into())]),
                Some("doc"),
                None,
                None,
            )
            .unwrap_err();
        assert_matches!(
            err,
            VellumError::InvalidArgument {
                reason: InvalidArgument::NotASecondaryType { .. }
            }
        );
    }

    #[test]
    fn test_first_attached_secondary_wins() {
        let registry = registry();
        let marshaller = PropertyMarshaller::new(&registry);

        let a_first = [TypeId::new("sec:a"), TypeId::new("sec:b")];
        let props = marshaller
            .marshal(&bag(vec![("shared", "text".into())]), Some("doc"), Some(&a_first), None)
            .unwrap();
        assert_eq!(
            props.get("shared").unwrap().definition().datatype,
            Datatype::String
        );

        let b_first = [TypeId::new("sec:b"), TypeId::new("sec:a")];
        let props = marshaller
            .marshal(&bag(vec![("shared", 5i32.into())]), Some("doc"), Some(&b_first), None)
            .unwrap();
        assert_eq!(
            props.get("shared").unwrap().definition().datatype,
            Datatype::Integer
        );
    }

    #[test]
    fn test_unknown_property_names_secondaries() {
        let registry = registry();
        let err = PropertyMarshaller::new(&registry)
            .marshal(
                &bag(vec![("nope", "x".into())]),
                Some("doc"),
                Some(&[TypeId::new("sec:a")]),
                None,
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Not found: property 'nope' is not valid for type 'doc' or one of the secondary types [sec:a]"
        );
    }

    #[test]
    fn test_stale_cache_recovers_with_one_reload() {
        let registry = Arc::new(registry());
        let cache = CachedTypeSource::new(registry.clone());
        assert!(cache.type_definition("doc").is_some());

        let mut updated = (*registry.resolve("doc").unwrap()).clone();
        updated = updated.with_property(PropertyDefinition::single("fresh", Datatype::String));
        registry.update_type(updated).unwrap();

        let props = PropertyMarshaller::new(&cache)
            .marshal(&bag(vec![("fresh", "yes".into())]), Some("doc"), None, None)
            .unwrap();
        assert_eq!(props.text("fresh"), Some("yes"));
    }

    #[test]
    fn test_convert_rejects_anonymous() {
        let registry = registry();
        let err = PropertyMarshaller::new(&registry)
            .convert(
                "doc",
                &[TypeId::new("sec:a")],
                vec![RawProperty {
                    id: None,
                    values: vec![],
                }],
            )
            .unwrap_err();
        assert!(err.to_string().contains("'doc' or one of the secondary types [sec:a]"));
    }

    #[test]
    fn test_convert_attaches_definitions() {
        let registry = registry();
        let props = PropertyMarshaller::new(&registry)
            .convert(
                "doc",
                &[],
                vec![RawProperty::new(
                    "intProp",
                    vec![PropertyValue::Integer(BigInt::from(3))],
                )],
            )
            .unwrap();
        let property = props.get("intProp").unwrap();
        assert_eq!(property.definition().datatype, Datatype::Integer);
    }
}
