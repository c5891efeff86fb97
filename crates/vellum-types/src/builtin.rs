//! Base type bootstrap
//!
//! The fixed root types and their protocol properties. Built once per
//! repository from its protocol version and handed to the registry.

use vellum_core::{property_ids as ids, ProtocolVersion};

use crate::definitions::{
    BaseType, Datatype, PropertyDefinition, TypeDefinition, TypeMutability, Updatability,
};

/// Builder for the fixed root types
pub struct BaseTypes;

fn read_only(id: &str, datatype: Datatype) -> PropertyDefinition {
    PropertyDefinition::single(id, datatype).with_updatability(Updatability::ReadOnly)
}

fn common_properties(version: ProtocolVersion) -> Vec<PropertyDefinition> {
    let mut properties = vec![
        PropertyDefinition::single(ids::NAME, Datatype::String).required(),
        PropertyDefinition::single(ids::DESCRIPTION, Datatype::String),
        read_only(ids::OBJECT_ID, Datatype::Id).required(),
        read_only(ids::BASE_TYPE_ID, Datatype::Id).required(),
        PropertyDefinition::single(ids::OBJECT_TYPE_ID, Datatype::Id)
            .with_updatability(Updatability::OnCreate)
            .required(),
    ];
    if version.supports_secondary_types() {
        properties.push(PropertyDefinition::multi(
            ids::SECONDARY_OBJECT_TYPE_IDS,
            Datatype::Id,
        ));
    }
    properties.extend([
        read_only(ids::CREATED_BY, Datatype::String),
        read_only(ids::CREATION_DATE, Datatype::DateTime),
        read_only(ids::LAST_MODIFIED_BY, Datatype::String),
        read_only(ids::LAST_MODIFICATION_DATE, Datatype::DateTime),
        read_only(ids::CHANGE_TOKEN, Datatype::String),
    ]);
    properties
}

fn document_properties(version: ProtocolVersion) -> Vec<PropertyDefinition> {
    let mut properties = vec![
        read_only(ids::IS_IMMUTABLE, Datatype::Boolean),
        read_only(ids::IS_LATEST_VERSION, Datatype::Boolean),
        read_only(ids::IS_MAJOR_VERSION, Datatype::Boolean),
        read_only(ids::IS_LATEST_MAJOR_VERSION, Datatype::Boolean),
    ];
    if version >= ProtocolVersion::V1_1 {
        properties.push(read_only(ids::IS_PRIVATE_WORKING_COPY, Datatype::Boolean));
    }
    properties.extend([
        read_only(ids::VERSION_LABEL, Datatype::String),
        read_only(ids::VERSION_SERIES_ID, Datatype::Id),
        read_only(ids::IS_VERSION_SERIES_CHECKED_OUT, Datatype::Boolean),
        read_only(ids::VERSION_SERIES_CHECKED_OUT_BY, Datatype::String),
        read_only(ids::VERSION_SERIES_CHECKED_OUT_ID, Datatype::Id),
        read_only(ids::CHECKIN_COMMENT, Datatype::String),
        read_only(ids::CONTENT_STREAM_LENGTH, Datatype::Integer),
        read_only(ids::CONTENT_STREAM_MIME_TYPE, Datatype::String),
        read_only(ids::CONTENT_STREAM_FILE_NAME, Datatype::String),
        read_only(ids::CONTENT_STREAM_ID, Datatype::Id),
    ]);
    properties
}

fn specific_properties(base: BaseType, version: ProtocolVersion) -> Vec<PropertyDefinition> {
    match base {
        BaseType::Document => document_properties(version),
        BaseType::Folder => vec![
            read_only(ids::PARENT_ID, Datatype::Id),
            read_only(ids::PATH, Datatype::String),
            PropertyDefinition::multi(ids::ALLOWED_CHILD_OBJECT_TYPE_IDS, Datatype::Id),
        ],
        BaseType::Relationship => vec![
            PropertyDefinition::single(ids::SOURCE_ID, Datatype::Id)
                .with_updatability(Updatability::OnCreate)
                .required(),
            PropertyDefinition::single(ids::TARGET_ID, Datatype::Id)
                .with_updatability(Updatability::OnCreate)
                .required(),
        ],
        BaseType::Policy => vec![PropertyDefinition::single(ids::POLICY_TEXT, Datatype::String)],
        BaseType::Item | BaseType::Secondary => Vec::new(),
    }
}

impl BaseTypes {
    /// Base types available under `version`
    ///
    /// Item and secondary roots only exist from protocol 1.1 on.
    pub fn available(version: ProtocolVersion) -> Vec<BaseType> {
        BaseType::ALL
            .iter()
            .copied()
            .filter(|base| {
                version.supports_secondary_types()
                    || !matches!(base, BaseType::Item | BaseType::Secondary)
            })
            .collect()
    }

    /// Root definitions for `version`, with their standard properties
    pub fn standard(version: ProtocolVersion) -> Vec<TypeDefinition> {
        Self::available(version)
            .into_iter()
            .map(|base| Self::definition(base, version))
            .collect()
    }

    /// Root definition of one base type
    pub fn definition(base: BaseType, version: ProtocolVersion) -> TypeDefinition {
        let mut definition = TypeDefinition::root(base);
        definition.type_mutability = version
            .supports_type_mutability()
            .then_some(TypeMutability::FIXED);

        // secondary roots carry no common properties
        if base != BaseType::Secondary {
            for property in common_properties(version) {
                definition = definition.with_property(property);
            }
        }
        for property in specific_properties(base, version) {
            definition = definition.with_property(property);
        }
        definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_1_0_has_four_roots() {
        let roots = BaseTypes::standard(ProtocolVersion::V1_0);
        assert_eq!(roots.len(), 4);
        assert!(roots.iter().all(|t| t.type_mutability.is_none()));
        let doc = &roots[0];
        assert!(doc.property_definition(ids::SECONDARY_OBJECT_TYPE_IDS).is_none());
        assert!(doc.property_definition(ids::IS_PRIVATE_WORKING_COPY).is_none());
    }

    #[test]
    fn test_protocol_1_1_has_six_roots() {
        let roots = BaseTypes::standard(ProtocolVersion::V1_1);
        assert_eq!(roots.len(), 6);
        let secondary = roots
            .iter()
            .find(|t| t.base_type == BaseType::Secondary)
            .unwrap();
        assert!(secondary.property_definitions.is_empty());
        assert!(!secondary.creatable);
    }

    #[test]
    fn test_document_root_properties() {
        let doc = BaseTypes::definition(BaseType::Document, ProtocolVersion::V1_1);
        let name = doc.property_definition(ids::NAME).unwrap();
        assert!(name.required);
        assert_eq!(name.updatability, Updatability::ReadWrite);
        let label = doc.property_definition(ids::VERSION_LABEL).unwrap();
        assert_eq!(label.updatability, Updatability::ReadOnly);
        assert!(doc.property_definitions.values().all(|p| !p.inherited));
    }
}
