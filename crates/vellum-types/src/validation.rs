//! Constraint and definition validation
//!
//! Marshalling only checks shape and datatype. The checks here run afterwards,
//! on create, update and checkin, against the constraints a definition declares.

use vellum_core::{ConstraintViolation, InvalidArgument, Result, VellumError};

use crate::definitions::{Datatype, PropertyDefinition, TypeDefinition, Updatability};
use crate::value::{PropertySet, PropertyValue};

const ILLEGAL_QUERY_NAME_CHARS: &[char] = &[' ', ',', '"', '\'', '\\', '.', '(', ')'];

/// Whether `name` may be used as an object name
pub fn is_valid_object_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('/')
}

/// Require a legal object name
pub fn validate_object_name(name: &str) -> Result<()> {
    if is_valid_object_name(name) {
        Ok(())
    } else {
        Err(VellumError::invalid(InvalidArgument::InvalidName {
            name: name.to_string(),
        }))
    }
}

fn is_valid_type_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c == '/')
}

fn is_valid_query_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(ILLEGAL_QUERY_NAME_CHARS)
}

fn invalid_type(type_id: &str, message: impl Into<String>) -> VellumError {
    VellumError::invalid(InvalidArgument::InvalidTypeDefinition {
        type_id: type_id.to_string(),
        message: message.into(),
    })
}

/// Check names and the base tag of a new or updated type against its parent
pub fn validate_type_definition(definition: &TypeDefinition, parent: &TypeDefinition) -> Result<()> {
    let type_id = definition.id.as_str();
    if !is_valid_type_id(type_id) {
        return Err(VellumError::invalid(InvalidArgument::InvalidName {
            name: type_id.to_string(),
        }));
    }
    if definition.local_name.is_empty() {
        return Err(invalid_type(type_id, "local name must be set"));
    }
    if !is_valid_query_name(&definition.query_name) {
        return Err(invalid_type(
            type_id,
            format!("illegal query name '{}'", definition.query_name),
        ));
    }
    if definition.base_type != parent.base_type {
        return Err(invalid_type(
            type_id,
            format!(
                "base type {} does not match parent base type {}",
                definition.base_type, parent.base_type
            ),
        ));
    }

    for property in definition.own_properties() {
        if !is_valid_type_id(property.id.as_str()) {
            return Err(invalid_type(
                type_id,
                format!("illegal property id '{}'", property.id),
            ));
        }
        if !is_valid_query_name(&property.query_name) {
            return Err(invalid_type(
                type_id,
                format!("illegal query name '{}'", property.query_name),
            ));
        }
        if parent.property_definition(property.id.as_str()).is_some() {
            return Err(invalid_type(
                type_id,
                format!("property '{}' is already defined by the parent type", property.id),
            ));
        }
        if !property.default_value.is_empty() {
            validate_values(property, &property.default_value)
                .map_err(|e| invalid_type(type_id, format!("invalid default value: {e}")))?;
        }
    }
    Ok(())
}

fn out_of_range(definition: &PropertyDefinition, message: String) -> VellumError {
    VellumError::constraint(ConstraintViolation::ValueOutOfRange {
        property: definition.id.to_string(),
        message,
    })
}

/// Check values against the constraints and choices of `definition`
pub fn validate_values(definition: &PropertyDefinition, values: &[PropertyValue]) -> Result<()> {
    let constraints = &definition.constraints;
    for value in values {
        match value {
            PropertyValue::String(s) if definition.datatype == Datatype::String => {
                if let Some(max) = constraints.max_length {
                    let length = s.chars().count() as u64;
                    if length > max {
                        return Err(out_of_range(
                            definition,
                            format!("length {length} exceeds maximum {max}"),
                        ));
                    }
                }
            }
            PropertyValue::Integer(i) => {
                if let Some(min) = &constraints.min_integer {
                    if i < min {
                        return Err(out_of_range(definition, format!("{i} is below minimum {min}")));
                    }
                }
                if let Some(max) = &constraints.max_integer {
                    if i > max {
                        return Err(out_of_range(definition, format!("{i} exceeds maximum {max}")));
                    }
                }
            }
            PropertyValue::Decimal(d) => {
                if let Some(min) = &constraints.min_decimal {
                    if d < min {
                        return Err(out_of_range(definition, format!("{d} is below minimum {min}")));
                    }
                }
                if let Some(max) = &constraints.max_decimal {
                    if d > max {
                        return Err(out_of_range(definition, format!("{d} exceeds maximum {max}")));
                    }
                }
            }
            _ => {}
        }

        if let Some(choices) = &definition.choices {
            if !choices.open && !choices.contains(value) {
                return Err(out_of_range(
                    definition,
                    format!("{value} is not one of the allowed choices"),
                ));
            }
        }
    }
    Ok(())
}

/// Validate a marshalled property set against its object type
///
/// On create, required writable properties must be set. Read-only required
/// properties are maintained by the repository and are not checked here.
pub fn validate_property_set(
    object_type: &TypeDefinition,
    properties: &PropertySet,
    on_create: bool,
) -> Result<()> {
    for property in properties.iter() {
        validate_values(property.definition(), property.values())?;
    }

    if on_create {
        for definition in object_type.property_definitions.values() {
            if !definition.required || definition.updatability == Updatability::ReadOnly {
                continue;
            }
            let set = properties
                .get(definition.id.as_str())
                .is_some_and(|p| p.is_set());
            if !set {
                return Err(VellumError::constraint(
                    ConstraintViolation::RequiredPropertyMissing {
                        property: definition.id.to_string(),
                    },
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{BaseType, Choice};
    use num_bigint::BigInt;

    #[test]
    fn test_object_names() {
        assert!(is_valid_object_name("report.pdf"));
        assert!(!is_valid_object_name(""));
        assert!(!is_valid_object_name("   "));
        assert!(!is_valid_object_name("a/b"));
    }

    #[test]
    fn test_max_length() {
        let def = PropertyDefinition::single("title", Datatype::String).with_max_length(3);
        assert!(validate_values(&def, &[PropertyValue::String("abc".into())]).is_ok());
        assert!(validate_values(&def, &[PropertyValue::String("abcd".into())]).is_err());
    }

    #[test]
    fn test_integer_range() {
        let def = PropertyDefinition::single("count", Datatype::Integer)
            .with_integer_range(Some(BigInt::from(0)), Some(BigInt::from(10)));
        assert!(validate_values(&def, &[PropertyValue::Integer(BigInt::from(10))]).is_ok());
        let err = validate_values(&def, &[PropertyValue::Integer(BigInt::from(-1))]).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_closed_choices() {
        let def = PropertyDefinition::single("status", Datatype::String).with_choices(
            false,
            vec![Choice {
                display_name: "Draft".into(),
                values: vec![PropertyValue::String("draft".into())],
            }],
        );
        assert!(validate_values(&def, &[PropertyValue::String("draft".into())]).is_ok());
        assert!(validate_values(&def, &[PropertyValue::String("final".into())]).is_err());
    }

    #[test]
    fn test_base_type_must_match_parent() {
        let parent = TypeDefinition::root(BaseType::Folder);
        let child = TypeDefinition::new("test:doc", "cmis:folder", BaseType::Document);
        assert!(validate_type_definition(&child, &parent).is_err());
    }

    #[test]
    fn test_illegal_query_name() {
        let parent = TypeDefinition::root(BaseType::Document);
        let mut child = TypeDefinition::new("test:doc", "cmis:document", BaseType::Document);
        child.query_name = "test doc".into();
        assert!(validate_type_definition(&child, &parent).is_err());
    }
}
