//! Raw and resolved property values

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use vellum_core::{InvalidArgument, PropertyId, Result, VellumError};

use crate::definitions::{Cardinality, Datatype, PropertyDefinition};

/// Raw property bag supplied by callers, in insertion order
pub type PropertyBag = IndexMap<String, BagValue>;

/// A raw value as supplied by a caller
#[derive(Debug, Clone, PartialEq)]
pub enum BagValue {
    /// Text
    Text(String),
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit unsigned integer
    U64(u64),
    /// Arbitrary-precision integer
    BigInt(BigInt),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Arbitrary-precision decimal
    Decimal(BigDecimal),
    /// Timezone-aware calendar value
    DateTime(DateTime<FixedOffset>),
    /// Point in time without a zone
    Timestamp(SystemTime),
    /// List of values
    List(Vec<BagValue>),
    /// Explicit null
    Null,
    /// Already resolved property
    Property(Property),
}

impl BagValue {
    /// Name of the runtime type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            BagValue::Text(_) => "text",
            BagValue::Bool(_) => "boolean",
            BagValue::I8(_) => "i8",
            BagValue::I16(_) => "i16",
            BagValue::I32(_) => "i32",
            BagValue::I64(_) => "i64",
            BagValue::U8(_) => "u8",
            BagValue::U16(_) => "u16",
            BagValue::U32(_) => "u32",
            BagValue::U64(_) => "u64",
            BagValue::BigInt(_) => "big integer",
            BagValue::F32(_) => "f32",
            BagValue::F64(_) => "f64",
            BagValue::Decimal(_) => "big decimal",
            BagValue::DateTime(_) => "calendar",
            BagValue::Timestamp(_) => "timestamp",
            BagValue::List(_) => "list",
            BagValue::Null => "null",
            BagValue::Property(_) => "property",
        }
    }

    /// Whether this is the explicit null
    pub fn is_null(&self) -> bool {
        matches!(self, BagValue::Null)
    }

    /// Borrow the text, if this is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            BagValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

macro_rules! bag_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for BagValue {
                fn from(value: $ty) -> Self {
                    BagValue::$variant(value)
                }
            }
        )*
    };
}

bag_value_from!(
    String => Text,
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    BigInt => BigInt,
    f32 => F32,
    f64 => F64,
    BigDecimal => Decimal,
    DateTime<FixedOffset> => DateTime,
    SystemTime => Timestamp,
    Property => Property,
);

impl From<&str> for BagValue {
    fn from(value: &str) -> Self {
        BagValue::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for BagValue {
    fn from(value: DateTime<Utc>) -> Self {
        BagValue::DateTime(value.fixed_offset())
    }
}

impl<T: Into<BagValue>> From<Vec<T>> for BagValue {
    fn from(values: Vec<T>) -> Self {
        BagValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<BagValue>> From<Option<T>> for BagValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BagValue::Null, Into::into)
    }
}

impl From<PropertyValue> for BagValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Boolean(b) => BagValue::Bool(b),
            PropertyValue::DateTime(dt) => BagValue::DateTime(dt.fixed_offset()),
            PropertyValue::Decimal(d) => BagValue::Decimal(d),
            PropertyValue::Integer(i) => BagValue::BigInt(i),
            PropertyValue::Html(s)
            | PropertyValue::Id(s)
            | PropertyValue::String(s)
            | PropertyValue::Uri(s) => BagValue::Text(s),
        }
    }
}

/// A schema-validated value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum PropertyValue {
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Decimal(BigDecimal),
    Html(String),
    Id(String),
    Integer(BigInt),
    String(String),
    Uri(String),
}

impl PropertyValue {
    /// Datatype this value belongs to
    pub fn datatype(&self) -> Datatype {
        match self {
            PropertyValue::Boolean(_) => Datatype::Boolean,
            PropertyValue::DateTime(_) => Datatype::DateTime,
            PropertyValue::Decimal(_) => Datatype::Decimal,
            PropertyValue::Html(_) => Datatype::Html,
            PropertyValue::Id(_) => Datatype::Id,
            PropertyValue::Integer(_) => Datatype::Integer,
            PropertyValue::String(_) => Datatype::String,
            PropertyValue::Uri(_) => Datatype::Uri,
        }
    }

    /// Borrow the text of a textual value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Html(s)
            | PropertyValue::Id(s)
            | PropertyValue::String(s)
            | PropertyValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean value, if this is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value, if this is one
    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            PropertyValue::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Decimal value, if this is one
    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            PropertyValue::Decimal(d) => Some(d),
            _ => None,
        }
    }

    /// Datetime value, if this is one
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            PropertyValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(b) => write!(f, "{b}"),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            PropertyValue::Decimal(d) => write!(f, "{d}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Html(s)
            | PropertyValue::Id(s)
            | PropertyValue::String(s)
            | PropertyValue::Uri(s) => f.write_str(s),
        }
    }
}

/// A property resolved against its definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    definition: Arc<PropertyDefinition>,
    values: Vec<PropertyValue>,
}

impl Property {
    /// Bind values to a definition
    ///
    /// Fails when a single-valued definition receives more than one value or a
    /// value of the wrong datatype.
    pub fn new(definition: Arc<PropertyDefinition>, values: Vec<PropertyValue>) -> Result<Self> {
        if definition.cardinality == Cardinality::Single && values.len() > 1 {
            return Err(VellumError::invalid(InvalidArgument::NotMultiValued {
                property: definition.id.to_string(),
            }));
        }
        if let Some(wrong) = values.iter().find(|v| v.datatype() != definition.datatype) {
            return Err(VellumError::invalid(InvalidArgument::WrongPropertyType {
                property: definition.id.to_string(),
                expected: definition.datatype.to_string(),
                actual: wrong.datatype().to_string(),
            }));
        }
        Ok(Self { definition, values })
    }

    /// Single-valued property holding `value`
    pub fn single(definition: Arc<PropertyDefinition>, value: PropertyValue) -> Result<Self> {
        Self::new(definition, vec![value])
    }

    /// Property id
    pub fn id(&self) -> &PropertyId {
        &self.definition.id
    }

    /// Definition the property was resolved against
    pub fn definition(&self) -> &Arc<PropertyDefinition> {
        &self.definition
    }

    /// Values in order
    pub fn values(&self) -> &[PropertyValue] {
        &self.values
    }

    /// First value, if any
    pub fn first_value(&self) -> Option<&PropertyValue> {
        self.values.first()
    }

    /// Whether the property has at least one value
    pub fn is_set(&self) -> bool {
        !self.values.is_empty()
    }

    /// Consume into the values
    pub fn into_values(self) -> Vec<PropertyValue> {
        self.values
    }
}

/// Ordered set of resolved properties, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    properties: IndexMap<PropertyId, Property>,
}

impl PropertySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property, keeping its first position
    pub fn insert(&mut self, property: Property) -> Option<Property> {
        self.properties.insert(property.id().clone(), property)
    }

    /// Look up a property
    pub fn get(&self, id: &str) -> Option<&Property> {
        self.properties.get(id)
    }

    /// Remove a property, keeping the order of the rest
    pub fn remove(&mut self, id: &str) -> Option<Property> {
        self.properties.shift_remove(id)
    }

    /// Whether a property with this id is present
    pub fn contains(&self, id: &str) -> bool {
        self.properties.contains_key(id)
    }

    /// First value of a property
    pub fn first_value(&self, id: &str) -> Option<&PropertyValue> {
        self.get(id).and_then(Property::first_value)
    }

    /// Text of the first value of a property
    pub fn text(&self, id: &str) -> Option<&str> {
        self.first_value(id).and_then(PropertyValue::as_str)
    }

    /// Overlay `other` on this set; properties in `other` win
    pub fn merge(&mut self, other: PropertySet) {
        for property in other {
            self.insert(property);
        }
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties in order
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Property ids in order
    pub fn ids(&self) -> impl Iterator<Item = &PropertyId> {
        self.properties.keys()
    }
}

impl IntoIterator for PropertySet {
    type Item = Property;
    type IntoIter = indexmap::map::IntoValues<PropertyId, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.into_values()
    }
}

impl FromIterator<Property> for PropertySet {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        let mut set = PropertySet::new();
        for property in iter {
            set.insert(property);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_rejects_second_value_on_single() {
        let def = Arc::new(PropertyDefinition::single("p", Datatype::String));
        let err = Property::new(
            def,
            vec![PropertyValue::String("a".into()), PropertyValue::String("b".into())],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VellumError::InvalidArgument { reason: InvalidArgument::NotMultiValued { .. } }
        ));
    }

    #[test]
    fn test_property_set_preserves_order() {
        let a = Arc::new(PropertyDefinition::single("a", Datatype::Boolean));
        let b = Arc::new(PropertyDefinition::single("b", Datatype::Boolean));
        let mut set = PropertySet::new();
        set.insert(Property::single(b, PropertyValue::Boolean(true)).unwrap());
        set.insert(Property::single(a.clone(), PropertyValue::Boolean(false)).unwrap());
        set.insert(Property::single(a, PropertyValue::Boolean(true)).unwrap());

        let ids: Vec<_> = set.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(set.first_value("a"), Some(&PropertyValue::Boolean(true)));
    }

    #[test]
    fn test_bag_value_conversions() {
        assert_eq!(BagValue::from("x"), BagValue::Text("x".into()));
        assert_eq!(BagValue::from(Option::<i32>::None), BagValue::Null);
        assert_eq!(
            BagValue::from(vec![1i16, 2]),
            BagValue::List(vec![BagValue::I16(1), BagValue::I16(2)])
        );
    }
}
