//! Property Tests: Marshalling
//!
//! Narrow integers widen to the same arbitrary-precision value as the big
//! integer itself, and a scalar on a single-valued property reads back as a
//! one-element value list.

use num_bigint::BigInt;
use proptest::prelude::*;
use vellum_core::ProtocolVersion;
use vellum_types::{
    BagValue, BaseType, Datatype, PropertyBag, PropertyDefinition, PropertyMarshaller,
    PropertyValue, RawProperty, TypeDefinition, TypeRegistry,
};

fn registry() -> TypeRegistry {
    let registry = TypeRegistry::new(ProtocolVersion::V1_1);
    registry
        .register(
            TypeDefinition::new("doc", "cmis:document", BaseType::Document)
                .with_property(PropertyDefinition::single("intProp", Datatype::Integer))
                .with_property(PropertyDefinition::single("title", Datatype::String)),
        )
        .unwrap();
    registry
}

fn marshal_int(registry: &TypeRegistry, value: BagValue) -> Vec<PropertyValue> {
    let mut bag = PropertyBag::new();
    bag.insert("cmis:objectTypeId".into(), "doc".into());
    bag.insert("intProp".into(), value);
    PropertyMarshaller::new(registry)
        .marshal(&bag, None, None, None)
        .unwrap()
        .get("intProp")
        .unwrap()
        .values()
        .to_vec()
}

#[test]
fn test_sixteen_bit_value_widens_to_integer() {
    let registry = registry();
    let values = marshal_int(&registry, BagValue::I16(42));
    assert_eq!(values, vec![PropertyValue::Integer(BigInt::from(42))]);
}

proptest! {
    #[test]
    fn narrow_integers_match_big_integer(v in any::<i16>()) {
        let registry = registry();
        let narrow = marshal_int(&registry, BagValue::I16(v));
        let wide = marshal_int(&registry, BagValue::BigInt(BigInt::from(v)));
        prop_assert_eq!(narrow, wide);
    }

    #[test]
    fn unsigned_and_signed_agree(v in any::<u32>()) {
        let registry = registry();
        let unsigned = marshal_int(&registry, BagValue::U32(v));
        let signed = marshal_int(&registry, BagValue::I64(i64::from(v)));
        prop_assert_eq!(unsigned, signed);
    }

    #[test]
    fn single_scalar_reads_back_as_one_value(title in "[a-zA-Z0-9 ]{1,24}") {
        let registry = registry();
        let marshaller = PropertyMarshaller::new(&registry);
        let mut bag = PropertyBag::new();
        bag.insert("title".into(), title.clone().into());
        let written = marshaller.marshal(&bag, Some("doc"), None, None).unwrap();

        let raw: Vec<RawProperty> = written
            .iter()
            .map(|p| RawProperty::new(p.id().clone(), p.values().to_vec()))
            .collect();
        let read = marshaller.convert("doc", &[], raw).unwrap();
        prop_assert_eq!(
            read.get("title").unwrap().values(),
            &[PropertyValue::String(title)][..]
        );
    }
}
