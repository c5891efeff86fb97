//! Per-datatype coercion table
//!
//! Every datatype maps to one pure function that converts a raw scalar into a
//! [`PropertyValue`] or returns `None` when the runtime type is not accepted.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use vellum_core::{InvalidArgument, Result, VellumError};

use crate::definitions::{Datatype, PropertyDefinition};
use crate::value::{BagValue, PropertyValue};

/// Pure conversion from a raw scalar
pub type Coercion = fn(&BagValue) -> Option<PropertyValue>;

/// Conversion table, indexed in [`Datatype::ALL`] order
static COERCIONS: [(Datatype, Coercion, &str); 8] = [
    (Datatype::Boolean, coerce_boolean, "boolean"),
    (Datatype::DateTime, coerce_datetime, "calendar or timestamp"),
    (
        Datatype::Decimal,
        coerce_decimal,
        "big decimal, big integer, fixed-width integer or float",
    ),
    (Datatype::Html, coerce_html, "text"),
    (Datatype::Id, coerce_id, "text"),
    (
        Datatype::Integer,
        coerce_integer,
        "big integer or fixed-width integer",
    ),
    (Datatype::String, coerce_string, "text"),
    (Datatype::Uri, coerce_uri, "text"),
];

fn entry(datatype: Datatype) -> &'static (Datatype, Coercion, &'static str) {
    let index = match datatype {
        Datatype::Boolean => 0,
        Datatype::DateTime => 1,
        Datatype::Decimal => 2,
        Datatype::Html => 3,
        Datatype::Id => 4,
        Datatype::Integer => 5,
        Datatype::String => 6,
        Datatype::Uri => 7,
    };
    &COERCIONS[index]
}

/// Conversion function for a datatype
pub fn coercion(datatype: Datatype) -> Coercion {
    entry(datatype).1
}

/// Runtime types a datatype accepts, for error messages
pub fn expected_types(datatype: Datatype) -> &'static str {
    entry(datatype).2
}

/// Convert one scalar for `definition`
pub fn coerce(definition: &PropertyDefinition, value: &BagValue) -> Result<PropertyValue> {
    coercion(definition.datatype)(value).ok_or_else(|| {
        VellumError::invalid(InvalidArgument::WrongPropertyType {
            property: definition.id.to_string(),
            expected: expected_types(definition.datatype).to_string(),
            actual: value.type_name().to_string(),
        })
    })
}

fn text(value: &BagValue) -> Option<String> {
    value.as_text().map(str::to_string)
}

fn coerce_string(value: &BagValue) -> Option<PropertyValue> {
    text(value).map(PropertyValue::String)
}

fn coerce_id(value: &BagValue) -> Option<PropertyValue> {
    text(value).map(PropertyValue::Id)
}

fn coerce_html(value: &BagValue) -> Option<PropertyValue> {
    text(value).map(PropertyValue::Html)
}

fn coerce_uri(value: &BagValue) -> Option<PropertyValue> {
    text(value).map(PropertyValue::Uri)
}

fn coerce_boolean(value: &BagValue) -> Option<PropertyValue> {
    match value {
        BagValue::Bool(b) => Some(PropertyValue::Boolean(*b)),
        _ => None,
    }
}

/// Lossless widening of any integral value
fn integral(value: &BagValue) -> Option<BigInt> {
    match value {
        BagValue::BigInt(i) => Some(i.clone()),
        BagValue::I8(v) => Some(BigInt::from(*v)),
        BagValue::I16(v) => Some(BigInt::from(*v)),
        BagValue::I32(v) => Some(BigInt::from(*v)),
        BagValue::I64(v) => Some(BigInt::from(*v)),
        BagValue::U8(v) => Some(BigInt::from(*v)),
        BagValue::U16(v) => Some(BigInt::from(*v)),
        BagValue::U32(v) => Some(BigInt::from(*v)),
        BagValue::U64(v) => Some(BigInt::from(*v)),
        _ => None,
    }
}

fn coerce_integer(value: &BagValue) -> Option<PropertyValue> {
    integral(value).map(PropertyValue::Integer)
}

/// Floats go through their shortest decimal text so `0.1` stays `0.1`
fn float_to_decimal(text: String) -> Option<BigDecimal> {
    BigDecimal::from_str(&text).ok()
}

fn coerce_decimal(value: &BagValue) -> Option<PropertyValue> {
    let decimal = match value {
        BagValue::Decimal(d) => Some(d.clone()),
        BagValue::F32(f) if f.is_finite() => float_to_decimal(f.to_string()),
        BagValue::F64(f) if f.is_finite() => float_to_decimal(f.to_string()),
        other => integral(other).map(BigDecimal::from),
    };
    decimal.map(PropertyValue::Decimal)
}

fn coerce_datetime(value: &BagValue) -> Option<PropertyValue> {
    match value {
        BagValue::DateTime(dt) => Some(PropertyValue::DateTime(dt.with_timezone(&Utc))),
        BagValue::Timestamp(ts) => timestamp_to_utc(*ts).map(PropertyValue::DateTime),
        _ => None,
    }
}

/// `None` when the instant lies outside the representable calendar range
fn timestamp_to_utc(ts: SystemTime) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match ts.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).ok()?, after.subsec_nanos()),
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => (secs.checked_neg()?, 0),
                nanos => (secs.checked_neg()?.checked_sub(1)?, 1_000_000_000 - nanos),
            }
        }
    };
    DateTime::<Utc>::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{FixedOffset, TimeZone};
    use std::time::Duration;

    #[test]
    fn test_table_covers_every_datatype() {
        for datatype in Datatype::ALL {
            assert_eq!(entry(datatype).0, datatype);
        }
    }

    #[test]
    fn test_integer_widening() {
        let wide = coercion(Datatype::Integer)(&BagValue::U64(u64::MAX)).unwrap();
        assert_eq!(wide, PropertyValue::Integer(BigInt::from(u64::MAX)));
        assert!(coercion(Datatype::Integer)(&BagValue::F64(1.0)).is_none());
    }

    #[test]
    fn test_decimal_uses_text_representation() {
        let value = coercion(Datatype::Decimal)(&BagValue::F64(0.1)).unwrap();
        assert_eq!(
            value,
            PropertyValue::Decimal(BigDecimal::from_str("0.1").unwrap())
        );
        let value = coercion(Datatype::Decimal)(&BagValue::I32(7)).unwrap();
        assert_eq!(value, PropertyValue::Decimal(BigDecimal::from(7i32)));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(coercion(Datatype::Decimal)(&BagValue::F64(f64::NAN)).is_none());
        assert!(coercion(Datatype::Decimal)(&BagValue::F32(f32::INFINITY)).is_none());
    }

    #[test]
    fn test_datetime_normalized_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let value = coercion(Datatype::DateTime)(&BagValue::DateTime(local)).unwrap();
        let utc = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(value, PropertyValue::DateTime(utc));
    }

    #[test]
    fn test_timestamps_convert_on_both_sides_of_the_epoch() {
        let after = UNIX_EPOCH + Duration::from_millis(1_500);
        let value = coercion(Datatype::DateTime)(&BagValue::Timestamp(after)).unwrap();
        let expected = Utc.timestamp_opt(1, 500_000_000).unwrap();
        assert_eq!(value, PropertyValue::DateTime(expected));

        let before = UNIX_EPOCH - Duration::from_millis(1_500);
        let value = coercion(Datatype::DateTime)(&BagValue::Timestamp(before)).unwrap();
        let expected = Utc.timestamp_opt(-2, 500_000_000).unwrap();
        assert_eq!(value, PropertyValue::DateTime(expected));
    }

    #[test]
    fn test_timestamp_beyond_calendar_range_is_rejected() {
        let far = UNIX_EPOCH + Duration::from_secs(1 << 45);
        assert!(coercion(Datatype::DateTime)(&BagValue::Timestamp(far)).is_none());

        let def = PropertyDefinition::single("when", Datatype::DateTime);
        let err = coerce(&def, &BagValue::Timestamp(far)).unwrap_err();
        assert_matches!(
            err,
            VellumError::InvalidArgument {
                reason: InvalidArgument::WrongPropertyType { .. }
            }
        );
    }

    #[test]
    fn test_wrong_type_names_expected_set() {
        let def = PropertyDefinition::single("flag", Datatype::Boolean);
        let err = coerce(&def, &BagValue::Text("yes".into())).unwrap_err();
        assert!(err.to_string().contains("expects boolean but got text"));
    }
}
