//! `serde::Deserializer` reading from an owned [`Value`].

use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{
    self, DeserializeSeed, EnumAccess, IntoDeserializer, Unexpected, VariantAccess, Visitor,
};
use serde::forward_to_deserialize_any;

use super::MarshalError;
use crate::jq::{integral_i64, Map, Value};

/// 2^64, the first value past `u64::MAX` that an f64 can represent.
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(n) => Unexpected::Float(*n),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

/// Offer a number to the visitor as an integer when it is one.
fn visit_number<'de, V: Visitor<'de>>(n: f64, visitor: V) -> Result<V::Value, MarshalError> {
    if let Some(i) = integral_i64(n) {
        visitor.visit_i64(i)
    } else if n.fract() == 0.0 && n >= 0.0 && n < U64_LIMIT {
        visitor.visit_u64(n as u64)
    } else {
        visitor.visit_f64(n)
    }
}

fn visit_array<'de, V: Visitor<'de>>(items: Vec<Value>, visitor: V) -> Result<V::Value, MarshalError> {
    let mut seq = SeqDeserializer::<_, MarshalError>::new(items.into_iter());
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}

fn visit_object<'de, V: Visitor<'de>>(map: Map, visitor: V) -> Result<V::Value, MarshalError> {
    let mut access = MapDeserializer::<_, MarshalError>::new(map.into_iter());
    let value = visitor.visit_map(&mut access)?;
    access.end()?;
    Ok(value)
}

impl<'de> IntoDeserializer<'de, MarshalError> for Value {
    type Deserializer = Value;

    fn into_deserializer(self) -> Value {
        self
    }
}

impl<'de> de::Deserializer<'de> for Value {
    type Error = MarshalError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, MarshalError> {
        match self {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => visit_number(n, visitor),
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => visit_array(items, visitor),
            Value::Object(map) => visit_object(map, visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, MarshalError> {
        match self {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, MarshalError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, MarshalError> {
        match self {
            Value::String(variant) => visitor.visit_enum(EnumDeserializer {
                variant,
                value: None,
            }),
            Value::Object(map) if map.len() == 1 => {
                let Some((variant, value)) = map.into_iter().next() else {
                    return Err(de::Error::invalid_length(0, &"map with a single key"));
                };
                visitor.visit_enum(EnumDeserializer {
                    variant,
                    value: Some(value),
                })
            }
            Value::Object(map) => Err(de::Error::invalid_length(map.len(), &"map with a single key")),
            other => Err(de::Error::invalid_type(unexpected(&other), &"string or map")),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

/// Externally tagged enum: `"Variant"` or `{"Variant": value}`.
struct EnumDeserializer {
    variant: String,
    value: Option<Value>,
}

impl<'de> EnumAccess<'de> for EnumDeserializer {
    type Error = MarshalError;
    type Variant = VariantDeserializer;

    fn variant_seed<S: DeserializeSeed<'de>>(
        self,
        seed: S,
    ) -> Result<(S::Value, VariantDeserializer), MarshalError> {
        let name: StringDeserializer<MarshalError> = self.variant.into_deserializer();
        let variant = seed.deserialize(name)?;
        Ok((variant, VariantDeserializer { value: self.value }))
    }
}

struct VariantDeserializer {
    value: Option<Value>,
}

impl<'de> VariantAccess<'de> for VariantDeserializer {
    type Error = MarshalError;

    fn unit_variant(self) -> Result<(), MarshalError> {
        match self.value {
            None | Some(Value::Null) => Ok(()),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"unit variant")),
        }
    }

    fn newtype_variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<S::Value, MarshalError> {
        match self.value {
            Some(value) => seed.deserialize(value),
            None => Err(de::Error::invalid_type(Unexpected::UnitVariant, &"newtype variant")),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, MarshalError> {
        match self.value {
            Some(Value::Array(items)) => visit_array(items, visitor),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"tuple variant")),
            None => Err(de::Error::invalid_type(Unexpected::UnitVariant, &"tuple variant")),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, MarshalError> {
        match self.value {
            Some(Value::Object(map)) => visit_object(map, visitor),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"struct variant")),
            None => Err(de::Error::invalid_type(Unexpected::UnitVariant, &"struct variant")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::from_value;
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Wrapper(String);

    #[derive(Debug, PartialEq, Deserialize)]
    enum Op {
        Stop,
        Move { dx: i32 },
    }

    #[test]
    fn test_option_and_newtype() {
        assert_eq!(from_value::<Option<i32>>(Value::Null).unwrap(), None);
        assert_eq!(from_value::<Option<i32>>(Value::Number(4.0)).unwrap(), Some(4));
        assert_eq!(
            from_value::<Wrapper>(Value::string("w")).unwrap(),
            Wrapper("w".into())
        );
    }

    #[test]
    fn test_enum_shapes() {
        assert_eq!(from_value::<Op>(Value::string("Stop")).unwrap(), Op::Stop);
        let moved = Value::from_json_str(r#"{"Move": {"dx": -3}}"#).unwrap();
        assert_eq!(from_value::<Op>(moved).unwrap(), Op::Move { dx: -3 });

        let two_keys = Value::from_json_str(r#"{"Stop": null, "Move": {}}"#).unwrap();
        assert!(from_value::<Op>(two_keys).is_err());
        assert!(from_value::<Op>(Value::string("Jump")).is_err());
    }

    #[test]
    fn test_trailing_elements_rejected() {
        let three = Value::from_json_str("[1, 2, 3]").unwrap();
        assert!(from_value::<(i32, i32)>(three).is_err());
    }

    #[test]
    fn test_large_unsigned() {
        assert_eq!(
            from_value::<u64>(Value::Number(U64_LIMIT / 2.0)).unwrap(),
            1u64 << 63
        );
        assert!(from_value::<u64>(Value::Number(U64_LIMIT)).is_err());
    }
}
