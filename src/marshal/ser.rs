//! `serde::Serializer` producing [`Value`]s.

use serde::ser::{self, Impossible, Serialize};

use super::MarshalError;
use crate::jq::{Map, Value};

/// Serializer for one position in the host value. `path` is only used to
/// report where an unsupported shape was found.
pub(crate) struct ValueSerializer {
    path: String,
}

impl ValueSerializer {
    pub(crate) fn root() -> Self {
        ValueSerializer {
            path: "$".to_string(),
        }
    }

    fn at(path: String) -> Self {
        ValueSerializer { path }
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

fn key_path(parent: &str, key: &str) -> String {
    format!("{}.{}", parent, key)
}

fn variant(name: &'static str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(name.to_string(), value);
    Value::Object(map)
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = MarshalError;

    type SerializeSeq = SerializeVec;
    type SerializeTuple = SerializeVec;
    type SerializeTupleStruct = SerializeVec;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeMap;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, MarshalError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, MarshalError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, MarshalError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, MarshalError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, MarshalError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, MarshalError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, MarshalError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, MarshalError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, MarshalError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, MarshalError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, MarshalError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, MarshalError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, MarshalError> {
        Ok(Value::Number(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, MarshalError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, MarshalError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Value, MarshalError> {
        Err(MarshalError::unsupported("bytes", &self.path))
    }

    fn serialize_none(self) -> Result<Value, MarshalError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, MarshalError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, MarshalError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, MarshalError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, MarshalError> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, MarshalError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        name: &'static str,
        value: &T,
    ) -> Result<Value, MarshalError> {
        let inner = value.serialize(ValueSerializer::at(key_path(&self.path, name)))?;
        Ok(variant(name, inner))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeVec, MarshalError> {
        Ok(SerializeVec {
            items: Vec::with_capacity(len.unwrap_or(0)),
            path: self.path,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeVec, MarshalError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeVec, MarshalError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        name: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant, MarshalError> {
        Ok(SerializeTupleVariant {
            name,
            inner: SerializeVec {
                items: Vec::with_capacity(len),
                path: key_path(&self.path, name),
            },
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<SerializeMap, MarshalError> {
        Ok(SerializeMap {
            map: Map::with_capacity(len.unwrap_or(0)),
            next_key: None,
            path: self.path,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<SerializeMap, MarshalError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        name: &'static str,
        len: usize,
    ) -> Result<SerializeStructVariant, MarshalError> {
        Ok(SerializeStructVariant {
            name,
            inner: SerializeMap {
                map: Map::with_capacity(len),
                next_key: None,
                path: key_path(&self.path, name),
            },
        })
    }
}

pub(crate) struct SerializeVec {
    items: Vec<Value>,
    path: String,
}

impl SerializeVec {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), MarshalError> {
        let path = index_path(&self.path, self.items.len());
        self.items.push(value.serialize(ValueSerializer::at(path))?);
        Ok(())
    }
}

impl ser::SerializeSeq for SerializeVec {
    type Ok = Value;
    type Error = MarshalError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), MarshalError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, MarshalError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SerializeVec {
    type Ok = Value;
    type Error = MarshalError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), MarshalError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, MarshalError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for SerializeVec {
    type Ok = Value;
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), MarshalError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, MarshalError> {
        Ok(Value::Array(self.items))
    }
}

pub(crate) struct SerializeTupleVariant {
    name: &'static str,
    inner: SerializeVec,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), MarshalError> {
        self.inner.push(value)
    }

    fn end(self) -> Result<Value, MarshalError> {
        Ok(variant(self.name, Value::Array(self.inner.items)))
    }
}

pub(crate) struct SerializeMap {
    map: Map,
    next_key: Option<String>,
    path: String,
}

impl SerializeMap {
    fn insert<T: Serialize + ?Sized>(&mut self, key: String, value: &T) -> Result<(), MarshalError> {
        let value = value.serialize(ValueSerializer::at(key_path(&self.path, &key)))?;
        self.map.insert(key, value);
        Ok(())
    }
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = MarshalError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), MarshalError> {
        self.next_key = Some(key.serialize(KeySerializer { path: &self.path })?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), MarshalError> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| MarshalError::Custom("map value serialized before its key".into()))?;
        self.insert(key, value)
    }

    fn end(self) -> Result<Value, MarshalError> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for SerializeMap {
    type Ok = Value;
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), MarshalError> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value, MarshalError> {
        Ok(Value::Object(self.map))
    }
}

pub(crate) struct SerializeStructVariant {
    name: &'static str,
    inner: SerializeMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), MarshalError> {
        self.inner.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value, MarshalError> {
        Ok(variant(self.name, Value::Object(self.inner.map)))
    }
}

/// Serializer for map keys: strings (and things that serialize as
/// strings) only.
struct KeySerializer<'p> {
    path: &'p str,
}

impl KeySerializer<'_> {
    fn reject(&self, what: &str) -> MarshalError {
        MarshalError::unsupported(format!("map key of type {}", what), self.path)
    }
}

impl ser::Serializer for KeySerializer<'_> {
    type Ok = String;
    type Error = MarshalError;

    type SerializeSeq = Impossible<String, MarshalError>;
    type SerializeTuple = Impossible<String, MarshalError>;
    type SerializeTupleStruct = Impossible<String, MarshalError>;
    type SerializeTupleVariant = Impossible<String, MarshalError>;
    type SerializeMap = Impossible<String, MarshalError>;
    type SerializeStruct = Impossible<String, MarshalError>;
    type SerializeStructVariant = Impossible<String, MarshalError>;

    fn serialize_str(self, v: &str) -> Result<String, MarshalError> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String, MarshalError> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, MarshalError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, MarshalError> {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<String, MarshalError> {
        Err(self.reject("bool"))
    }

    fn serialize_i8(self, _v: i8) -> Result<String, MarshalError> {
        Err(self.reject("i8"))
    }

    fn serialize_i16(self, _v: i16) -> Result<String, MarshalError> {
        Err(self.reject("i16"))
    }

    fn serialize_i32(self, _v: i32) -> Result<String, MarshalError> {
        Err(self.reject("i32"))
    }

    fn serialize_i64(self, _v: i64) -> Result<String, MarshalError> {
        Err(self.reject("i64"))
    }

    fn serialize_u8(self, _v: u8) -> Result<String, MarshalError> {
        Err(self.reject("u8"))
    }

    fn serialize_u16(self, _v: u16) -> Result<String, MarshalError> {
        Err(self.reject("u16"))
    }

    fn serialize_u32(self, _v: u32) -> Result<String, MarshalError> {
        Err(self.reject("u32"))
    }

    fn serialize_u64(self, _v: u64) -> Result<String, MarshalError> {
        Err(self.reject("u64"))
    }

    fn serialize_f32(self, _v: f32) -> Result<String, MarshalError> {
        Err(self.reject("f32"))
    }

    fn serialize_f64(self, _v: f64) -> Result<String, MarshalError> {
        Err(self.reject("f64"))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, MarshalError> {
        Err(self.reject("bytes"))
    }

    fn serialize_none(self) -> Result<String, MarshalError> {
        Err(self.reject("option"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> Result<String, MarshalError> {
        Err(self.reject("option"))
    }

    fn serialize_unit(self) -> Result<String, MarshalError> {
        Err(self.reject("unit"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, MarshalError> {
        Err(self.reject("unit struct"))
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, MarshalError> {
        Err(self.reject("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, MarshalError> {
        Err(self.reject("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, MarshalError> {
        Err(self.reject("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, MarshalError> {
        Err(self.reject("tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, MarshalError> {
        Err(self.reject("enum"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, MarshalError> {
        Err(self.reject("map"))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, MarshalError> {
        Err(self.reject("struct"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, MarshalError> {
        Err(self.reject("enum"))
    }
}
