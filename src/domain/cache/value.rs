//! Primitive cache values
//!
//! Backends only ever store [`Value`]s. Anything that serializes to a signed
//! integer, unsigned integer, bool or string can be converted into one; every
//! other shape is rejected with [`CacheError::UnsupportedValue`] naming the
//! offending kind.

use std::fmt;

use serde::de::{self, DeserializeOwned, Visitor};
use serde::ser::{Impossible, Serialize, Serializer};

use crate::domain::CacheError;

/// A primitive value as held by a cache backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Converts any serializable primitive into a `Value`
    pub fn from_serializable<V>(value: &V) -> Result<Self, CacheError>
    where
        V: Serialize + ?Sized,
    {
        value.serialize(PrimitiveSerializer::new(Role::Value))
    }

    /// Decodes the value into a concrete type.
    ///
    /// Decoding is lenient about representation: a remote store hands every
    /// primitive back as a string, so `Str("42")` decodes into an `i64` and
    /// `Str("1")` into a `bool`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, CacheError> {
        T::deserialize(self)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            Value::Bool(_) => None,
            Value::Str(s) => s.parse().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Uint(v) => Some(*v),
            Value::Bool(_) => None,
            Value::Str(s) => s.parse().ok(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(0) | Value::Uint(0) => Some(false),
            Value::Int(1) | Value::Uint(1) => Some(true),
            Value::Str(s) => match s.as_str() {
                "1" | "true" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Uint(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! impl_from_signed {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Uint(v as u64)
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Uint(v) => serializer.serialize_u64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Str(v) => serializer.serialize_str(v),
        }
    }
}

/// What a primitive is being converted for; decides the rejection error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Argument,
    Value,
}

/// Serializer that accepts exactly one primitive leaf
pub(crate) struct PrimitiveSerializer {
    role: Role,
}

impl PrimitiveSerializer {
    pub(crate) fn new(role: Role) -> Self {
        Self { role }
    }

    fn reject(&self, kind: &str) -> CacheError {
        match self.role {
            Role::Argument => CacheError::unsupported_argument(kind),
            Role::Value => CacheError::unsupported_value(kind),
        }
    }
}

impl Serializer for PrimitiveSerializer {
    type Ok = Value;
    type Error = CacheError;
    type SerializeSeq = Impossible<Value, CacheError>;
    type SerializeTuple = Impossible<Value, CacheError>;
    type SerializeTupleStruct = Impossible<Value, CacheError>;
    type SerializeTupleVariant = Impossible<Value, CacheError>;
    type SerializeMap = Impossible<Value, CacheError>;
    type SerializeStruct = Impossible<Value, CacheError>;
    type SerializeStructVariant = Impossible<Value, CacheError>;

    fn serialize_bool(self, v: bool) -> Result<Value, CacheError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, CacheError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, CacheError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, CacheError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, CacheError> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, CacheError> {
        Ok(Value::Uint(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, CacheError> {
        Ok(Value::Uint(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, CacheError> {
        Ok(Value::Uint(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, CacheError> {
        Ok(Value::Uint(v))
    }

    fn serialize_f32(self, _v: f32) -> Result<Value, CacheError> {
        Err(self.reject("f32"))
    }

    fn serialize_f64(self, _v: f64) -> Result<Value, CacheError> {
        Err(self.reject("f64"))
    }

    fn serialize_char(self, v: char) -> Result<Value, CacheError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, CacheError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Value, CacheError> {
        Err(self.reject("bytes"))
    }

    fn serialize_none(self) -> Result<Value, CacheError> {
        Err(self.reject("none"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, CacheError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, CacheError> {
        Err(self.reject("unit"))
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Value, CacheError> {
        Err(self.reject(name))
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, CacheError> {
        Err(self.reject(&format!("{}::{}", name, variant)))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, CacheError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<Value, CacheError> {
        Err(self.reject(&format!("{}::{}", name, variant)))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, CacheError> {
        Err(self.reject("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, CacheError> {
        Err(self.reject("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, CacheError> {
        Err(self.reject(name))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CacheError> {
        Err(self.reject(&format!("{}::{}", name, variant)))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CacheError> {
        Err(self.reject("map"))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CacheError> {
        Err(self.reject(name))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CacheError> {
        Err(self.reject(&format!("{}::{}", name, variant)))
    }
}

impl<'de> de::Deserializer<'de> for Value {
    type Error = CacheError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        match self {
            Value::Int(v) => visitor.visit_i64(v),
            Value::Uint(v) => visitor.visit_u64(v),
            Value::Bool(v) => visitor.visit_bool(v),
            Value::Str(v) => visitor.visit_string(v),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        match self.as_bool() {
            Some(v) => visitor.visit_bool(v),
            None => Err(mismatch(&self, "bool")),
        }
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        match self.as_i64() {
            Some(v) => visitor.visit_i64(v),
            None => Err(mismatch(&self, "integer")),
        }
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        match self.as_u64() {
            Some(v) => visitor.visit_u64(v),
            None => Err(mismatch(&self, "unsigned integer")),
        }
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_f64(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        match &self {
            Value::Int(v) => visitor.visit_i64(*v),
            Value::Uint(v) => visitor.visit_u64(*v),
            Value::Str(s) => match s.parse::<f64>() {
                Ok(v) => visitor.visit_f64(v),
                Err(_) => Err(mismatch(&self, "float")),
            },
            Value::Bool(_) => Err(mismatch(&self, "float")),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        match self {
            Value::Str(v) => visitor.visit_string(v),
            other => visitor.visit_string(other.to_string()),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CacheError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CacheError> {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct enum
        identifier ignored_any
    }
}

fn mismatch(value: &Value, expected: &str) -> CacheError {
    CacheError::serialization(format!(
        "cannot decode {} value '{}' as {}",
        value.kind(),
        value,
        expected
    ))
}
