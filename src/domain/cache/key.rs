//! Cache key derivation
//!
//! A key is `identity#version#arg1#arg2#...`. The identity is a stable name the
//! caller assigns to a computation; the version lets a changed result shape
//! invalidate old entries without explicit eviction. Arguments must be signed
//! or unsigned integers, bools or strings. A `#` inside a string argument can
//! make two distinct argument lists collide; callers should avoid it.
//!
//! Service prefixes have the same hazard one level up. `clear` matches the
//! prefix as a plain string, so a service prefixed `a` also clears keys of a
//! service prefixed `ab`. End prefixes with `:` to keep them disjoint.

use serde::ser::{
    Impossible, Serialize, SerializeSeq, SerializeTuple, SerializeTupleStruct, Serializer,
};

use super::value::{PrimitiveSerializer, Role};
use crate::domain::CacheError;

/// Separator between key segments
pub const KEY_SEPARATOR: &str = "#";

/// Builds the cache key for a computation call.
///
/// `args` may be a single primitive, a tuple or sequence of primitives, or
/// `()` for a call without arguments.
pub fn make_cache_key<A>(identity: &str, version: i64, args: &A) -> Result<String, CacheError>
where
    A: Serialize + ?Sized,
{
    KeyBuilder::new(identity).with_version(version).build(args)
}

/// Reusable key builder bound to one computation identity and version
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    identity: String,
    version: i64,
}

impl KeyBuilder {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            version: 0,
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn build<A>(&self, args: &A) -> Result<String, CacheError>
    where
        A: Serialize + ?Sized,
    {
        if self.identity.is_empty() {
            return Err(CacheError::validation("computation identity must not be empty"));
        }

        let parts = args.serialize(ArgumentSerializer)?;

        let mut inputs = Vec::with_capacity(parts.len() + 2);
        inputs.push(self.identity.clone());
        inputs.push(self.version.to_string());
        inputs.extend(parts);

        Ok(inputs.join(KEY_SEPARATOR))
    }
}

fn argument<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheError> {
    value
        .serialize(PrimitiveSerializer::new(Role::Argument))
        .map(|v| v.to_string())
}

/// Flattens the top-level argument list into key segments
struct ArgumentSerializer;

struct ArgumentList {
    parts: Vec<String>,
}

impl Serializer for ArgumentSerializer {
    type Ok = Vec<String>;
    type Error = CacheError;
    type SerializeSeq = ArgumentList;
    type SerializeTuple = ArgumentList;
    type SerializeTupleStruct = ArgumentList;
    type SerializeTupleVariant = Impossible<Vec<String>, CacheError>;
    type SerializeMap = Impossible<Vec<String>, CacheError>;
    type SerializeStruct = Impossible<Vec<String>, CacheError>;
    type SerializeStructVariant = Impossible<Vec<String>, CacheError>;

    fn serialize_bool(self, v: bool) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_i8(self, v: i8) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_i16(self, v: i16) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_i32(self, v: i32) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_i64(self, v: i64) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_u8(self, v: u8) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_u16(self, v: u16) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_u32(self, v: u32) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_u64(self, v: u64) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_f32(self, v: f32) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_f64(self, v: f64) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_char(self, v: char) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(&v)?])
    }

    fn serialize_str(self, v: &str) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(v)?])
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Vec<String>, CacheError> {
        Err(CacheError::unsupported_argument("bytes"))
    }

    fn serialize_none(self) -> Result<Vec<String>, CacheError> {
        Err(CacheError::unsupported_argument("none"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<String>, CacheError> {
        Ok(vec![argument(value)?])
    }

    fn serialize_unit(self) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Vec<String>, CacheError> {
        Err(CacheError::unsupported_argument(name))
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Vec<String>, CacheError> {
        Err(CacheError::unsupported_argument(format!("{}::{}", name, variant)))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Vec<String>, CacheError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<Vec<String>, CacheError> {
        Err(CacheError::unsupported_argument(format!("{}::{}", name, variant)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<ArgumentList, CacheError> {
        Ok(ArgumentList {
            parts: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<ArgumentList, CacheError> {
        Ok(ArgumentList {
            parts: Vec::with_capacity(len),
        })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<ArgumentList, CacheError> {
        self.serialize_tuple(len)
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CacheError> {
        Err(CacheError::unsupported_argument(format!("{}::{}", name, variant)))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CacheError> {
        Err(CacheError::unsupported_argument("map"))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CacheError> {
        Err(CacheError::unsupported_argument(name))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CacheError> {
        Err(CacheError::unsupported_argument(format!("{}::{}", name, variant)))
    }
}

impl SerializeSeq for ArgumentList {
    type Ok = Vec<String>;
    type Error = CacheError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        self.parts.push(argument(value)?);
        Ok(())
    }

    fn end(self) -> Result<Vec<String>, CacheError> {
        Ok(self.parts)
    }
}

impl SerializeTuple for ArgumentList {
    type Ok = Vec<String>;
    type Error = CacheError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Vec<String>, CacheError> {
        SerializeSeq::end(self)
    }
}

impl SerializeTupleStruct for ArgumentList {
    type Ok = Vec<String>;
    type Error = CacheError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Vec<String>, CacheError> {
        SerializeSeq::end(self)
    }
}
