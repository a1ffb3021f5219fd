//! Structural encoder: any `Serialize` value into a [`Node`] tree.

use base64ct::{Base64, Encoding};
use serde::ser::{self, Impossible, Serialize};

use crate::config::{Config, DataEncoding};
use crate::error::EncodeError;
use crate::path::Path;
use crate::timestamp;
use crate::value::{Entries, Node};

type Result<T> = std::result::Result<T, EncodeError>;

/// Encoder
pub struct Encoder<'a> {
    config: &'a Config,
    path: Path,
}

impl<'a> Encoder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Encoder {
            config,
            path: Path::root(),
        }
    }

    fn at(config: &'a Config, path: Path) -> Self {
        Encoder { config, path }
    }

    pub fn encode<T: ?Sized + Serialize>(self, value: &T) -> Result<Node> {
        let path = self.path.clone();
        value.serialize(self).map_err(|e| e.locate(&path))
    }

    fn error(&self, reason: impl Into<String>) -> EncodeError {
        EncodeError::new(self.path.clone(), reason)
    }

    fn scalar(v: impl ToString) -> Result<Node> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn encode_timestamp<T: ?Sized + Serialize>(self, value: &T) -> Result<Node> {
        let inner = Encoder::at(self.config, self.path.clone()).encode(value)?;
        let Node::Scalar(text) = inner else {
            return Err(self.error("timestamp must serialize as text"));
        };
        timestamp::render(&text, &self.config.dates)
            .map(Node::Scalar)
            .map_err(|reason| self.error(reason))
    }
}

impl<'a> ser::Serializer for Encoder<'a> {
    type Ok = Node;
    type Error = EncodeError;
    type SerializeSeq = SeqEncoder<'a>;
    type SerializeTuple = SeqEncoder<'a>;
    type SerializeTupleStruct = SeqEncoder<'a>;
    type SerializeTupleVariant = VariantEncoder<SeqEncoder<'a>>;
    type SerializeMap = MapEncoder<'a>;
    type SerializeStruct = MapEncoder<'a>;
    type SerializeStructVariant = VariantEncoder<MapEncoder<'a>>;

    fn serialize_bool(self, v: bool) -> Result<Node> {
        Self::scalar(if v { "true" } else { "false" })
    }

    fn serialize_i8(self, v: i8) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_i16(self, v: i16) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_i32(self, v: i32) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_i64(self, v: i64) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_i128(self, v: i128) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_u8(self, v: u8) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_u16(self, v: u16) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_u32(self, v: u32) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_u64(self, v: u64) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_u128(self, v: u128) -> Result<Node> {
        Self::scalar(v)
    }

    // Display for floats is the shortest text that parses back to the same value
    fn serialize_f32(self, v: f32) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_f64(self, v: f64) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_char(self, v: char) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_str(self, v: &str) -> Result<Node> {
        Self::scalar(v)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node> {
        match &self.config.data {
            DataEncoding::Deferred => Ok(Node::Sequence(
                v.iter().map(|b| Node::Scalar(b.to_string())).collect(),
            )),
            DataEncoding::Base64 => Ok(Node::Scalar(Base64::encode_string(v))),
            DataEncoding::Custom(codec) => codec
                .encode(v)
                .map(Node::Scalar)
                .map_err(|reason| self.error(reason)),
        }
    }

    fn serialize_none(self) -> Result<Node> {
        Ok(Node::empty())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Node> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Node> {
        Ok(Node::empty())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Node> {
        if name == timestamp::TOKEN {
            return self.encode_timestamp(value);
        }
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node> {
        let inner = Encoder::at(self.config, self.path.key(variant)).encode(value)?;
        Ok(Node::Mapping(vec![(variant.to_owned(), inner)]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(SeqEncoder {
            config: self.config,
            path: self.path,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        let inner = Encoder::at(self.config, self.path.key(variant)).serialize_seq(Some(len))?;
        Ok(VariantEncoder { variant, inner })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(MapEncoder {
            config: self.config,
            path: self.path,
            entries: Entries::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        let inner = Encoder::at(self.config, self.path.key(variant)).serialize_map(Some(len))?;
        Ok(VariantEncoder { variant, inner })
    }
}

pub struct SeqEncoder<'a> {
    config: &'a Config,
    path: Path,
    items: Vec<Node>,
}

impl SeqEncoder<'_> {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let path = self.path.index(self.items.len());
        let node = Encoder::at(self.config, path).encode(value)?;
        self.items.push(node);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqEncoder<'_> {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTuple for SeqEncoder<'_> {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTupleStruct for SeqEncoder<'_> {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

pub struct MapEncoder<'a> {
    config: &'a Config,
    path: Path,
    entries: Entries,
    key: Option<String>,
}

impl MapEncoder<'_> {
    fn put<T: ?Sized + Serialize>(&mut self, key: String, value: &T) -> Result<()> {
        let node = Encoder::at(self.config, self.path.key(key.as_str())).encode(value)?;
        self.entries.insert(key, node);
        Ok(())
    }
}

impl ser::SerializeMap for MapEncoder<'_> {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.key = Some(key.serialize(KeyEncoder { path: &self.path })?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let key = self
            .key
            .take()
            .ok_or_else(|| EncodeError::new(self.path.clone(), "map value without a key"))?;
        self.put(key, value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Mapping(self.entries.into_vec()))
    }
}

impl ser::SerializeStruct for MapEncoder<'_> {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.put(key.to_owned(), value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Mapping(self.entries.into_vec()))
    }
}

/// Wraps variant content in a single-entry mapping keyed by the variant name
pub struct VariantEncoder<E> {
    variant: &'static str,
    inner: E,
}

impl VariantEncoder<SeqEncoder<'_>> {
    fn finish(self) -> Result<Node> {
        let content = Node::Sequence(self.inner.items);
        Ok(Node::Mapping(vec![(self.variant.to_owned(), content)]))
    }
}

impl ser::SerializeTupleVariant for VariantEncoder<SeqEncoder<'_>> {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.inner.push(value)
    }

    fn end(self) -> Result<Node> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for VariantEncoder<MapEncoder<'_>> {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.inner.put(key.to_owned(), value)
    }

    fn end(self) -> Result<Node> {
        let content = Node::Mapping(self.inner.entries.into_vec());
        Ok(Node::Mapping(vec![(self.variant.to_owned(), content)]))
    }
}

/// Renders map keys, which must be scalars
struct KeyEncoder<'p> {
    path: &'p Path,
}

impl KeyEncoder<'_> {
    fn reject(&self) -> EncodeError {
        EncodeError::new(self.path.clone(), "map keys must be scalars")
    }
}

impl ser::Serializer for KeyEncoder<'_> {
    type Ok = String;
    type Error = EncodeError;
    type SerializeSeq = Impossible<String, EncodeError>;
    type SerializeTuple = Impossible<String, EncodeError>;
    type SerializeTupleStruct = Impossible<String, EncodeError>;
    type SerializeTupleVariant = Impossible<String, EncodeError>;
    type SerializeMap = Impossible<String, EncodeError>;
    type SerializeStruct = Impossible<String, EncodeError>;
    type SerializeStructVariant = Impossible<String, EncodeError>;

    fn serialize_bool(self, v: bool) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i128(self, v: i128) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u128(self, v: u128) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, v: f32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f64(self, v: f64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_owned())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(self.reject())
    }

    fn serialize_none(self) -> Result<String> {
        Err(self.reject())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(self.reject())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(self.reject())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_owned())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(self.reject())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(self.reject())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(self.reject())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(self.reject())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(self.reject())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(self.reject())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(self.reject())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(self.reject())
    }
}
