//! Structural decoder: a [`Node`] tree into any `Deserialize` type.
//!
//! Every leaf is text, so the decoder parses scalars according to the type the
//! visitor asks for instead of what the tree happens to hold. Errors are
//! anchored at the path of the node being read when they first surface.

use std::borrow::Cow;

use base64ct::{Base64, Encoding};
use serde::de::{
    self, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess, VariantAccess,
    Visitor,
};
use serde::forward_to_deserialize_any;

use crate::config::{Config, DataEncoding};
use crate::error::DecodeError;
use crate::path::{Path, parse_index};
use crate::timestamp;
use crate::value::Node;

type Result<T> = std::result::Result<T, DecodeError>;

/// Decoder
pub struct Decoder<'a, 'de> {
    node: &'de Node,
    path: Path,
    config: &'a Config,
}

impl<'a, 'de> Decoder<'a, 'de> {
    pub fn new(node: &'de Node, config: &'a Config) -> Self {
        Decoder {
            node,
            path: Path::root(),
            config,
        }
    }

    fn at(node: &'de Node, path: Path, config: &'a Config) -> Self {
        Decoder { node, path, config }
    }

    pub fn decode<T: de::Deserialize<'de>>(self) -> Result<T> {
        let path = self.path.clone();
        T::deserialize(self).map_err(|e| e.locate(&path))
    }

    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| e.locate(&self.path))
    }

    fn mismatch(&self, expected: &str) -> DecodeError {
        DecodeError::type_mismatch(self.path.clone(), expected)
    }

    fn scalar(&self, expected: &str) -> Result<&'de str> {
        match self.node {
            Node::Scalar(text) => Ok(text),
            _ => Err(self.mismatch(expected)),
        }
    }

    /// Children of a node read as a sequence.
    ///
    /// A lone scalar is a one-element sequence (a single repeated key on the
    /// wire), the empty scalar is an empty one, and a mapping qualifies when
    /// its keys are exactly `0..n`.
    fn sequence_items(&self) -> Result<Vec<&'de Node>> {
        match self.node {
            Node::Sequence(items) => Ok(items.iter().collect()),
            Node::Scalar(text) if text.is_empty() => Ok(Vec::new()),
            Node::Scalar(_) => Ok(vec![self.node]),
            Node::Mapping(entries) => {
                let mut indexed = entries
                    .iter()
                    .map(|(key, node)| parse_index(key).map(|i| (i, node)))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| self.mismatch("contiguous sequence indices"))?;
                indexed.sort_by_key(|(i, _)| *i);
                if indexed.iter().enumerate().any(|(pos, (i, _))| pos != *i) {
                    return Err(self.mismatch("contiguous sequence indices"));
                }
                Ok(indexed.into_iter().map(|(_, node)| node).collect())
            }
        }
    }

    fn map_entries(&self, allow_sequence: bool) -> Result<Vec<(Cow<'de, str>, &'de Node)>> {
        match self.node {
            Node::Mapping(entries) => Ok(entries
                .iter()
                .map(|(key, node)| (Cow::Borrowed(key.as_str()), node))
                .collect()),
            Node::Sequence(items) if allow_sequence => Ok(items
                .iter()
                .enumerate()
                .map(|(i, node)| (Cow::Owned(i.to_string()), node))
                .collect()),
            Node::Scalar(text) if text.is_empty() => Ok(Vec::new()),
            _ => Err(self.mismatch("mapping")),
        }
    }

    fn seq_access(&self, items: Vec<&'de Node>) -> SeqDecoder<'a, 'de> {
        SeqDecoder {
            items: items.into_iter(),
            index: 0,
            path: self.path.clone(),
            config: self.config,
        }
    }

    fn map_access(&self, entries: Vec<(Cow<'de, str>, &'de Node)>) -> MapDecoder<'a, 'de> {
        MapDecoder {
            entries: entries.into_iter(),
            pending: None,
            path: self.path.clone(),
            config: self.config,
        }
    }

    fn decode_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        let items = self.sequence_items()?;
        let mut access = self.seq_access(items);
        let value = self.finish(visitor.visit_seq(&mut access))?;
        if !access.items.as_slice().is_empty() {
            return Err(self.mismatch(&format!("sequence of length {len}")));
        }
        Ok(value)
    }
}

macro_rules! decode_parsed {
    ($($method:ident => $visit:ident($ty:ty),)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let text = self.scalar(stringify!($ty))?;
                let value = text
                    .parse::<$ty>()
                    .map_err(|_| self.mismatch(stringify!($ty)))?;
                self.finish(visitor.$visit(value))
            }
        )*
    };
}

impl<'a, 'de> de::Deserializer<'de> for Decoder<'a, 'de> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node {
            Node::Scalar(text) => self.finish(visitor.visit_borrowed_str(text)),
            Node::Sequence(items) => {
                let mut access = self.seq_access(items.iter().collect());
                self.finish(visitor.visit_seq(&mut access))
            }
            Node::Mapping(_) => {
                let entries = self.map_entries(false)?;
                self.finish(visitor.visit_map(self.map_access(entries)))
            }
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let value = match self.scalar("bool")? {
            "true" => true,
            "false" => false,
            _ => return Err(self.mismatch("bool")),
        };
        self.finish(visitor.visit_bool(value))
    }

    decode_parsed! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_i128 => visit_i128(i128),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_u128 => visit_u128(u128),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let mut chars = self.scalar("char")?.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => self.finish(visitor.visit_char(c)),
            _ => Err(self.mismatch("char")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let text = self.scalar("string")?;
        self.finish(visitor.visit_borrowed_str(text))
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let config = self.config;
        match &config.data {
            DataEncoding::Deferred => self.deserialize_seq(visitor),
            DataEncoding::Base64 => {
                let text = self.scalar("base64 data")?;
                let bytes = Base64::decode_vec(text).map_err(|_| self.mismatch("base64 data"))?;
                self.finish(visitor.visit_byte_buf(bytes))
            }
            DataEncoding::Custom(codec) => {
                let text = self.scalar("data")?;
                let result = codec
                    .decode(text)
                    .map_err(<DecodeError as de::Error>::custom)
                    .and_then(|bytes| visitor.visit_byte_buf(bytes));
                self.finish(result)
            }
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.node.is_empty_scalar() {
            return self.finish(visitor.visit_none());
        }
        let path = self.path.clone();
        visitor.visit_some(self).map_err(|e| e.locate(&path))
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if !self.node.is_empty_scalar() {
            return Err(self.mismatch("empty value"));
        }
        self.finish(visitor.visit_unit())
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == timestamp::TOKEN {
            let text = self.scalar("timestamp")?;
            let canonical = timestamp::canonicalize(text, &self.config.dates)
                .map_err(|_| self.mismatch("timestamp"))?;
            return self.finish(visitor.visit_newtype_struct(canonical.into_deserializer()));
        }
        let path = self.path.clone();
        visitor
            .visit_newtype_struct(self)
            .map_err(|e| e.locate(&path))
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let items = self.sequence_items()?;
        let mut access = self.seq_access(items);
        self.finish(visitor.visit_seq(&mut access))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        self.decode_tuple(len, visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.decode_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let entries = self.map_entries(true)?;
        self.finish(visitor.visit_map(self.map_access(entries)))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let entries = self.map_entries(false)?;
        self.finish(visitor.visit_map(self.map_access(entries)))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.node {
            Node::Scalar(text) => {
                let access: de::value::BorrowedStrDeserializer<'de, DecodeError> =
                    de::value::BorrowedStrDeserializer::new(text);
                self.finish(visitor.visit_enum(access))
            }
            Node::Mapping(entries) if entries.len() == 1 => {
                let (variant, content) = &entries[0];
                let access = EnumDecoder {
                    variant,
                    content,
                    path: self.path.key(variant.as_str()),
                    config: self.config,
                };
                self.finish(visitor.visit_enum(access))
            }
            _ => Err(self.mismatch("enum")),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.finish(visitor.visit_unit())
    }
}

struct SeqDecoder<'a, 'de> {
    items: std::vec::IntoIter<&'de Node>,
    index: usize,
    path: Path,
    config: &'a Config,
}

impl<'de> SeqAccess<'de> for SeqDecoder<'_, 'de> {
    type Error = DecodeError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        let Some(node) = self.items.next() else {
            return Ok(None);
        };
        let path = self.path.index(self.index);
        self.index += 1;
        let decoder = Decoder::at(node, path.clone(), self.config);
        seed.deserialize(decoder)
            .map(Some)
            .map_err(|e| e.locate(&path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct MapDecoder<'a, 'de> {
    entries: std::vec::IntoIter<(Cow<'de, str>, &'de Node)>,
    pending: Option<(Path, &'de Node)>,
    path: Path,
    config: &'a Config,
}

impl<'de> MapAccess<'de> for MapDecoder<'_, 'de> {
    type Error = DecodeError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        let Some((key, node)) = self.entries.next() else {
            return Ok(None);
        };
        let path = self.path.key(&*key);
        self.pending = Some((path.clone(), node));
        seed.deserialize(KeyDecoder { key, path: &path })
            .map(Some)
            .map_err(|e| e.locate(&path))
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        let (path, node) = self
            .pending
            .take()
            .ok_or_else(|| <DecodeError as de::Error>::custom("value requested before key"))?;
        let decoder = Decoder::at(node, path.clone(), self.config);
        seed.deserialize(decoder).map_err(|e| e.locate(&path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct EnumDecoder<'a, 'de> {
    variant: &'de str,
    content: &'de Node,
    path: Path,
    config: &'a Config,
}

impl<'a, 'de> EnumAccess<'de> for EnumDecoder<'a, 'de> {
    type Error = DecodeError;
    type Variant = Decoder<'a, 'de>;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self::Variant)>
    where
        V: DeserializeSeed<'de>,
    {
        let name: de::value::BorrowedStrDeserializer<'de, DecodeError> =
            de::value::BorrowedStrDeserializer::new(self.variant);
        let value = seed.deserialize(name)?;
        Ok((value, Decoder::at(self.content, self.path, self.config)))
    }
}

impl<'de> VariantAccess<'de> for Decoder<'_, 'de> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<()> {
        if self.node.is_empty_scalar() {
            Ok(())
        } else {
            Err(self.mismatch("unit variant"))
        }
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: DeserializeSeed<'de>,
    {
        let path = self.path.clone();
        seed.deserialize(self).map_err(|e| e.locate(&path))
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        self.decode_tuple(len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_struct(self, "", fields, visitor)
    }
}

/// Reads mapping keys, parsing them when the target is not a string
struct KeyDecoder<'p, 'de> {
    key: Cow<'de, str>,
    path: &'p Path,
}

macro_rules! decode_key {
    ($($method:ident => $visit:ident($ty:ty),)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let value = self
                    .key
                    .parse::<$ty>()
                    .map_err(|_| DecodeError::type_mismatch(self.path.clone(), stringify!($ty)))?;
                visitor.$visit(value)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for KeyDecoder<'_, 'de> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.key {
            Cow::Borrowed(key) => visitor.visit_borrowed_str(key),
            Cow::Owned(key) => visitor.visit_string(key),
        }
    }

    decode_key! {
        deserialize_bool => visit_bool(bool),
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_i128 => visit_i128(i128),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_u128 => visit_u128(u128),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
        deserialize_char => visit_char(char),
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let access: de::value::CowStrDeserializer<'de, DecodeError> = self.key.into_deserializer();
        visitor.visit_enum(access)
    }

    forward_to_deserialize_any! {
        str string bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}
