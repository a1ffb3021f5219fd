//! Encoding and decoding configuration.
//!
//! A [`Config`] is an immutable value. Build it once, then pass it by
//! reference to every encode and decode call; both directions must use the
//! same configuration for values to round-trip.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// How sequences and mappings are flattened into keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Nesting {
    /// Repeated bare keys: `tag=a&tag=b`. Mappings still use `parent[key]`.
    #[default]
    Accumulate,
    /// Every bracket segment is a mapping key: `user[profile][name]=John`
    Brackets,
    /// Integer bracket segments address sequence slots: `items[0]=x&items[1]=y`
    Indexed,
}

/// How [`Timestamp`](crate::Timestamp) leaves are rendered.
#[derive(Debug, Clone, Default)]
pub enum DateEncoding {
    /// RFC 3339 text, as the timestamp renders itself
    #[default]
    Deferred,
    /// Whole seconds since the Unix epoch (sub-second precision is dropped)
    SecondsSinceEpoch,
    /// Milliseconds since the Unix epoch
    MillisecondsSinceEpoch,
    /// `yyyy-MM-ddTHH:mm:ss.SSS+00:00`, UTC with millisecond precision
    Iso8601,
    /// A chrono `strftime` pattern
    Formatted(String),
    /// Caller-supplied closures
    Custom(DateCodec),
}

/// How byte strings (`serde_bytes` fields) are rendered.
#[derive(Debug, Clone, Default)]
pub enum DataEncoding {
    /// One decimal scalar per byte
    Deferred,
    /// Standard padded base64
    #[default]
    Base64,
    /// Caller-supplied closures
    Custom(DataCodec),
}

type DateEncodeFn = dyn Fn(&DateTime<Utc>) -> Result<String, String> + Send + Sync;
type DateDecodeFn = dyn Fn(&str) -> Result<DateTime<Utc>, String> + Send + Sync;
type DataEncodeFn = dyn Fn(&[u8]) -> Result<String, String> + Send + Sync;
type DataDecodeFn = dyn Fn(&str) -> Result<Vec<u8>, String> + Send + Sync;

/// A pair of closures converting timestamps to and from text.
#[derive(Clone)]
pub struct DateCodec {
    encode: Arc<DateEncodeFn>,
    decode: Arc<DateDecodeFn>,
}

impl DateCodec {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&DateTime<Utc>) -> Result<String, String> + Send + Sync + 'static,
        D: Fn(&str) -> Result<DateTime<Utc>, String> + Send + Sync + 'static,
    {
        DateCodec {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    pub fn encode(&self, value: &DateTime<Utc>) -> Result<String, String> {
        (self.encode)(value)
    }

    pub fn decode(&self, text: &str) -> Result<DateTime<Utc>, String> {
        (self.decode)(text)
    }
}

impl fmt::Debug for DateCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DateCodec(..)")
    }
}

/// A pair of closures converting byte strings to and from text.
#[derive(Clone)]
pub struct DataCodec {
    encode: Arc<DataEncodeFn>,
    decode: Arc<DataDecodeFn>,
}

impl DataCodec {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&[u8]) -> Result<String, String> + Send + Sync + 'static,
        D: Fn(&str) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        DataCodec {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    pub fn encode(&self, value: &[u8]) -> Result<String, String> {
        (self.encode)(value)
    }

    pub fn decode(&self, text: &str) -> Result<Vec<u8>, String> {
        (self.decode)(text)
    }
}

impl fmt::Debug for DataCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataCodec(..)")
    }
}

/// Strategy selection shared by the structural encoder/decoder and the wire formats.
#[derive(Debug, Clone)]
pub struct Config {
    /// Key nesting convention. Default: [`Nesting::Accumulate`]
    pub nesting: Nesting,
    /// Timestamp rendering. Default: [`DateEncoding::Deferred`]
    pub dates: DateEncoding,
    /// Byte string rendering. Default: [`DataEncoding::Base64`]
    pub data: DataEncoding,
    /// Sort mapping keys when flattening, for deterministic output. Default: `true`
    pub sort_keys: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            nesting: Nesting::default(),
            dates: DateEncoding::default(),
            data: DataEncoding::default(),
            sort_keys: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_nesting(mut self, nesting: Nesting) -> Self {
        self.nesting = nesting;
        self
    }

    #[must_use]
    pub fn with_dates(mut self, dates: DateEncoding) -> Self {
        self.dates = dates;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: DataEncoding) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_sort_keys(mut self, sort_keys: bool) -> Self {
        self.sort_keys = sort_keys;
        self
    }
}
