//! # formwire
//!
//! HTML form codecs for serde: `application/x-www-form-urlencoded` and
//! `multipart/form-data`.
//!
//! Values travel through a format-neutral [`Node`] tree. The structural
//! [`Encoder`]/[`Decoder`] convert between typed values and trees; the
//! [`urlencoded`] and [`multipart`] modules convert between trees and wire bytes.
//!
//! ## Features
//! - Three key nesting conventions ([`Nesting`]):
//!   - repeated keys: `tag=a&tag=b`
//!   - bracket paths: `user[profile][name]=John`
//!   - indexed brackets: `items[0]=apple&items[1]=banana`
//! - Timestamp strategies for [`Timestamp`] leaves (RFC 3339, epoch seconds or
//!   milliseconds, ISO 8601, strftime patterns, closures)
//! - Byte string strategies for `serde_bytes` fields (base64, per-byte, closures)
//! - Errors located by field path, e.g. `expected u32 at \`user.age\``
//! - Multipart framing with generated boundaries and header-injection safe
//!   parameter quoting
//! - File uploads checked against size limits and format signatures ([`FileType`])
//!
//! ## Example
//! ```rust
//! use formwire::{Config, Nesting, from_str_with, to_string_with};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Profile {
//!     name: String,
//! }
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct User {
//!     profile: Profile,
//!     tags: Vec<String>,
//! }
//!
//! let config = Config::default().with_nesting(Nesting::Brackets);
//! let user = User {
//!     profile: Profile { name: "John".into() },
//!     tags: vec!["admin".into(), "ops".into()],
//! };
//!
//! let wire = to_string_with(&user, &config).unwrap();
//! assert_eq!(wire, "profile[name]=John&tags[0]=admin&tags[1]=ops");
//!
//! let back: User = from_str_with(&wire, &config).unwrap();
//! assert_eq!(back, user);
//! ```

use serde::Serialize;
use serde::de::{Deserialize, DeserializeOwned};

mod config;
mod conversion;
mod de;
mod error;
mod file_type;
pub mod multipart;
mod path;
mod ser;
mod timestamp;
mod upload;
pub mod urlencoded;
mod value;

pub use config::{Config, DataCodec, DataEncoding, DateCodec, DateEncoding, Nesting};
pub use conversion::{Conversion, Multipart, UrlEncoded};
pub use de::Decoder;
pub use error::{DecodeError, DecodeErrorKind, EncodeError, Error, MultipartError, Result};
pub use file_type::{Check, DEFAULT_MAX_SIZE, FileType, Signature};
pub use multipart::{Boundary, Part};
pub use path::{Path, Segment};
pub use ser::Encoder;
pub use timestamp::Timestamp;
pub use upload::{Upload, UploadedFile};
pub use value::Node;

/// Encodes a value into a [`Node`] tree
pub fn to_node<T: ?Sized + Serialize>(value: &T, config: &Config) -> Result<Node, EncodeError> {
    Encoder::new(config).encode(value)
}

/// Decodes a value from a [`Node`] tree, borrowing strings from it where possible
pub fn from_node<'de, T: Deserialize<'de>>(node: &'de Node, config: &Config) -> Result<T, DecodeError> {
    Decoder::new(node, config).decode()
}

/// Encodes a value as a urlencoded string with the default [`Config`]
pub fn to_string<T: ?Sized + Serialize>(value: &T) -> Result<String> {
    to_string_with(value, &Config::default())
}

pub fn to_string_with<T: ?Sized + Serialize>(value: &T, config: &Config) -> Result<String> {
    let node = to_node(value, config)?;
    Ok(urlencoded::serialize(&node, config)?)
}

/// Decodes a value from a urlencoded string with the default [`Config`]
pub fn from_str<T: DeserializeOwned>(wire: &str) -> Result<T> {
    from_str_with(wire, &Config::default())
}

pub fn from_str_with<T: DeserializeOwned>(wire: &str, config: &Config) -> Result<T> {
    let node = urlencoded::parse(wire, config.nesting)?;
    Ok(from_node(&node, config)?)
}
