//! Body conversions for a routing layer: typed values to request bodies and back.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{DecodeError, EncodeError, MultipartError, Result};
use crate::multipart::{self, Boundary, Part};
use crate::path::Path;
use crate::upload::{Upload, UploadedFile};
use crate::urlencoded::{self, TreeBuilder, key_segments, render_key};
use crate::{from_node, to_node};

const OCTET_STREAM: &str = "application/octet-stream";

/// A body format a value can be encoded to and decoded from.
pub trait Conversion {
    /// Value for the `Content-Type` header of encoded bodies
    fn content_type(&self) -> String;

    fn encode<T: ?Sized + Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T>;
}

/// `application/x-www-form-urlencoded` bodies
#[derive(Debug, Clone, Default)]
pub struct UrlEncoded {
    config: Config,
}

impl UrlEncoded {
    pub fn new(config: Config) -> Self {
        UrlEncoded { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Conversion for UrlEncoded {
    fn content_type(&self) -> String {
        "application/x-www-form-urlencoded".to_owned()
    }

    fn encode<T: ?Sized + Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let node = to_node(value, &self.config)?;
        Ok(urlencoded::serialize(&node, &self.config)?.into_bytes())
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T> {
        let wire = std::str::from_utf8(body)
            .map_err(|_| DecodeError::invalid_format("urlencoded body is not valid UTF-8"))?;
        let node = urlencoded::parse(wire, self.config.nesting)?;
        Ok(from_node(&node, &self.config)?)
    }
}

/// `multipart/form-data` bodies.
///
/// The boundary is chosen when the conversion is built and used for both
/// directions, so one instance decodes what it encoded.
///
/// # Example
/// ```
/// use formwire::{Config, Conversion, Multipart};
/// use std::collections::BTreeMap;
///
/// let conversion = Multipart::new(Config::default());
/// let mut form = BTreeMap::new();
/// form.insert("title".to_string(), "Hello, world".to_string());
///
/// let body = conversion.encode(&form).unwrap();
/// let back: BTreeMap<String, String> = conversion.decode(&body).unwrap();
/// assert_eq!(back, form);
/// ```
#[derive(Debug, Clone)]
pub struct Multipart {
    config: Config,
    boundary: Boundary,
}

impl Multipart {
    pub fn new(config: Config) -> Self {
        Multipart {
            config,
            boundary: Boundary::generate(),
        }
    }

    pub fn with_boundary(config: Config, boundary: Boundary) -> Self {
        Multipart { config, boundary }
    }

    /// Builds a conversion for an incoming body from its `Content-Type` header
    pub fn for_content_type(config: Config, header: &str) -> Result<Self, MultipartError> {
        let boundary = multipart::boundary_from_content_type(header)?;
        Ok(Multipart { config, boundary })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// One text part per leaf of the encoded value.
    ///
    /// Part names use bracket keys like the urlencoded form, and part bodies
    /// carry the plain scalar text without percent-encoding.
    pub fn to_parts<T: ?Sized + Serialize>(&self, value: &T) -> Result<Vec<Part>> {
        let node = to_node(value, &self.config)?;
        let pairs = urlencoded::flatten(&node, &self.config)?;
        pairs
            .into_iter()
            .map(|pair| -> Result<Part> {
                if pair.segments.is_empty() {
                    return Err(EncodeError::new(
                        Path::root(),
                        "a multipart body needs named fields",
                    )
                    .into());
                }
                Ok(Part::text(render_key(&pair.segments, false), pair.value))
            })
            .collect()
    }

    /// Decodes the text parts; file parts are skipped.
    pub fn from_parts<T: DeserializeOwned>(&self, parts: &[Part]) -> Result<T> {
        let mut builder = TreeBuilder::new(self.config.nesting);
        for part in parts.iter().filter(|part| !part.is_file()) {
            let value = part.text_value().ok_or_else(|| {
                DecodeError::invalid_format(format!("part `{}` is not valid UTF-8", part.name))
            })?;
            let segments = key_segments(&part.name, false)?;
            builder.insert(&segments, value.to_owned())?;
        }
        let node = builder.finish();
        Ok(from_node(&node, &self.config)?)
    }

    /// Encodes a value followed by one validated file part per upload.
    pub fn encode_with_files<T: ?Sized + Serialize>(
        &self,
        value: &T,
        files: &[(&Upload, &[u8])],
    ) -> Result<Vec<u8>> {
        let mut parts = self.to_parts(value)?;
        for (upload, payload) in files {
            upload.validate(payload)?;
            parts.push(Part::file(
                upload.field_name.as_str(),
                upload.filename.as_str(),
                upload.file_type.content_type(),
                payload.to_vec(),
            ));
        }
        Ok(multipart::frame(&parts, &self.boundary)?)
    }

    /// Decodes the text parts into `T` and validates one file part per upload.
    pub fn decode_with_files<T: DeserializeOwned>(
        &self,
        body: &[u8],
        uploads: &[Upload],
    ) -> Result<(T, Vec<UploadedFile>)> {
        let parts = multipart::parse(body, &self.boundary)?;
        let value = self.from_parts(&parts)?;

        let mut files = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let part = parts
                .iter()
                .find(|part| part.is_file() && part.name == upload.field_name)
                .ok_or_else(|| DecodeError::missing_field(Path::root().key(upload.field_name.as_str())))?;

            if let Some(content_type) = &part.content_type {
                let generic = content_type.eq_ignore_ascii_case(OCTET_STREAM);
                if !generic && !upload.file_type.accepts_content_type(content_type) {
                    return Err(MultipartError::InvalidContentType {
                        content_type: content_type.clone(),
                    }
                    .into());
                }
            }
            upload.validate(&part.payload)?;

            files.push(UploadedFile {
                field_name: upload.field_name.clone(),
                filename: part
                    .filename
                    .clone()
                    .unwrap_or_else(|| upload.filename.clone()),
                content_type: part.content_type.clone(),
                data: part.payload.clone(),
            });
        }

        for part in parts.iter().filter(|part| part.is_file()) {
            if !uploads.iter().any(|upload| upload.field_name == part.name) {
                tracing::debug!(field = %part.name, "ignoring unexpected file part");
            }
        }
        Ok((value, files))
    }
}

impl Conversion for Multipart {
    fn content_type(&self) -> String {
        let boundary = self.boundary.as_str();
        if boundary.contains(|c: char| !c.is_ascii_alphanumeric() && !"-_.'+".contains(c)) {
            format!("multipart/form-data; boundary=\"{boundary}\"")
        } else {
            format!("multipart/form-data; boundary={boundary}")
        }
    }

    fn encode<T: ?Sized + Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let parts = self.to_parts(value)?;
        Ok(multipart::frame(&parts, &self.boundary)?)
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T> {
        let parts = multipart::parse(body, &self.boundary)?;
        self.from_parts(&parts)
    }
}
