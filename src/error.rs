//! Error types for structural encoding, decoding and multipart framing.
//!
//! Every failure is returned to the caller as a value; nothing in this crate
//! retries. Structural errors carry the [`Path`] of the node that failed.

use std::fmt;

use thiserror::Error;

use crate::path::Path;

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn location(path: &Path) -> String {
    if path.is_root() {
        String::new()
    } else {
        format!(" at `{path}`")
    }
}

/// A value could not be represented as a [`Node`](crate::Node) tree or on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot encode value{}: {reason}", location(.path))]
pub struct EncodeError {
    path: Path,
    reason: String,
    // false while the error is travelling out of a user `Serialize` impl
    located: bool,
}

impl EncodeError {
    pub fn new(path: Path, reason: impl Into<String>) -> Self {
        EncodeError {
            path,
            reason: reason.into(),
            located: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub(crate) fn locate(mut self, at: &Path) -> Self {
        if !self.located {
            self.path = at.join(&self.path);
            self.located = true;
        }
        self
    }
}

impl serde::ser::Error for EncodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        EncodeError {
            path: Path::root(),
            reason: msg.to_string(),
            located: false,
        }
    }
}

/// What went wrong while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// The wire text is not well formed
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// A required field is absent
    #[error("missing field")]
    MissingField,
    /// A node exists but cannot be read as the target type
    #[error("expected {expected}")]
    TypeMismatch { expected: String },
    /// A message raised by a `Deserialize` implementation
    #[error("{0}")]
    Message(String),
}

/// A wire string or [`Node`](crate::Node) tree could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}", location(.path))]
pub struct DecodeError {
    kind: DecodeErrorKind,
    path: Path,
    located: bool,
}

impl DecodeError {
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        DecodeError {
            kind: DecodeErrorKind::InvalidFormat(reason.into()),
            path: Path::root(),
            located: true,
        }
    }

    /// An [`InvalidFormat`](DecodeErrorKind::InvalidFormat) error located at `path`
    pub fn invalid_format_at(path: Path, reason: impl Into<String>) -> Self {
        DecodeError {
            kind: DecodeErrorKind::InvalidFormat(reason.into()),
            path,
            located: true,
        }
    }

    pub fn missing_field(path: Path) -> Self {
        DecodeError {
            kind: DecodeErrorKind::MissingField,
            path,
            located: true,
        }
    }

    pub fn type_mismatch(path: Path, expected: impl Into<String>) -> Self {
        DecodeError {
            kind: DecodeErrorKind::TypeMismatch {
                expected: expected.into(),
            },
            path,
            located: true,
        }
    }

    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_invalid_format(&self) -> bool {
        matches!(self.kind, DecodeErrorKind::InvalidFormat(_))
    }

    pub fn is_missing_field(&self) -> bool {
        matches!(self.kind, DecodeErrorKind::MissingField)
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self.kind, DecodeErrorKind::TypeMismatch { .. })
    }

    /// Anchors an error raised through serde (which knows nothing about
    /// paths) at the decoder position where it surfaced.
    pub(crate) fn locate(mut self, at: &Path) -> Self {
        if !self.located {
            self.path = at.join(&self.path);
            self.located = true;
        }
        self
    }
}

impl serde::de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DecodeError {
            kind: DecodeErrorKind::Message(msg.to_string()),
            path: Path::root(),
            located: false,
        }
    }

    fn missing_field(field: &'static str) -> Self {
        DecodeError {
            kind: DecodeErrorKind::MissingField,
            path: Path::root().key(field),
            located: false,
        }
    }
}

/// Errors from multipart framing, parsing and upload validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("file too large: {size} bytes exceeds limit of {max}")]
    FileTooLarge { size: usize, max: usize },

    #[error("invalid content type `{content_type}`")]
    InvalidContentType { content_type: String },

    #[error("file content does not match {expected} (detected {detected})")]
    ContentMismatch { expected: String, detected: String },

    #[error("file data is empty")]
    EmptyData,

    #[error("malformed multipart boundary: {reason}")]
    MalformedBoundary { reason: String },

    #[error("invalid multipart format: {reason}")]
    InvalidFormat { reason: String },

    #[error("cannot encode multipart part: {reason}")]
    Encoding { reason: String },
}

impl MultipartError {
    pub(crate) fn malformed_boundary(reason: impl Into<String>) -> Self {
        MultipartError::MalformedBoundary {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_format(reason: impl Into<String>) -> Self {
        MultipartError::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Check if this error was raised while validating an uploaded file
    pub fn is_upload_rejection(&self) -> bool {
        matches!(
            self,
            MultipartError::FileTooLarge { .. }
                | MultipartError::ContentMismatch { .. }
                | MultipartError::EmptyData
                | MultipartError::InvalidContentType { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_errors_locate_once() {
        let at = Path::root().key("user");
        let err = <DecodeError as serde::de::Error>::missing_field("name").locate(&at);
        assert!(err.is_missing_field());
        assert_eq!(err.path().to_string(), "user.name");

        // a second location attempt must not prefix again
        let err = err.locate(&Path::root().key("outer"));
        assert_eq!(err.path().to_string(), "user.name");
    }

    #[test]
    fn test_display() {
        let err = DecodeError::type_mismatch(Path::root().key("age"), "u32");
        assert_eq!(err.to_string(), "expected u32 at `age`");

        let err = DecodeError::invalid_format("unbalanced `[`");
        assert_eq!(err.to_string(), "invalid format: unbalanced `[`");

        let err = EncodeError::new(Path::root().key("tags").index(0), "nested container");
        assert_eq!(
            err.to_string(),
            "cannot encode value at `tags[0]`: nested container"
        );
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: Error = MultipartError::EmptyData.into();
        assert!(matches!(err, Error::Multipart(MultipartError::EmptyData)));
        assert!(MultipartError::EmptyData.is_upload_rejection());
        assert!(!MultipartError::malformed_boundary("x").is_upload_rejection());
    }
}
