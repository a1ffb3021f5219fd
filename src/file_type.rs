//! File formats accepted for uploads, identified by their leading bytes.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::MultipartError;

/// Default upload size limit: 10 MiB
pub const DEFAULT_MAX_SIZE: usize = 10 * 1024 * 1024;

/// A byte sequence expected at a fixed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub offset: usize,
    pub bytes: &'static [u8],
}

impl Signature {
    pub const fn at(offset: usize, bytes: &'static [u8]) -> Self {
        Signature { offset, bytes }
    }

    fn matches(&self, payload: &[u8]) -> bool {
        payload.get(self.offset..self.offset + self.bytes.len()) == Some(self.bytes)
    }
}

type CheckFn = dyn Fn(&[u8]) -> bool + Send + Sync;

/// How a payload is recognised
#[derive(Clone)]
pub enum Check {
    /// Matches when every signature of at least one group matches
    Signatures(&'static [&'static [Signature]]),
    /// Any valid UTF-8 text
    Utf8,
    Custom(Arc<CheckFn>),
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Signatures(groups) => f.debug_tuple("Signatures").field(groups).finish(),
            Check::Utf8 => f.write_str("Utf8"),
            Check::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

macro_rules! sig {
    ($offset:expr, $bytes:expr) => {
        Signature {
            offset: $offset,
            bytes: $bytes,
        }
    };
}

// ISO-BMFF: the `ftyp` box type, then the major brand
const FTYP: Signature = sig!(4, b"ftyp");

const HEIC_BRANDS: &[&[Signature]] = &[
    &[FTYP, sig!(8, b"heic")],
    &[FTYP, sig!(8, b"heix")],
    &[FTYP, sig!(8, b"heim")],
    &[FTYP, sig!(8, b"heis")],
    &[FTYP, sig!(8, b"hevc")],
    &[FTYP, sig!(8, b"hevx")],
    &[FTYP, sig!(8, b"mif1")],
    &[FTYP, sig!(8, b"msf1")],
];

const AVIF_BRANDS: &[&[Signature]] = &[&[FTYP, sig!(8, b"avif")], &[FTYP, sig!(8, b"avis")]];

/// A declared upload format
#[derive(Clone)]
pub struct FileType {
    name: Cow<'static, str>,
    content_type: Cow<'static, str>,
    extension: Cow<'static, str>,
    check: Check,
}

impl FileType {
    pub const JPEG: FileType = FileType::builtin(
        "JPEG",
        "image/jpeg",
        "jpg",
        &[&[sig!(0, &[0xFF, 0xD8, 0xFF])]],
    );

    pub const PNG: FileType = FileType::builtin(
        "PNG",
        "image/png",
        "png",
        &[&[sig!(0, &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A])]],
    );

    pub const GIF: FileType = FileType::builtin(
        "GIF",
        "image/gif",
        "gif",
        &[&[sig!(0, b"GIF87a")], &[sig!(0, b"GIF89a")]],
    );

    pub const WEBP: FileType = FileType::builtin(
        "WEBP",
        "image/webp",
        "webp",
        &[&[sig!(0, b"RIFF"), sig!(8, b"WEBP")]],
    );

    pub const TIFF: FileType = FileType::builtin(
        "TIFF",
        "image/tiff",
        "tiff",
        &[
            &[sig!(0, b"II*\0")],
            &[sig!(0, b"MM\0*")],
        ],
    );

    pub const BMP: FileType = FileType::builtin(
        "BMP",
        "image/bmp",
        "bmp",
        &[&[sig!(0, b"BM")]],
    );

    pub const HEIC: FileType = FileType::builtin(
        "HEIC",
        "image/heic",
        "heic",
        HEIC_BRANDS,
    );

    pub const AVIF: FileType = FileType::builtin(
        "AVIF",
        "image/avif",
        "avif",
        AVIF_BRANDS,
    );

    pub const PDF: FileType = FileType::builtin(
        "PDF",
        "application/pdf",
        "pdf",
        &[&[sig!(0, b"%PDF")]],
    );

    /// CSV has no signature; any UTF-8 payload is accepted
    pub const CSV: FileType = FileType {
        name: Cow::Borrowed("CSV"),
        content_type: Cow::Borrowed("text/csv"),
        extension: Cow::Borrowed("csv"),
        check: Check::Utf8,
    };

    const fn builtin(
        name: &'static str,
        content_type: &'static str,
        extension: &'static str,
        signatures: &'static [&'static [Signature]],
    ) -> Self {
        FileType {
            name: Cow::Borrowed(name),
            content_type: Cow::Borrowed(content_type),
            extension: Cow::Borrowed(extension),
            check: Check::Signatures(signatures),
        }
    }

    /// A caller-defined type validated by a closure
    ///
    /// # Example
    /// ```
    /// use formwire::FileType;
    ///
    /// let json = FileType::custom("JSON", "application/json", "json", |data| {
    ///     data.first() == Some(&b'{')
    /// });
    /// assert!(json.validate(b"{}").is_ok());
    /// assert!(json.validate(b"[]").is_err());
    /// ```
    pub fn custom<F>(
        name: impl Into<String>,
        content_type: impl Into<String>,
        extension: impl Into<String>,
        check: F,
    ) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        FileType {
            name: Cow::Owned(name.into()),
            content_type: Cow::Owned(content_type.into()),
            extension: Cow::Owned(extension.into()),
            check: Check::Custom(Arc::new(check)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn check(&self) -> &Check {
        &self.check
    }

    /// All built-in types
    pub fn builtins() -> &'static [FileType] {
        &BUILTINS
    }

    /// Looks up a built-in type by extension, with or without the leading dot
    pub fn from_extension(extension: &str) -> Option<&'static FileType> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        let extension = match extension.as_str() {
            "jpeg" | "jpe" => "jpg",
            "tif" => "tiff",
            "heif" => "heic",
            other => other,
        };
        BUILTINS.iter().find(|t| t.extension == extension)
    }

    /// Looks up a built-in type by media type, ignoring parameters and case
    pub fn from_content_type(content_type: &str) -> Option<&'static FileType> {
        let media_type = media_type(content_type);
        BUILTINS
            .iter()
            .find(|t| t.content_type.eq_ignore_ascii_case(media_type))
    }

    /// Identifies a payload by signature; types without one are never detected
    pub fn detect(payload: &[u8]) -> Option<&'static FileType> {
        BUILTINS
            .iter()
            .find(|t| matches!(t.check, Check::Signatures(_)) && t.matches(payload))
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        match &self.check {
            Check::Signatures(groups) => groups
                .iter()
                .any(|group| group.iter().all(|signature| signature.matches(payload))),
            Check::Utf8 => std::str::from_utf8(payload).is_ok(),
            Check::Custom(check) => check(payload),
        }
    }

    pub fn validate(&self, payload: &[u8]) -> Result<(), MultipartError> {
        if self.matches(payload) {
            return Ok(());
        }
        let detected = FileType::detect(payload).map_or("unknown", FileType::name);
        Err(MultipartError::ContentMismatch {
            expected: self.name.to_string(),
            detected: detected.to_owned(),
        })
    }

    /// True when `content_type` names the same media type as this file type
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        self.content_type
            .eq_ignore_ascii_case(media_type(content_type))
    }
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

impl fmt::Debug for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileType")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

static BUILTINS: [FileType; 10] = [
    FileType::JPEG,
    FileType::PNG,
    FileType::GIF,
    FileType::WEBP,
    FileType::TIFF,
    FileType::BMP,
    FileType::HEIC,
    FileType::AVIF,
    FileType::PDF,
    FileType::CSV,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn isobmff(brand: &[u8; 4]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0x18];
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(brand);
        data.extend_from_slice(&[0; 12]);
        data
    }

    #[test]
    fn test_builtin_signatures() {
        assert!(FileType::JPEG.matches(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(FileType::GIF.matches(b"GIF87a..."));
        assert!(FileType::GIF.matches(b"GIF89a..."));
        assert!(!FileType::GIF.matches(b"GIF88a..."));
        assert!(FileType::WEBP.matches(b"RIFF\x24\0\0\0WEBPVP8 "));
        assert!(!FileType::WEBP.matches(b"RIFF\x24\0\0\0WAVEfmt "));
        assert!(FileType::TIFF.matches(b"II*\0\x08\0\0\0"));
        assert!(FileType::TIFF.matches(b"MM\0*\0\0\0\x08"));
        assert!(FileType::BMP.matches(b"BM\x36\0"));
        assert!(FileType::PDF.matches(b"%PDF-1.7"));
        assert!(FileType::HEIC.matches(&isobmff(b"heic")));
        assert!(FileType::HEIC.matches(&isobmff(b"mif1")));
        assert!(FileType::AVIF.matches(&isobmff(b"avif")));
        assert!(!FileType::AVIF.matches(&isobmff(b"heic")));
    }

    #[test]
    fn test_short_payload_does_not_match() {
        assert!(!FileType::PNG.matches(&[0x89, 0x50]));
        assert!(!FileType::WEBP.matches(b"RIFF"));
    }

    #[test]
    fn test_csv_is_utf8_only() {
        assert!(FileType::CSV.matches("name,age\nAlice,30\n".as_bytes()));
        assert!(!FileType::CSV.matches(&[0xFF, 0xFE]));
        // CSV has no signature, so text is never detected as CSV
        assert!(FileType::detect(b"a,b").is_none());
    }

    #[test]
    fn test_validate_reports_detected_type() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0];
        let err = FileType::JPEG.validate(&png).unwrap_err();
        assert_eq!(
            err,
            MultipartError::ContentMismatch {
                expected: "JPEG".into(),
                detected: "PNG".into(),
            }
        );

        let err = FileType::JPEG.validate(b"plain text").unwrap_err();
        assert!(matches!(err, MultipartError::ContentMismatch { ref detected, .. } if detected == "unknown"));
    }

    #[test]
    fn test_lookups() {
        assert_eq!(FileType::builtins().len(), 10);
        assert_eq!(FileType::from_extension(".JPEG").map(FileType::name), Some("JPEG"));
        assert_eq!(FileType::from_extension("tif").map(FileType::name), Some("TIFF"));
        assert!(FileType::from_extension("exe").is_none());
        assert_eq!(
            FileType::from_content_type("Image/PNG; q=0.9").map(FileType::name),
            Some("PNG")
        );
        assert_eq!(FileType::detect(b"%PDF-1.4").map(FileType::name), Some("PDF"));
        assert!(FileType::PDF.accepts_content_type("application/pdf; charset=binary"));
        assert!(!FileType::PDF.accepts_content_type("image/png"));
    }

    #[test]
    fn test_custom_type() {
        let zip = FileType::custom("ZIP", "application/zip", "zip", |data| {
            data.starts_with(b"PK\x03\x04")
        });
        assert!(zip.validate(b"PK\x03\x04rest").is_ok());
        assert!(zip.validate(b"%PDF").is_err());
        assert_eq!(format!("{:?}", zip.check()), "Custom(..)");
    }
}
