//! Upload descriptors and validated uploaded files.

use serde::{Deserialize, Serialize};

use crate::error::MultipartError;
use crate::file_type::{DEFAULT_MAX_SIZE, FileType};

/// Describes one expected file field of a multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field_name: String,
    pub filename: String,
    pub file_type: FileType,
    /// Largest accepted payload in bytes. Default: [`DEFAULT_MAX_SIZE`]
    pub max_size: usize,
}

impl Upload {
    pub fn new(
        field_name: impl Into<String>,
        filename: impl Into<String>,
        file_type: FileType,
    ) -> Self {
        Upload {
            field_name: field_name.into(),
            filename: filename.into(),
            file_type,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Checks a payload against this upload.
    ///
    /// Emptiness and size are checked before any signature bytes are read.
    pub fn validate(&self, payload: &[u8]) -> Result<(), MultipartError> {
        let result = if payload.is_empty() {
            Err(MultipartError::EmptyData)
        } else if payload.len() > self.max_size {
            Err(MultipartError::FileTooLarge {
                size: payload.len(),
                max: self.max_size,
            })
        } else {
            self.file_type.validate(payload)
        };
        if let Err(err) = &result {
            tracing::debug!(
                field = %self.field_name,
                file_type = self.file_type.name(),
                size = payload.len(),
                error = %err,
                "rejected upload"
            );
        }
        result
    }
}

/// A file part that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub field_name: String,
    pub filename: String,
    pub content_type: Option<String>,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
