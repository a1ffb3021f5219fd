// Copyright 2026 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

//! File signature checks and upload gating

use formwire::{FileType, MultipartError, Upload};

const JPEG_PREFIX: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[test]
fn test_jpeg_signature() {
    assert!(FileType::JPEG.validate(&JPEG_PREFIX).is_ok());

    let err = FileType::PNG.validate(&JPEG_PREFIX).unwrap_err();
    println!("{err}");
    assert_eq!(
        err,
        MultipartError::ContentMismatch {
            expected: "PNG".to_string(),
            detected: "JPEG".to_string(),
        }
    );
}

#[test]
fn test_empty_payload_fails_first() {
    for file_type in FileType::builtins() {
        let upload = Upload::new("file", "f", file_type.clone()).with_max_size(0);
        assert_eq!(
            upload.validate(&[]),
            Err(MultipartError::EmptyData),
            "Expected EmptyData for {}",
            file_type.name()
        );
    }

    // a custom check that would panic is never reached
    let strict = FileType::custom("Strict", "application/x-strict", "strict", |_| {
        panic!("signature inspected for an empty payload")
    });
    let upload = Upload::new("file", "f.strict", strict);
    assert_eq!(upload.validate(&[]), Err(MultipartError::EmptyData));
}

#[test]
fn test_size_limit_ignores_signature() {
    let mut valid = PNG_SIGNATURE.to_vec();
    valid.extend_from_slice(&[0; 32]);
    let upload = Upload::new("avatar", "a.png", FileType::PNG).with_max_size(16);

    assert_eq!(
        upload.validate(&valid),
        Err(MultipartError::FileTooLarge { size: 40, max: 16 })
    );
    assert_eq!(
        upload.validate(&[0u8; 17]),
        Err(MultipartError::FileTooLarge { size: 17, max: 16 })
    );
    assert!(upload.validate(&PNG_SIGNATURE).is_ok());
}

#[test]
fn test_unknown_content_is_reported() {
    let err = FileType::PDF.validate(b"plain text").unwrap_err();
    assert_eq!(
        err,
        MultipartError::ContentMismatch {
            expected: "PDF".to_string(),
            detected: "unknown".to_string(),
        }
    );
    assert!(err.is_upload_rejection());
}

#[test]
fn test_detect_and_lookups() {
    assert_eq!(FileType::detect(&PNG_SIGNATURE).map(FileType::name), Some("PNG"));
    assert_eq!(FileType::detect(b"%PDF-1.4").map(FileType::name), Some("PDF"));
    assert!(FileType::detect(b"a,b,c\n1,2,3").is_none());

    assert_eq!(FileType::from_extension("JPEG").map(FileType::name), Some("JPEG"));
    assert_eq!(
        FileType::from_content_type("image/gif").map(FileType::extension),
        Some("gif")
    );
    assert!(FileType::CSV.accepts_content_type("text/csv; charset=utf-8"));
}
