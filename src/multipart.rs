//! `multipart/form-data` framing and parsing.

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::MultipartError;

const BOUNDARY_PREFIX: &str = "FormBoundary";
const BOUNDARY_RANDOM_LEN: usize = 24;
const MAX_BOUNDARY_LEN: usize = 70;
const CRLF: &[u8] = b"\r\n";

/// A multipart delimiter token, stored without the leading `--`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary(String);

impl Boundary {
    /// A fresh `FormBoundary` token followed by 24 random alphanumerics
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BOUNDARY_RANDOM_LEN)
            .map(char::from)
            .collect();
        let boundary = Boundary(format!("{BOUNDARY_PREFIX}{token}"));
        tracing::trace!(%boundary, "generated multipart boundary");
        boundary
    }

    /// Validates a caller-supplied boundary against the RFC 2046 grammar
    pub fn new(value: impl Into<String>) -> Result<Self, MultipartError> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_BOUNDARY_LEN {
            return Err(MultipartError::malformed_boundary(format!(
                "boundary must be 1 to {MAX_BOUNDARY_LEN} characters"
            )));
        }
        if let Some(c) = value.chars().find(|c| !is_bchar(*c)) {
            return Err(MultipartError::malformed_boundary(format!(
                "character {c:?} is not allowed in a boundary"
            )));
        }
        if value.ends_with(' ') {
            return Err(MultipartError::malformed_boundary(
                "boundary must not end with a space",
            ));
        }
        Ok(Boundary(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn delimiter(&self) -> Vec<u8> {
        let mut delimiter = Vec::with_capacity(self.0.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(self.0.as_bytes());
        delimiter
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_bchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
}

/// Reads the boundary out of a `multipart/form-data; boundary=...` header value.
pub fn boundary_from_content_type(header: &str) -> Result<Boundary, MultipartError> {
    let mut params = header.split(';');
    let media_type = params.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::InvalidContentType {
            content_type: header.to_owned(),
        });
    }
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            return Boundary::new(value);
        }
    }
    Err(MultipartError::malformed_boundary(
        "content type has no boundary parameter",
    ))
}

/// One body part of a multipart message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
}

impl Part {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Part {
            name: name.into(),
            filename: None,
            content_type: None,
            payload: value.into().into_bytes(),
        }
    }

    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Part {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            payload: payload.into(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// The payload as text, if it is valid UTF-8
    pub fn text_value(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Strips CR and LF, then escapes `\` and `"` for a quoted header parameter.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\r' | '\n' => {}
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            _ => quoted.push(c),
        }
    }
    quoted
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c)
}

fn validate_content_type(value: &str) -> Result<(), MultipartError> {
    let invalid = || MultipartError::InvalidContentType {
        content_type: value.to_owned(),
    };
    if !value.chars().all(|c| c == '\t' || (' '..='~').contains(&c)) {
        return Err(invalid());
    }
    let media_type = value.split(';').next().unwrap_or_default().trim();
    let (kind, subtype) = media_type.split_once('/').ok_or_else(invalid)?;
    let is_token = |s: &str| !s.is_empty() && s.chars().all(is_token_char);
    if is_token(kind) && is_token(subtype) {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Frames parts into a multipart body delimited by `boundary`.
///
/// Names and filenames lose any CR/LF characters so a part can never smuggle
/// extra header lines.
pub fn frame(parts: &[Part], boundary: &Boundary) -> Result<Vec<u8>, MultipartError> {
    let delimiter = boundary.delimiter();
    let mut body = Vec::new();
    for part in parts {
        let name = quote(&part.name);
        if name.is_empty() {
            return Err(MultipartError::Encoding {
                reason: "part name is empty".to_owned(),
            });
        }

        body.extend_from_slice(&delimiter);
        body.extend_from_slice(CRLF);
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"");
        body.extend_from_slice(name.as_bytes());
        body.push(b'"');
        if let Some(filename) = &part.filename {
            body.extend_from_slice(b"; filename=\"");
            body.extend_from_slice(quote(filename).as_bytes());
            body.push(b'"');
        }
        body.extend_from_slice(CRLF);
        if let Some(content_type) = &part.content_type {
            validate_content_type(content_type)?;
            body.extend_from_slice(b"Content-Type: ");
            body.extend_from_slice(content_type.as_bytes());
            body.extend_from_slice(CRLF);
        }
        body.extend_from_slice(CRLF);
        body.extend_from_slice(&part.payload);
        body.extend_from_slice(CRLF);
    }
    body.extend_from_slice(&delimiter);
    body.extend_from_slice(b"--");
    body.extend_from_slice(CRLF);

    tracing::trace!(parts = parts.len(), bytes = body.len(), "framed multipart body");
    Ok(body)
}

/// Parses a multipart body into its parts, in body order.
///
/// The preamble before the first delimiter and the epilogue after the
/// closing one are discarded.
pub fn parse(body: &[u8], boundary: &Boundary) -> Result<Vec<Part>, MultipartError> {
    let delimiter = boundary.delimiter();
    let mut pos = find_delimiter(body, &delimiter, 0)
        .ok_or_else(|| MultipartError::malformed_boundary("no delimiter found in body"))?;

    let mut parts = Vec::new();
    loop {
        let mut cursor = pos + delimiter.len();
        if body[cursor..].starts_with(b"--") {
            break;
        }
        while body.get(cursor).is_some_and(|b| matches!(b, b' ' | b'\t')) {
            cursor += 1;
        }
        if !body[cursor..].starts_with(CRLF) {
            return Err(MultipartError::invalid_format("expected CRLF after delimiter"));
        }
        cursor += CRLF.len();

        let (headers, payload_start) = read_headers(body, cursor)?;
        let disposition = header(&headers, "content-disposition").ok_or_else(|| {
            MultipartError::invalid_format("part is missing a Content-Disposition header")
        })?;
        let (name, filename) = parse_disposition(disposition)?;
        let content_type = header(&headers, "content-type").map(str::to_owned);

        // an empty payload puts the next delimiter right after the blank line
        let next = find_delimiter(body, &delimiter, payload_start + CRLF.len()).ok_or_else(
            || MultipartError::malformed_boundary("missing closing delimiter"),
        )?;
        parts.push(Part {
            name,
            filename,
            content_type,
            payload: body[payload_start..next - CRLF.len()].to_vec(),
        });
        pos = next;
    }

    tracing::trace!(parts = parts.len(), bytes = body.len(), "parsed multipart body");
    Ok(parts)
}

/// Position of the next delimiter line at or after `from`.
///
/// A match must start the body or follow CRLF, and be followed by CRLF,
/// `--`, or transport padding.
fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let last = body.len().checked_sub(delimiter.len())?;
    (from..=last).find(|&i| {
        if !body[i..].starts_with(delimiter) {
            return false;
        }
        if i != 0 && (i < 2 || &body[i - 2..i] != CRLF) {
            return false;
        }
        let rest = &body[i + delimiter.len()..];
        rest.starts_with(CRLF)
            || rest.starts_with(b"--")
            || rest.first().is_some_and(|b| matches!(b, b' ' | b'\t'))
    })
}

fn read_headers(body: &[u8], start: usize) -> Result<(Vec<(String, String)>, usize), MultipartError> {
    let mut headers = Vec::new();
    let mut pos = start;
    loop {
        let line_end = body[pos..]
            .windows(CRLF.len())
            .position(|w| w == CRLF)
            .map(|offset| pos + offset)
            .ok_or_else(|| MultipartError::invalid_format("unterminated part headers"))?;
        let line = &body[pos..line_end];
        pos = line_end + CRLF.len();
        if line.is_empty() {
            return Ok((headers, pos));
        }

        let line = std::str::from_utf8(line)
            .map_err(|_| MultipartError::invalid_format("part header is not valid UTF-8"))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| MultipartError::invalid_format(format!("malformed header line `{line}`")))?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
    }
}

fn header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Splits header parameters on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_owned();
    };
    let mut unquoted = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                unquoted.push(next);
            }
        } else {
            unquoted.push(c);
        }
    }
    unquoted
}

/// Returns the `name` and optional `filename` of a form-data disposition.
fn parse_disposition(value: &str) -> Result<(String, Option<String>), MultipartError> {
    let mut params = split_params(value).into_iter();
    let kind = params.next().unwrap_or_default().trim();
    if !kind.eq_ignore_ascii_case("form-data") {
        return Err(MultipartError::invalid_format(format!(
            "Content-Disposition `{kind}` is not form-data"
        )));
    }

    let mut name = None;
    let mut filename = None;
    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw.trim()));
        } else if key.eq_ignore_ascii_case("filename") {
            filename = Some(unquote(raw.trim()));
        }
    }
    let name = name.ok_or_else(|| {
        MultipartError::invalid_format("Content-Disposition has no name parameter")
    })?;
    Ok((name, filename))
}
