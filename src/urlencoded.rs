//! `application/x-www-form-urlencoded` serializer and parser.
//!
//! The serializer flattens a [`Node`] tree into `key=value` pairs whose keys
//! spell the path to each leaf (`user[profile][name]=John`). The parser reads
//! such pairs back through a [`TreeBuilder`], which is shared with the
//! multipart decoder.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::config::{Config, Nesting};
use crate::error::{DecodeError, EncodeError};
use crate::path::{Path, parse_index};
use crate::value::Node;

/// Characters written as-is; everything else is percent-encoded.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const MAX_DEPTH: usize = 64;

pub(crate) fn encode_component(text: &str) -> String {
    // '%' is itself escaped, so every "%20" left in the output stands for a space
    utf8_percent_encode(text, FORM_VALUE)
        .to_string()
        .replace("%20", "+")
}

/// `+` becomes a space before percent-decoding, so an encoded `%2B` survives as `+`
pub(crate) fn decode_component(text: &str) -> Result<String, DecodeError> {
    let spaced = text.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| DecodeError::invalid_format(format!("`{text}` does not decode to UTF-8")))
}

/// A leaf reached while flattening: the key path and the scalar text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlatPair {
    pub(crate) segments: Vec<String>,
    pub(crate) value: String,
}

/// Flattens a tree into leaf pairs in wire order.
///
/// A root scalar yields a single pair with no key segments.
pub(crate) fn flatten(node: &Node, config: &Config) -> Result<Vec<FlatPair>, EncodeError> {
    let mut pairs = Vec::new();
    match node {
        Node::Scalar(value) => pairs.push(FlatPair {
            segments: Vec::new(),
            value: value.clone(),
        }),
        Node::Sequence(_) => {
            return Err(EncodeError::new(
                Path::root(),
                "a top-level sequence has no key to flatten under",
            ));
        }
        Node::Mapping(entries) => {
            for (key, child) in ordered(entries, config) {
                walk(
                    child,
                    vec![key.clone()],
                    &Path::root().key(key.as_str()),
                    config,
                    &mut pairs,
                )?;
            }
        }
    }
    Ok(pairs)
}

fn ordered<'n>(entries: &'n [(String, Node)], config: &Config) -> Vec<&'n (String, Node)> {
    let mut entries: Vec<_> = entries.iter().collect();
    if config.sort_keys {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
    }
    entries
}

fn walk(
    node: &Node,
    segments: Vec<String>,
    path: &Path,
    config: &Config,
    out: &mut Vec<FlatPair>,
) -> Result<(), EncodeError> {
    match node {
        Node::Scalar(value) => out.push(FlatPair {
            segments,
            value: value.clone(),
        }),
        // keep the key on the wire
        Node::Mapping(entries) if entries.is_empty() => out.push(FlatPair {
            segments,
            value: String::new(),
        }),
        Node::Sequence(items) if items.is_empty() => out.push(FlatPair {
            segments,
            value: String::new(),
        }),
        Node::Mapping(entries) => {
            for (key, child) in ordered(entries, config) {
                let mut child_segments = segments.clone();
                child_segments.push(key.clone());
                walk(child, child_segments, &path.key(key.as_str()), config, out)?;
            }
        }
        Node::Sequence(items) => match config.nesting {
            Nesting::Accumulate => {
                for (index, item) in items.iter().enumerate() {
                    let Node::Scalar(value) = item else {
                        return Err(EncodeError::new(
                            path.index(index),
                            "repeated keys can only carry scalar values",
                        ));
                    };
                    out.push(FlatPair {
                        segments: segments.clone(),
                        value: value.clone(),
                    });
                }
            }
            Nesting::Brackets | Nesting::Indexed => {
                for (index, item) in items.iter().enumerate() {
                    let mut child_segments = segments.clone();
                    child_segments.push(index.to_string());
                    walk(item, child_segments, &path.index(index), config, out)?;
                }
            }
        },
    }
    Ok(())
}

/// Renders `a`, `b`, `c` as `a[b][c]`, percent-encoding each segment when `escape` is set.
pub(crate) fn render_key(segments: &[String], escape: bool) -> String {
    let mut key = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let text = if escape {
            Cow::Owned(encode_component(segment))
        } else {
            Cow::Borrowed(segment.as_str())
        };
        if i == 0 {
            key.push_str(&text);
        } else {
            key.push('[');
            key.push_str(&text);
            key.push(']');
        }
    }
    key
}

/// Serializes a tree as a urlencoded string.
///
/// Mapping keys are sorted when [`Config::sort_keys`] is set; sequences keep
/// their order. A scalar root is written as a bare value with no `=`.
pub fn serialize(node: &Node, config: &Config) -> Result<String, EncodeError> {
    let pairs = flatten(node, config)?;
    let wire = pairs
        .iter()
        .map(|pair| {
            if pair.segments.is_empty() {
                encode_component(&pair.value)
            } else {
                format!(
                    "{}={}",
                    render_key(&pair.segments, true),
                    encode_component(&pair.value)
                )
            }
        })
        .collect::<Vec<_>>()
        .join("&");
    tracing::trace!(pairs = pairs.len(), bytes = wire.len(), "serialized urlencoded form");
    Ok(wire)
}

/// Parses a urlencoded string into a tree using the given nesting convention.
///
/// # Example
/// ```
/// use formwire::{Nesting, Node, urlencoded};
///
/// let node = urlencoded::parse("user[name]=John+Smith&tag=a&tag=b", Nesting::Accumulate).unwrap();
/// let user = node.get("user").unwrap();
/// assert_eq!(user.get("name").and_then(Node::as_str), Some("John Smith"));
/// assert!(node.get("tag").unwrap().is_sequence());
/// ```
pub fn parse(wire: &str, nesting: Nesting) -> Result<Node, DecodeError> {
    let mut builder = TreeBuilder::new(nesting);
    let mut pairs = 0usize;
    for pair in wire.split('&').filter(|pair| !pair.is_empty()) {
        match pair.split_once('=') {
            Some((raw_key, raw_value)) => {
                let segments = key_segments(raw_key, true)?;
                builder.insert(&segments, decode_component(raw_value)?)?;
            }
            None => builder.insert(&[], decode_component(pair)?)?,
        }
        pairs += 1;
    }
    tracing::trace!(pairs, ?nesting, "parsed urlencoded form");
    Ok(builder.finish())
}

/// One parsed key step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeySegment {
    Named(String),
    /// `[]`: the next free sequence slot
    Append,
}

/// Splits a raw key into its segments, decoding each one when `decode` is set.
///
/// Brackets are recognised before decoding, so `%5B` inside a segment is
/// ordinary text.
pub(crate) fn key_segments(raw: &str, decode: bool) -> Result<Vec<KeySegment>, DecodeError> {
    let text = |segment: &str| {
        if decode {
            decode_component(segment)
        } else {
            Ok(segment.to_owned())
        }
    };
    let (head, brackets) = split_key(raw)?;
    let mut segments = Vec::with_capacity(brackets.len() + 1);
    segments.push(KeySegment::Named(text(head)?));
    for segment in brackets {
        segments.push(if segment.is_empty() {
            KeySegment::Append
        } else {
            KeySegment::Named(text(segment)?)
        });
    }
    Ok(segments)
}

fn split_key(raw: &str) -> Result<(&str, Vec<&str>), DecodeError> {
    let malformed = |reason: &str| DecodeError::invalid_format(format!("{reason} in key `{raw}`"));

    let Some(open) = raw.find('[') else {
        if raw.contains(']') {
            return Err(malformed("unbalanced `]`"));
        }
        return Ok((raw, Vec::new()));
    };
    let (head, mut rest) = raw.split_at(open);
    if head.is_empty() {
        return Err(malformed("missing name before `[`"));
    }
    if head.contains(']') {
        return Err(malformed("unbalanced `]`"));
    }

    let mut segments = Vec::new();
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return Err(malformed("unexpected text after `]`"));
        };
        let Some(close) = inner.find(']') else {
            return Err(malformed("unbalanced `[`"));
        };
        let segment = &inner[..close];
        if segment.contains('[') {
            return Err(malformed("nested `[`"));
        }
        segments.push(segment);
        if segments.len() > MAX_DEPTH {
            return Err(malformed("too many nesting levels"));
        }
        rest = &inner[close + 1..];
    }
    Ok((head, segments))
}

/// Accumulates `(key segments, value)` pairs into a [`Node`] tree.
#[derive(Debug)]
pub(crate) struct TreeBuilder {
    nesting: Nesting,
    root: Option<Draft>,
}

#[derive(Debug)]
enum Draft {
    Scalar(String),
    Sequence(BTreeMap<usize, Draft>),
    Mapping {
        order: Vec<String>,
        entries: HashMap<String, Draft>,
    },
}

impl TreeBuilder {
    pub(crate) fn new(nesting: Nesting) -> Self {
        TreeBuilder {
            nesting,
            root: None,
        }
    }

    pub(crate) fn insert(&mut self, segments: &[KeySegment], value: String) -> Result<(), DecodeError> {
        place(&mut self.root, segments, value, self.nesting, &Path::root())
    }

    /// The finished tree; an empty builder yields an empty mapping
    pub(crate) fn finish(self) -> Node {
        self.root.map(Draft::finish).unwrap_or_default()
    }
}

fn conflict(path: &Path) -> DecodeError {
    DecodeError::invalid_format_at(path.clone(), "conflicting shapes for one key")
}

fn next_slot(items: &BTreeMap<usize, Draft>, path: &Path) -> Result<usize, DecodeError> {
    match items.keys().next_back() {
        None => Ok(0),
        Some(last) => last.checked_add(1).ok_or_else(|| {
            DecodeError::invalid_format_at(path.clone(), "no sequence slot left to append to")
        }),
    }
}

fn place(
    slot: &mut Option<Draft>,
    segments: &[KeySegment],
    value: String,
    nesting: Nesting,
    path: &Path,
) -> Result<(), DecodeError> {
    let Some((first, rest)) = segments.split_first() else {
        return place_leaf(slot, value, nesting, path);
    };

    // key heads always name a mapping entry; only bracket segments may index
    let index = match first {
        KeySegment::Named(name) if nesting == Nesting::Indexed && !path.is_root() => {
            parse_index(name)
        }
        _ => None,
    };
    let draft = slot.get_or_insert_with(|| match (first, index) {
        (KeySegment::Append, _) | (_, Some(_)) => Draft::Sequence(BTreeMap::new()),
        (KeySegment::Named(_), None) => Draft::Mapping {
            order: Vec::new(),
            entries: HashMap::new(),
        },
    });

    // under Indexed a named segment turns slots seen so far into mapping keys
    if nesting == Nesting::Indexed && index.is_none() && matches!(first, KeySegment::Named(_)) {
        if let Draft::Sequence(items) = &mut *draft {
            let items = std::mem::take(items);
            *draft = Draft::keyed(items);
        }
    }

    match (draft, first) {
        (Draft::Sequence(items), KeySegment::Append) => {
            let position = next_slot(items, path)?;
            let mut child = None;
            place(&mut child, rest, value, nesting, &path.index(position))?;
            if let Some(child) = child {
                items.insert(position, child);
            }
            Ok(())
        }
        (Draft::Sequence(items), KeySegment::Named(_)) => {
            let Some(position) = index else {
                return Err(conflict(path));
            };
            let mut child = items.remove(&position);
            place(&mut child, rest, value, nesting, &path.index(position))?;
            if let Some(child) = child {
                items.insert(position, child);
            }
            Ok(())
        }
        (Draft::Mapping { order, entries }, KeySegment::Named(name)) => {
            let mut child = entries.remove(name);
            if child.is_none() {
                order.push(name.clone());
            }
            place(&mut child, rest, value, nesting, &path.key(name.as_str()))?;
            if let Some(child) = child {
                entries.insert(name.clone(), child);
            }
            Ok(())
        }
        _ => Err(conflict(path)),
    }
}

fn place_leaf(
    slot: &mut Option<Draft>,
    value: String,
    nesting: Nesting,
    path: &Path,
) -> Result<(), DecodeError> {
    let accumulate = nesting == Nesting::Accumulate;
    match slot {
        None => *slot = Some(Draft::Scalar(value)),
        Some(Draft::Scalar(previous)) if accumulate => {
            let previous = std::mem::take(previous);
            let items = BTreeMap::from([(0, Draft::Scalar(previous)), (1, Draft::Scalar(value))]);
            *slot = Some(Draft::Sequence(items));
        }
        // a repeated key without accumulation: the last occurrence wins
        Some(Draft::Scalar(previous)) => *previous = value,
        Some(Draft::Sequence(items)) if accumulate => {
            let position = next_slot(items, path)?;
            items.insert(position, Draft::Scalar(value));
        }
        Some(_) => return Err(conflict(path)),
    }
    Ok(())
}

impl Draft {
    /// Slots re-read as a mapping keyed by their index text
    fn keyed(items: BTreeMap<usize, Draft>) -> Draft {
        let mut order = Vec::with_capacity(items.len());
        let mut entries = HashMap::with_capacity(items.len());
        for (index, draft) in items {
            let key = index.to_string();
            order.push(key.clone());
            entries.insert(key, draft);
        }
        Draft::Mapping { order, entries }
    }

    fn finish(self) -> Node {
        match self {
            Draft::Scalar(text) => Node::Scalar(text),
            Draft::Sequence(items) => {
                let contiguous = items.keys().enumerate().all(|(pos, index)| pos == *index);
                if contiguous {
                    Node::Sequence(items.into_values().map(Draft::finish).collect())
                } else {
                    // sparse: leave the gap for the decoder to report
                    Node::Mapping(
                        items
                            .into_iter()
                            .map(|(index, draft)| (index.to_string(), draft.finish()))
                            .collect(),
                    )
                }
            }
            Draft::Mapping { order, mut entries } => Node::Mapping(
                order
                    .into_iter()
                    .filter_map(|key| entries.remove(&key).map(|draft| (key, draft.finish())))
                    .collect(),
            ),
        }
    }
}
