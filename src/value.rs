use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
    ser::SerializeMap,
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

/// Format-neutral tree sitting between typed values and the wire
///
/// Every leaf is text: the encoder renders scalars to strings and the
/// decoder parses them back. Mapping keys are unique and keep the order in
/// which they were inserted (for parsed input, the order keys were first
/// seen on the wire).
///
/// # Example
/// ```
/// use formwire::{Config, Node, to_node};
/// use std::collections::BTreeMap;
///
/// let mut map = BTreeMap::new();
/// map.insert("name", "Alice");
/// let node = to_node(&map, &Config::default()).unwrap();
/// assert_eq!(node.get("name").and_then(Node::as_str), Some("Alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A single wire-formatted value
    Scalar(String),
    /// Positionally addressed children
    Sequence(Vec<Node>),
    /// Keyed children, keys unique
    Mapping(Vec<(String, Node)>),
}

impl Default for Node {
    fn default() -> Self {
        Node::Mapping(Vec::new())
    }
}

impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Node::Scalar(s) => serializer.serialize_str(s),
            Node::Sequence(items) => items.serialize(serializer),
            Node::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NodeVisitor;

        impl<'de> Visitor<'de> for NodeVisitor {
            type Value = Node;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a scalar, sequence or mapping")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Node, E> {
                Ok(Node::Scalar(value.to_string()))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Node, E> {
                Ok(Node::Scalar(value.to_string()))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Node, E> {
                Ok(Node::Scalar(value.to_string()))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Node, E> {
                Ok(Node::Scalar(value.to_string()))
            }

            fn visit_str<E>(self, value: &str) -> Result<Node, E>
            where
                E: de::Error,
            {
                Ok(Node::Scalar(value.to_owned()))
            }

            fn visit_string<E>(self, value: String) -> Result<Node, E> {
                Ok(Node::Scalar(value))
            }

            fn visit_none<E>(self) -> Result<Node, E> {
                Ok(Node::empty())
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Node, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            fn visit_unit<E>(self) -> Result<Node, E> {
                Ok(Node::empty())
            }

            fn visit_seq<V>(self, mut visitor: V) -> Result<Node, V::Error>
            where
                V: de::SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(item) = visitor.next_element()? {
                    items.push(item);
                }
                Ok(Node::Sequence(items))
            }

            fn visit_map<V>(self, mut visitor: V) -> Result<Node, V::Error>
            where
                V: de::MapAccess<'de>,
            {
                let mut entries = Entries::with_capacity(visitor.size_hint().unwrap_or(0));
                while let Some((key, value)) = visitor.next_entry::<String, Node>()? {
                    entries.insert(key, value);
                }
                Ok(Node::Mapping(entries.into_vec()))
            }
        }

        deserializer.deserialize_any(NodeVisitor)
    }
}

impl Node {
    /// The empty scalar, used for absent values
    pub fn empty() -> Self {
        Node::Scalar(String::new())
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Node::Scalar(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Node::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Node::Mapping(_))
    }

    /// Returns true for `Scalar("")`
    pub fn is_empty_scalar(&self) -> bool {
        matches!(self, Node::Scalar(s) if s.is_empty())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[(String, Node)]> {
        match self {
            Node::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a direct child of a mapping
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Inserts into a mapping, replacing any existing entry for `key`.
    ///
    /// Returns false (and leaves `self` untouched) when `self` is not a mapping.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> bool {
        match self {
            Node::Mapping(entries) => {
                upsert(entries, key.into(), value);
                true
            }
            _ => false,
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Scalar(value.to_owned())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Scalar(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Sequence(items)
    }
}

/// Mapping entries under construction, in first-insertion order
///
/// A repeated key replaces the earlier value in place. Lookups go through a
/// position index, so building a mapping is linear in its size.
#[derive(Debug, Default)]
pub(crate) struct Entries {
    entries: Vec<(String, Node)>,
    positions: HashMap<String, usize>,
}

impl Entries {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Entries {
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, key: String, value: Node) {
        match self.positions.entry(key) {
            Entry::Occupied(slot) => self.entries[*slot.get()].1 = value,
            Entry::Vacant(slot) => {
                self.entries.push((slot.key().clone(), value));
                slot.insert(self.entries.len() - 1);
            }
        }
    }

    pub(crate) fn into_vec(self) -> Vec<(String, Node)> {
        self.entries
    }
}

pub(crate) fn upsert(entries: &mut Vec<(String, Node)>, key: String, value: Node) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, from_node, to_node};

    #[test]
    fn test_node_scalar() {
        let node = Node::from("hello");
        assert!(node.is_scalar());
        assert_eq!(node.as_str(), Some("hello"));

        let encoded = to_node(&node, &Config::default()).unwrap();
        let decoded: Node = from_node(&encoded, &Config::default()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn test_node_sequence() {
        let node = Node::from(vec![Node::from("1"), Node::from("2"), Node::from("3")]);
        assert!(node.is_sequence());
        assert_eq!(node.as_sequence().unwrap().len(), 3);

        let decoded: Node = from_node(&node, &Config::default()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn test_node_mapping_keeps_insertion_order() {
        let mut node = Node::default();
        assert!(node.insert("zeta", Node::from("1")));
        assert!(node.insert("alpha", Node::from("2")));
        assert!(node.insert("zeta", Node::from("3")));

        let keys: Vec<&str> = node
            .as_mapping()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        assert_eq!(node.get("zeta"), Some(&Node::from("3")));
    }

    #[test]
    fn test_entries_replace_in_place() {
        let mut entries = Entries::with_capacity(2);
        entries.insert("zeta".into(), Node::from("1"));
        entries.insert("alpha".into(), Node::from("2"));
        entries.insert("zeta".into(), Node::from("3"));
        assert_eq!(
            entries.into_vec(),
            vec![
                ("zeta".to_string(), Node::from("3")),
                ("alpha".to_string(), Node::from("2")),
            ]
        );
    }

    #[test]
    fn test_large_mapping_from_json() {
        let object: serde_json::Map<String, serde_json::Value> = (0..50_000)
            .map(|i| (format!("key{i}"), serde_json::Value::from(i)))
            .collect();
        let node: Node = serde_json::from_value(serde_json::Value::Object(object)).unwrap();
        assert_eq!(node.as_mapping().unwrap().len(), 50_000);
        assert_eq!(node.get("key49999"), Some(&Node::from("49999")));
    }

    #[test]
    fn test_insert_into_scalar_is_rejected() {
        let mut node = Node::empty();
        assert!(!node.insert("key", Node::from("value")));
        assert!(node.is_empty_scalar());
    }

    #[test]
    fn test_node_from_json() {
        let json = r#"{"name": "Alice", "age": 30, "tags": ["a", "b"], "nick": null}"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.get("name"), Some(&Node::from("Alice")));
        assert_eq!(node.get("age"), Some(&Node::from("30")));
        assert_eq!(
            node.get("tags"),
            Some(&Node::Sequence(vec![Node::from("a"), Node::from("b")]))
        );
        assert!(node.get("nick").unwrap().is_empty_scalar());

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["age"], serde_json::json!("30"));
    }
}
