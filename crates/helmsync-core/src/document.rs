//! Uniform document tree for values and manifest documents
//!
//! Decoded YAML arrives with whatever shape the decoder produces: non-string
//! mapping keys, numbers, booleans, nulls and tags. Extraction code never sees
//! any of that. Every document is normalized once into a [`Node`], where
//! mapping keys are strings and every scalar is a string.
//!
//! Coercion rules:
//! - strings are kept as-is
//! - booleans and numbers become their display form (`true`, `8080`, `1.5`)
//! - null becomes the empty string
//! - tagged values are replaced by their inner value
//! - non-scalar mapping keys are rendered as compact YAML

use indexmap::IndexMap;
use serde_yaml::Value as YamlValue;

use crate::error::DocumentError;

/// String-keyed mapping, in document order
pub type Mapping = IndexMap<String, Node>;

/// A normalized document node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(String),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl Node {
    /// An empty mapping node
    pub fn empty() -> Self {
        Node::Mapping(Mapping::new())
    }

    /// Look up a key if this node is a mapping
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// Scalar contents, if this node is a scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar contents, only when the scalar is non-empty
    pub fn as_non_empty_str(&self) -> Option<&str> {
        self.as_str().filter(|s| !s.is_empty())
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Iterate over the mapping-valued children of a mapping node
    pub fn mapping_children(&self) -> impl Iterator<Item = &Node> {
        self.as_mapping()
            .into_iter()
            .flat_map(|map| map.values())
            .filter(|child| matches!(child, Node::Mapping(_)))
    }

    fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }
}

impl From<YamlValue> for Node {
    fn from(value: YamlValue) -> Self {
        normalize(value)
    }
}

/// Normalize an arbitrary decoded YAML value
pub fn normalize(value: YamlValue) -> Node {
    match value {
        YamlValue::Sequence(items) => Node::Sequence(items.into_iter().map(normalize).collect()),
        YamlValue::Mapping(map) => Node::Mapping(
            map.into_iter()
                .map(|(key, value)| (key_string(&key), normalize(value)))
                .collect(),
        ),
        YamlValue::Tagged(tagged) => normalize(tagged.value),
        scalar => Node::Scalar(scalar_string(&scalar)),
    }
}

/// Decode and normalize a single document.
///
/// An empty (or comment-only) document normalizes to an empty mapping. A
/// document whose root is not a mapping is rejected. `index` is the position
/// of the document in its stream and is only used for error reporting.
pub fn parse_document(text: &str, index: usize) -> Result<Node, DocumentError> {
    let value: YamlValue =
        serde_yaml::from_str(text).map_err(|source| DocumentError::Decode { index, source })?;

    match normalize(value) {
        Node::Scalar(s) if s.is_empty() => Ok(Node::empty()),
        node @ Node::Mapping(_) => Ok(node),
        other => Err(DocumentError::NotAMapping {
            index,
            found: other.kind(),
        }),
    }
}

fn scalar_string(value: &YamlValue) -> String {
    match value {
        YamlValue::Null => String::new(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::String(s) => s.clone(),
        YamlValue::Tagged(tagged) => scalar_string(&tagged.value),
        complex => serde_yaml::to_string(complex)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn key_string(key: &YamlValue) -> String {
    match key {
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => serde_yaml::to_string(key)
            .map(|s| s.trim_end().replace('\n', " "))
            .unwrap_or_default(),
        scalar => scalar_string(scalar),
    }
}
