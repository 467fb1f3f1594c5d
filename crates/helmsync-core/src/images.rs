//! Declared image references from chart values
//!
//! A chart author declares an updatable image with a block of the form:
//!
//! ```yaml
//! somename:
//!   image:
//!     repository: repo/developer/name
//!     tag: v1.2.3
//! ```
//!
//! Blocks are collected at any depth and in any number of sibling subtrees.
//! Nothing is deduplicated: the same reference declared twice is reported
//! twice.

use serde::{Deserialize, Serialize};

use crate::document::{Node, parse_document};
use crate::error::DocumentError;

/// An image the chart author explicitly parameterized
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Decode a values document and collect every declared image reference.
///
/// Fails if the document does not decode.
pub fn extract_image_refs(values: &str) -> Result<Vec<ImageReference>, DocumentError> {
    let doc = parse_document(values, 0)?;
    Ok(find_image_refs(&doc))
}

/// Walk a normalized document collecting `image: {repository, tag}` blocks
pub fn find_image_refs(node: &Node) -> Vec<ImageReference> {
    let mut found = Vec::new();
    collect(node, &mut found);
    found
}

fn collect(node: &Node, found: &mut Vec<ImageReference>) {
    if let Some(image) = node.get("image") {
        let repository = image.get("repository").and_then(Node::as_non_empty_str);
        let tag = image.get("tag").and_then(Node::as_non_empty_str);
        if let (Some(repository), Some(tag)) = (repository, tag) {
            found.push(ImageReference::new(repository, tag));
        }
    }

    for child in node.mapping_children() {
        collect(child, found);
    }
}
