//! Concrete containers from rendered manifests
//!
//! A rendered manifest is a stream of documents separated by `---`. Each
//! document is decoded on its own; if any one fails to decode the whole call
//! fails and nothing extracted so far is returned.
//!
//! Within a document every mapping carrying a `containers` sequence
//! contributes one [`ContainerSpec`] per element with a non-empty `name`
//! and `image`. The walk descends into every mapping-valued child, so pod
//! templates nested under workload specs are found. Overlapping structures
//! may yield the same container more than once.

use serde::{Deserialize, Serialize};

use crate::document::{Node, parse_document};
use crate::error::DocumentError;

/// Document separator in rendered manifests
pub const DOCUMENT_SEPARATOR: &str = "---";

/// A running container and its combined `repository:tag` image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

/// Split a manifest stream into its raw documents
pub fn split_manifest(manifest: &str) -> impl Iterator<Item = &str> {
    manifest.split(DOCUMENT_SEPARATOR)
}

/// Extract all containers from a multi-document manifest (all-or-nothing)
pub fn extract_containers(manifest: &str) -> Result<Vec<ContainerSpec>, DocumentError> {
    let mut containers = Vec::new();
    for (index, raw) in split_manifest(manifest).enumerate() {
        let doc = parse_document(raw, index)?;
        collect(&doc, &mut containers);
    }
    tracing::debug!(count = containers.len(), "extracted containers from manifest");
    Ok(containers)
}

/// Walk one normalized document collecting containers
pub fn find_containers(node: &Node) -> Vec<ContainerSpec> {
    let mut found = Vec::new();
    collect(node, &mut found);
    found
}

fn collect(node: &Node, found: &mut Vec<ContainerSpec>) {
    if let Some(items) = node.get("containers").and_then(Node::as_sequence) {
        for item in items {
            let name = item.get("name").and_then(Node::as_non_empty_str);
            let image = item.get("image").and_then(Node::as_non_empty_str);
            if let (Some(name), Some(image)) = (name, image) {
                found.push(ContainerSpec::new(name, image));
            }
        }
    }

    for child in node.mapping_children() {
        collect(child, found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
        - name: web
          image: nginx:1.14
"#;

    #[test]
    fn test_containers_nested_in_pod_template() {
        let containers = extract_containers(DEPLOYMENT).unwrap();
        assert_eq!(containers, vec![ContainerSpec::new("web", "nginx:1.14")]);
    }

    #[test]
    fn test_multiple_documents() {
        let manifest = format!(
            "---\n# Source: web/templates/service.yaml\napiVersion: v1\nkind: Service\nmetadata:\n  name: web\n---\n{}",
            DEPLOYMENT
        );
        let containers = extract_containers(&manifest).unwrap();
        assert_eq!(containers, vec![ContainerSpec::new("web", "nginx:1.14")]);
    }

    #[test]
    fn test_malformed_first_document_fails_whole_call() {
        let manifest = format!("kind: [Broken\n---\n{}", DEPLOYMENT);
        let err = extract_containers(&manifest).unwrap_err();
        assert!(matches!(err, DocumentError::Decode { index: 0, .. }));
    }

    #[test]
    fn test_malformed_later_document_discards_earlier_results() {
        let manifest = format!("{}\n---\nspec: {{containers: [\n", DEPLOYMENT);
        assert!(extract_containers(&manifest).is_err());
    }

    #[test]
    fn test_multiple_containers_in_order() {
        let manifest = r#"
kind: Pod
spec:
  containers:
    - name: app
      image: repo/app:v2
    - name: metrics
      image: prom/exporter:0.15
"#;
        let containers = extract_containers(manifest).unwrap();
        assert_eq!(
            containers,
            vec![
                ContainerSpec::new("app", "repo/app:v2"),
                ContainerSpec::new("metrics", "prom/exporter:0.15"),
            ]
        );
    }

    #[test]
    fn test_incomplete_container_entries_skipped() {
        let manifest = r#"
spec:
  containers:
    - name: no-image
    - image: no-name:1
    - "just a string"
    - name: ok
      image: ok:1
"#;
        let containers = extract_containers(manifest).unwrap();
        assert_eq!(containers, vec![ContainerSpec::new("ok", "ok:1")]);
    }

    #[test]
    fn test_containers_not_a_sequence_ignored() {
        let manifest = "spec:\n  containers: none\n";
        assert!(extract_containers(manifest).unwrap().is_empty());
    }

    #[test]
    fn test_overlapping_structures_repeat() {
        let manifest = r#"
containers:
  - name: outer
    image: outer:1
inner:
  containers:
    - name: outer
      image: outer:1
"#;
        let containers = extract_containers(manifest).unwrap();
        assert_eq!(containers.len(), 2);
    }

    #[test]
    fn test_empty_manifest() {
        assert!(extract_containers("").unwrap().is_empty());
        assert!(extract_containers("---\n---\n").unwrap().is_empty());
    }

    #[test]
    fn test_find_containers_on_node() {
        let doc = parse_document(DEPLOYMENT, 0).unwrap();
        assert_eq!(find_containers(&doc).len(), 1);
    }
}
