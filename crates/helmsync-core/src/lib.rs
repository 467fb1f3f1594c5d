//! Helmsync Core - Backend-agnostic types and pure parsing for helmsync
//!
//! This crate provides the leaves of the reconciliation pipeline:
//! - `ReleaseSummary`: One row of a release listing, parsed from backend text
//! - `Node`: A uniform scalar/sequence/mapping tree for decoded documents
//! - `ImageReference`: Declared image intent found in a values document
//! - `ContainerSpec`: Concrete containers found in rendered manifests
//! - `Service`: The canonical view of a running service
//! - `SyncDef`: An ordered plan of apply/delete actions
//!
//! Nothing here performs I/O. Everything is deterministic for a given input.

pub mod containers;
pub mod document;
pub mod error;
pub mod images;
pub mod release;
pub mod service;
pub mod sync;

pub use containers::{ContainerSpec, extract_containers, find_containers, split_manifest};
pub use document::{Node, parse_document};
pub use error::{CoreError, DocumentError, Result};
pub use images::{ImageReference, extract_image_refs, find_image_refs};
pub use release::{ReleaseStatus, ReleaseSummary, parse_release_line, parse_release_list};
pub use service::{Containers, ResourceId, Service, ServiceStatus, StatusSource};
pub use sync::{SyncAction, SyncDef, SyncKind};
