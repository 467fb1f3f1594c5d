//! Canonical service view handed to the parent controller

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::containers::ContainerSpec;
use crate::error::CoreError;
use crate::images::ImageReference;

/// `<namespace>/<name>` identity of a service or release
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(CoreError::InvalidResourceId { id: s.to_string() }),
        }
    }
}

impl TryFrom<String> for ResourceId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

/// Where a service status value came from.
///
/// The two vocabularies differ: cluster readiness is `ready`/`updating`,
/// release status is whatever the backend reports (`DEPLOYED`, `FAILED`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusSource {
    /// Queried from the cluster workload
    Cluster,
    /// Reported by the release backend
    Release,
}

impl std::fmt::Display for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// A service status tagged with its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "kebab-case")]
pub enum ServiceStatus {
    Cluster(String),
    Release(String),
}

impl ServiceStatus {
    pub fn source(&self) -> StatusSource {
        match self {
            Self::Cluster(_) => StatusSource::Cluster,
            Self::Release(_) => StatusSource::Release,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Cluster(s) | Self::Release(s) => s,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.value(), self.source())
    }
}

/// Either the known containers of a service, or why they are unknown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Containers {
    Known { containers: Vec<ContainerSpec> },
    Unknown { excuse: String },
}

impl Containers {
    pub fn known(containers: Vec<ContainerSpec>) -> Self {
        Self::Known { containers }
    }

    pub fn unknown(excuse: impl Into<String>) -> Self {
        Self::Unknown {
            excuse: excuse.into(),
        }
    }

    /// The containers, if known
    pub fn as_known(&self) -> Option<&[ContainerSpec]> {
        match self {
            Self::Known { containers } => Some(containers),
            Self::Unknown { .. } => None,
        }
    }

    pub fn excuse(&self) -> Option<&str> {
        match self {
            Self::Known { .. } => None,
            Self::Unknown { excuse } => Some(excuse),
        }
    }
}

/// A running service as seen through its release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Namespace plus derived service name
    pub id: ResourceId,

    /// Cluster-assigned address, empty when unknown
    pub address: String,

    pub status: ServiceStatus,

    pub containers: Containers,

    /// Image references declared in the chart values
    #[serde(default)]
    pub declared_images: Vec<ImageReference>,
}
