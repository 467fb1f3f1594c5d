//! Synchronization plans
//!
//! A [`SyncDef`] is an ordered list of actions. Order is part of the plan and
//! is never rearranged. The payload of each action is opaque here; only the
//! backend that executes it knows how to read it.
//!
//! Plans are written as YAML:
//!
//! ```yaml
//! actions:
//!   - kind: apply
//!     resource: monitoring/promop
//!     payload:
//!       chart: stable/prometheus-operator
//!       version: 0.0.6
//!   - kind: delete
//!     resource: default/old-web
//! ```
//!
//! A mapping payload is re-encoded as YAML; a string payload is taken verbatim.

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use crate::error::Result;
use crate::service::ResourceId;

/// What an action does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Create or update in place
    Apply,
    /// Remove; removing an absent resource is not an error
    Delete,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One change against the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    pub kind: SyncKind,
    pub resource_id: ResourceId,
    /// Backend-specific bytes, routed untouched
    pub payload: Vec<u8>,
}

impl SyncAction {
    pub fn apply(resource_id: ResourceId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: SyncKind::Apply,
            resource_id,
            payload: payload.into(),
        }
    }

    pub fn delete(resource_id: ResourceId) -> Self {
        Self {
            kind: SyncKind::Delete,
            resource_id,
            payload: Vec::new(),
        }
    }

    /// Payload as text, if it is valid UTF-8
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// An ordered synchronization plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDef {
    pub actions: Vec<SyncAction>,
}

#[derive(Deserialize)]
struct PlanFile {
    #[serde(default)]
    actions: Vec<PlanEntry>,
}

#[derive(Deserialize)]
struct PlanEntry {
    kind: SyncKind,
    resource: ResourceId,
    #[serde(default)]
    payload: Option<YamlValue>,
}

impl SyncDef {
    pub fn new(actions: Vec<SyncAction>) -> Self {
        Self { actions }
    }

    /// Parse a plan from YAML
    pub fn from_yaml(text: &str) -> Result<Self> {
        let plan: PlanFile = serde_yaml::from_str(text)?;

        let actions = plan
            .actions
            .into_iter()
            .map(|entry| {
                let payload = match entry.payload {
                    None | Some(YamlValue::Null) => Vec::new(),
                    Some(YamlValue::String(s)) => s.into_bytes(),
                    Some(other) => serde_yaml::to_string(&other)?.into_bytes(),
                };
                Ok(SyncAction {
                    kind: entry.kind,
                    resource_id: entry.resource,
                    payload,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(actions = actions.len(), "parsed sync plan");
        Ok(Self { actions })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
