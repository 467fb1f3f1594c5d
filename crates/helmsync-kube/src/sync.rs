//! Ordered sync execution
//!
//! Actions run one at a time in plan order. The first failure stops the
//! plan and is reported as a [`SyncFailure`] carrying the failing index and
//! resource. Earlier actions stay applied; there is no rollback.

use async_trait::async_trait;
use serde::Serialize;

use helmsync_core::{ResourceId, SyncAction, SyncDef, SyncKind};

use crate::error::{BackendError, Result, SyncFailure};

/// What an action did to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Created,
    Updated,
    Deleted,
    /// Delete of a resource that did not exist
    Absent,
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Absent => "absent",
        };
        f.write_str(s)
    }
}

/// Outcome of one applied action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub index: usize,
    pub kind: SyncKind,
    pub resource_id: ResourceId,
    pub outcome: ActionOutcome,
}

/// Outcomes of a fully applied plan, in plan order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub actions: Vec<ActionReport>,
}

impl SyncReport {
    pub fn count(&self, outcome: ActionOutcome) -> usize {
        self.actions.iter().filter(|a| a.outcome == outcome).count()
    }
}

/// Something that can apply or delete a single resource
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Create or update in place
    async fn apply(&self, action: &SyncAction) -> Result<ActionOutcome>;

    /// Remove; an absent resource reports [`ActionOutcome::Absent`]
    async fn delete(&self, action: &SyncAction) -> Result<ActionOutcome>;
}

/// Run a plan against a target, halting at the first failure
pub async fn execute_sync<T: SyncTarget + ?Sized>(target: &T, def: &SyncDef) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for (index, action) in def.actions.iter().enumerate() {
        tracing::info!(index, kind = %action.kind, resource = %action.resource_id, "applying sync action");

        let result = match action.kind {
            SyncKind::Apply => target.apply(action).await,
            SyncKind::Delete => target.delete(action).await,
        };

        match result {
            Ok(outcome) => report.actions.push(ActionReport {
                index,
                kind: action.kind,
                resource_id: action.resource_id.clone(),
                outcome,
            }),
            Err(e) => {
                tracing::warn!(index, resource = %action.resource_id, error = %e, "sync action failed, stopping");
                return Err(BackendError::Sync(SyncFailure {
                    index,
                    kind: action.kind,
                    resource_id: action.resource_id.clone(),
                    applied: report.actions.len(),
                    source: Box::new(e),
                }));
            }
        }
    }

    Ok(report)
}
