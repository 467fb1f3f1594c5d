//! Backend talking to Tiller over gRPC
//!
//! Full release records are available here, so services carry containers
//! extracted from the rendered manifest and images declared in the chart
//! values.

mod mock;
pub mod tiller;

pub use mock::MockReleaseRpc;
pub use tiller::TillerClient;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::sync::Arc;
use std::time::Duration;

use helmsync_core::{ResourceId, Service, SyncAction, SyncDef};

use crate::backend::ReleaseBackend;
use crate::error::{BackendError, Result};
use crate::lookup::ServiceLookup;
use crate::reconcile::{DiscoveredRelease, reconcile};
use crate::sync::{ActionOutcome, SyncReport, SyncTarget, execute_sync};
use tiller::{
    Config, InstallReleaseRequest, ListReleasesRequest, Release, StatusCode,
    UninstallReleaseRequest, UpdateReleaseRequest, Version,
};

const BACKEND_NAME: &str = "rpc";

/// Server-side wait when a payload names none, matching helm's default
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Joins release manifests in an export
const EXPORT_SEPARATOR: &str = "\n---\n";

/// The ReleaseService calls this backend needs
#[async_trait]
pub trait ReleaseRpc: Send + Sync {
    /// List releases, draining every streamed batch and page
    async fn list_releases(&self, request: ListReleasesRequest) -> Result<Vec<Release>>;

    async fn get_version(&self) -> Result<Option<Version>>;

    async fn install_release(&self, request: InstallReleaseRequest) -> Result<Option<Release>>;

    async fn update_release(&self, request: UpdateReleaseRequest) -> Result<Option<Release>>;

    async fn uninstall_release(&self, request: UninstallReleaseRequest) -> Result<Option<Release>>;
}

/// Apply payload for this backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcPayload {
    /// Base64 of an encoded `hapi.chart.Chart`
    pub chart: String,
    /// Values mapping, or a values document as a string
    #[serde(default)]
    pub values: Option<YamlValue>,
    #[serde(default)]
    pub wait: bool,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl RpcPayload {
    pub fn parse(action: &SyncAction) -> Result<Self> {
        let text = action
            .payload_str()
            .ok_or_else(|| payload_error(&action.resource_id, "payload is not UTF-8"))?;
        serde_yaml::from_str(text).map_err(|e| payload_error(&action.resource_id, e))
    }

    fn chart_bytes(&self, resource_id: &ResourceId) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.chart.trim())
            .map_err(|e| payload_error(resource_id, format!("chart is not base64: {}", e)))
    }

    fn values_config(&self, resource_id: &ResourceId) -> Result<Option<Config>> {
        let raw = match &self.values {
            None | Some(YamlValue::Null) => return Ok(None),
            Some(YamlValue::String(s)) => s.clone(),
            Some(other) => serde_yaml::to_string(other).map_err(|e| payload_error(resource_id, e))?,
        };
        Ok(Some(Config { raw }))
    }

    /// Seconds Tiller waits for resources; zero would mean no bound
    fn timeout_secs(&self) -> i64 {
        let timeout = self.timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX)
    }
}

fn payload_error(resource_id: &ResourceId, message: impl std::fmt::Display) -> BackendError {
    BackendError::Payload {
        resource_id: resource_id.clone(),
        message: message.to_string(),
    }
}

impl From<Release> for DiscoveredRelease {
    fn from(release: Release) -> Self {
        DiscoveredRelease {
            chart_name: release.chart_name().to_string(),
            status: release.status_name().to_string(),
            values: release.chart_values().map(str::to_string),
            manifest: Some(release.manifest),
            name: release.name,
            namespace: release.namespace,
        }
    }
}

/// [`ReleaseBackend`] over the Tiller ReleaseService
pub struct RpcBackend {
    rpc: Arc<dyn ReleaseRpc>,
    lookup: Arc<dyn ServiceLookup>,
}

impl RpcBackend {
    pub fn new(rpc: Arc<dyn ReleaseRpc>, lookup: Arc<dyn ServiceLookup>) -> Self {
        Self { rpc, lookup }
    }

    /// The live release holding `name`, if any
    async fn find_release(&self, name: &str) -> Result<Option<Release>> {
        let request = ListReleasesRequest {
            filter: format!("^{}$", regex::escape(name)),
            status_codes: StatusCode::live(),
            ..Default::default()
        };
        let releases = self.rpc.list_releases(request).await?;
        Ok(releases.into_iter().find(|r| r.name == name))
    }
}

#[async_trait]
impl ReleaseBackend for RpcBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn services(&self, namespace: Option<&str>) -> Result<Vec<Service>> {
        let request = ListReleasesRequest {
            namespace: namespace.unwrap_or_default().to_string(),
            ..Default::default()
        };
        let releases = self.rpc.list_releases(request).await?;
        tracing::debug!(count = releases.len(), "listed releases");
        reconcile(releases.into_iter().map(Into::into).collect(), self.lookup.as_ref()).await
    }

    async fn ping(&self) -> Result<String> {
        let version = self.rpc.get_version().await?;
        let sem_ver = version.map(|v| v.sem_ver).unwrap_or_default();
        tracing::debug!(version = %sem_ver, "tiller version");
        Ok(sem_ver)
    }

    async fn sync(&self, def: &SyncDef) -> Result<SyncReport> {
        execute_sync(self, def).await
    }

    async fn export(&self) -> Result<Vec<u8>> {
        let releases = self.rpc.list_releases(ListReleasesRequest::default()).await?;
        let manifests: Vec<&str> = releases
            .iter()
            .map(|r| r.manifest.trim())
            .filter(|m| !m.is_empty())
            .collect();
        Ok(manifests.join(EXPORT_SEPARATOR).into_bytes())
    }
}

#[async_trait]
impl SyncTarget for RpcBackend {
    async fn apply(&self, action: &SyncAction) -> Result<ActionOutcome> {
        let payload = RpcPayload::parse(action)?;
        let id = &action.resource_id;
        let chart = payload.chart_bytes(id)?;
        let values = payload.values_config(id)?;

        match self.find_release(&id.name).await? {
            Some(existing) if existing.namespace != id.namespace => {
                Err(namespace_conflict(id, &existing.namespace))
            }
            Some(_) => {
                self.rpc
                    .update_release(UpdateReleaseRequest {
                        name: id.name.clone(),
                        chart,
                        values,
                        wait: payload.wait,
                        timeout: payload.timeout_secs(),
                        ..Default::default()
                    })
                    .await?;
                Ok(ActionOutcome::Updated)
            }
            None => {
                self.rpc
                    .install_release(InstallReleaseRequest {
                        chart,
                        values,
                        name: id.name.clone(),
                        namespace: id.namespace.clone(),
                        wait: payload.wait,
                        timeout: payload.timeout_secs(),
                        ..Default::default()
                    })
                    .await?;
                Ok(ActionOutcome::Created)
            }
        }
    }

    async fn delete(&self, action: &SyncAction) -> Result<ActionOutcome> {
        let id = &action.resource_id;
        match self.find_release(&id.name).await? {
            None => {
                tracing::debug!(resource = %id, "release already absent");
                return Ok(ActionOutcome::Absent);
            }
            Some(existing) if existing.namespace != id.namespace => {
                return Err(namespace_conflict(id, &existing.namespace));
            }
            Some(_) => {}
        }

        let request = UninstallReleaseRequest {
            name: id.name.clone(),
            purge: true,
            ..Default::default()
        };
        match self.rpc.uninstall_release(request).await {
            Ok(_) => Ok(ActionOutcome::Deleted),
            Err(e) if e.is_release_not_found(&id.name) => {
                tracing::debug!(resource = %id, "release removed concurrently");
                Ok(ActionOutcome::Absent)
            }
            Err(e) => Err(e),
        }
    }
}

/// Release names are cluster-wide in Tiller; the same name in another
/// namespace is a different release
pub(crate) fn namespace_conflict(id: &ResourceId, held_by: &str) -> BackendError {
    BackendError::NamespaceConflict {
        name: id.name.clone(),
        namespace: id.namespace.clone(),
        held_by: held_by.to_string(),
    }
}
